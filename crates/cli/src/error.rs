// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes across the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    NotFound,
    Conflict,
    Timeout,
    Degraded,
    ToolMissing,
    SubprocessFailed,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthenticated => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Timeout => 408,
            Self::Degraded => 503,
            Self::ToolMissing => 503,
            Self::SubprocessFailed => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::Degraded => "DEGRADED",
            Self::ToolMissing => "TOOL_MISSING",
            Self::SubprocessFailed => "SUBPROCESS_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which external tool an error originated from, when one did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Simctl,
    Devicectl,
    Idb,
    Mitm,
    Wda,
    Pool,
    Log,
    Networksetup,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simctl => "simctl",
            Self::Devicectl => "devicectl",
            Self::Idb => "idb",
            Self::Mitm => "mitm",
            Self::Wda => "wda",
            Self::Pool => "pool",
            Self::Log => "log",
            Self::Networksetup => "networksetup",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error currency of every subsystem: a kind, an optional tool tag, and a
/// human-readable message. Handlers convert it to the shared JSON envelope.
#[derive(Debug, Clone)]
pub struct QuernError {
    pub kind: ErrorKind,
    pub tool: Option<Tool>,
    pub message: String,
}

impl QuernError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, tool: None, message: message.into() }
    }

    pub fn tool(kind: ErrorKind, tool: Tool, message: impl Into<String>) -> Self {
        Self { kind, tool: Some(tool), message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn tool_missing(tool: Tool, hint: impl Into<String>) -> Self {
        Self { kind: ErrorKind::ToolMissing, tool: Some(tool), message: hint.into() }
    }
}

impl fmt::Display for QuernError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tool {
            Some(tool) => write!(f, "{}: [{}] {}", self.kind, tool, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for QuernError {}

pub type Result<T> = std::result::Result<T, QuernError>;

/// Top-level error response envelope shared across all endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body: machine-readable code, optional tool tag, human message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub message: String,
}

impl QuernError {
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind.as_str().to_owned(),
            tool: self.tool.map(|t| t.as_str().to_owned()),
            message: self.message.clone(),
        }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status = StatusCode::from_u16(self.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: self.to_error_body() }))
    }
}

impl IntoResponse for QuernError {
    fn into_response(self) -> Response {
        self.to_http_response().into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
