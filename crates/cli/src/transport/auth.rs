// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{ErrorKind, QuernError};
use crate::transport::state::Store;

/// Paths that never require a key: health, and the CA download a device's
/// Safari fetches before any key exists on the device.
const UNAUTHENTICATED_PATHS: &[&str] = &["/health", "/api/v1/proxy/cert"];

/// Constant-time string comparison to prevent timing side channels.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub fn validate_key(headers: &HeaderMap, expected: &str) -> Result<(), ErrorKind> {
    if let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            if constant_time_eq(token, expected) {
                return Ok(());
            }
        }
        return Err(ErrorKind::Unauthenticated);
    }
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if constant_time_eq(key, expected) {
            return Ok(());
        }
    }
    Err(ErrorKind::Unauthenticated)
}

/// Axum middleware enforcing the API key on everything outside the
/// explicit allow-list.
pub async fn auth_layer(
    State(state): State<Arc<Store>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if UNAUTHENTICATED_PATHS.contains(&path) {
        return next.run(req).await;
    }

    if validate_key(req.headers(), &state.config.api_key).is_err() {
        let err = QuernError::new(ErrorKind::Unauthenticated, "missing or invalid API key");
        return (StatusCode::UNAUTHORIZED, axum::Json(crate::error::ErrorResponse { error: err.to_error_body() }))
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
