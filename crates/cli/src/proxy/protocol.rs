// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-lines control plane between the server and the interception
//! process: one JSON object per line in each direction, tagged by `type`
//! (events, interceptor → server) or `command` (server → interceptor).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{BodyEncoding, FlowRecord};

/// Bodies at or below this many bytes travel inline; larger ones are
/// truncated with `body_truncated` set and fetchable by flow id.
pub const INLINE_BODY_LIMIT: usize = 100 * 1024;

/// Where a flow can be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptPhase {
    Request,
    Response,
}

/// Events arriving on the interceptor's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InterceptorEvent {
    Flow {
        #[serde(flatten)]
        flow: Box<FlowRecord>,
    },
    Status(StatusEvent),
}

/// The status sub-events the interceptor reports.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Started {
        #[serde(default)]
        port: Option<u16>,
    },
    ClientConnected {
        #[serde(default)]
        peer: Option<String>,
    },
    Error {
        message: String,
    },
    /// A flow was paused by an intercept rule.
    Held {
        flow_id: Uuid,
        phase: InterceptPhase,
    },
    /// The interceptor echoes rule state after applying a command. Echoes
    /// for rules this server originated are ignored so they cannot clobber
    /// the authoritative mirror.
    RuleEcho {
        rule_id: String,
    },
}

/// Header/body/status overrides applied on release or replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowModifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FlowModifications {
    pub fn is_empty(&self) -> bool {
        self.headers.is_none() && self.body.is_none() && self.status_code.is_none()
    }
}

/// Commands written to the interceptor's stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum InterceptorCommand {
    SetIntercept {
        rule_id: String,
        pattern: String,
        phase: InterceptPhase,
    },
    ClearIntercept {
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
    },
    SetMock {
        rule_id: String,
        pattern: String,
        status_code: u16,
        headers: IndexMap<String, Vec<String>>,
        body: String,
    },
    UpdateMock {
        rule_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<IndexMap<String, Vec<String>>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    ClearMocks {
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
    },
    Release {
        flow_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        modifications: Option<FlowModifications>,
    },
    Drop {
        flow_id: Uuid,
    },
    SetFilter {
        pattern: String,
    },
    Replay {
        flow_id: Uuid,
        request: crate::model::FlowRequest,
        #[serde(skip_serializing_if = "Option::is_none")]
        modifications: Option<FlowModifications>,
    },
}

impl InterceptorCommand {
    /// One line of wire form.
    pub fn encode(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Parse one stdout line. Non-JSON lines (mitmproxy chatter) yield `None`.
pub fn parse_event(line: &str) -> Option<InterceptorEvent> {
    serde_json::from_str(line.trim()).ok()
}

/// Encode a body for inline transport: UTF-8 stays text, binary goes
/// base64, and anything over the limit is truncated with the full size
/// recorded.
pub fn encode_body(bytes: &[u8]) -> (String, u64, bool, Option<u64>, BodyEncoding) {
    let full_size = bytes.len() as u64;
    let truncated = bytes.len() > INLINE_BODY_LIMIT;
    let slice = if truncated { &bytes[..INLINE_BODY_LIMIT] } else { bytes };
    match std::str::from_utf8(slice) {
        Ok(text) => (
            text.to_owned(),
            full_size,
            truncated,
            truncated.then_some(full_size),
            BodyEncoding::Utf8,
        ),
        Err(_) => {
            use base64::Engine;
            (
                base64::engine::general_purpose::STANDARD.encode(slice),
                full_size,
                truncated,
                truncated.then_some(full_size),
                BodyEncoding::Base64,
            )
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
