// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request/response types and axum handler implementations.

pub mod builds;
pub mod device;
pub mod flows_api;
pub mod logs;
pub mod pool_api;
pub mod proxy_api;

pub use builds::*;
pub use device::*;
pub use flows_api::*;
pub use logs::*;
pub use pool_api::*;
pub use proxy_api::*;

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::transport::state::Store;

/// Ceiling for every long-poll timeout parameter.
pub const LONG_POLL_CEILING_S: f64 = 60.0;

/// Clamp a client-supplied timeout to the server ceiling. Non-finite input
/// falls back to the default.
pub fn clamp_timeout(timeout_s: Option<f64>, default_s: f64) -> std::time::Duration {
    let t = timeout_s.filter(|t| t.is_finite()).unwrap_or(default_s);
    std::time::Duration::from_secs_f64(t.clamp(0.0, LONG_POLL_CEILING_S))
}

/// Parse a `since`/`until` parameter: RFC 3339 or epoch milliseconds.
pub fn parse_time_ms(raw: &str) -> Option<u64> {
    if let Ok(ms) = raw.parse::<u64>() {
        return Some(ms);
    }
    chrono::DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp_millis().max(0) as u64)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `GET /health` — unauthenticated liveness probe.
pub async fn health(State(_s): State<Arc<Store>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
