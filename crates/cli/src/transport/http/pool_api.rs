// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-pool endpoints: claim/release, resolution, ensure-N, and
//! maintenance.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::{QuernError, Result};
use crate::pool::{PoolEntry, ResolveRequest};
use crate::transport::state::Store;

/// `GET /api/v1/devices/pool`
pub async fn pool_list(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    let entries = s.pool.entries().await?;
    Ok(Json(serde_json::json!({ "devices": entries })))
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    pub session_id: String,
}

/// `POST /api/v1/devices/claim` — direct claim (409 when held by another
/// session).
pub async fn pool_claim(
    State(s): State<Arc<Store>>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<PoolEntry>> {
    let udid = match body.udid {
        Some(udid) => udid,
        None => {
            let req = ResolveRequest {
                name: body.name.clone(),
                os_version: body.os_version.clone(),
                session_id: Some(body.session_id.clone()),
                ..ResolveRequest::default()
            };
            s.pool.resolve(&req).await?
        }
    };
    let entry = s.pool.claim(&udid, &body.session_id).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /api/v1/devices/release` — by udid, or everything a session holds.
pub async fn pool_release(
    State(s): State<Arc<Store>>,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<serde_json::Value>> {
    match (body.udid, body.session_id) {
        (Some(udid), session) => {
            let released = s.pool.release(&udid, session.as_deref())?;
            Ok(Json(serde_json::json!({ "released": if released { 1 } else { 0 } })))
        }
        (None, Some(session)) => {
            let released = s.pool.release_session(&session)?;
            Ok(Json(serde_json::json!({ "released": released })))
        }
        (None, None) => Err(QuernError::validation("udid or session_id is required")),
    }
}

/// `POST /api/v1/devices/resolve`
pub async fn pool_resolve(
    State(s): State<Arc<Store>>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>> {
    let udid = s.pool.resolve(&req).await?;
    Ok(Json(serde_json::json!({ "udid": udid, "claimed": req.session_id.is_some() })))
}

#[derive(Debug, Deserialize)]
pub struct EnsureBody {
    pub count: usize,
    #[serde(flatten)]
    pub criteria: ResolveRequest,
}

/// `POST /api/v1/devices/ensure` — N ready devices, booting to fill.
pub async fn pool_ensure(
    State(s): State<Arc<Store>>,
    Json(body): Json<EnsureBody>,
) -> Result<Json<serde_json::Value>> {
    if body.count == 0 {
        return Err(QuernError::validation("count must be at least 1"));
    }
    let mut req = body.criteria;
    // Ensure's contract: shutdown devices are booted to fill the count.
    req.auto_boot = true;
    let udids = s.pool.ensure(body.count, &req).await?;
    Ok(Json(serde_json::json!({ "udids": udids })))
}

/// `POST /api/v1/devices/cleanup` — release stale claims now.
pub async fn pool_cleanup(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    let released = s.pool.cleanup()?;
    Ok(Json(serde_json::json!({ "released": released })))
}

/// `POST /api/v1/devices/refresh` — bypass the enumeration cache.
pub async fn pool_refresh(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    s.pool.invalidate_cache();
    let entries = s.pool.entries().await?;
    Ok(Json(serde_json::json!({ "devices": entries.len() })))
}
