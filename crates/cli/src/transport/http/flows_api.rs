// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow endpoints: list, detail, long-poll wait, and the traffic digest.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clamp_timeout, parse_time_ms};
use crate::error::{QuernError, Result};
use crate::flows::FlowFilter;
use crate::model::{epoch_ms, FlowRecord};
use crate::summary::{summarize_flows, FlowSummary};
use crate::transport::state::Store;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FlowParams {
    pub host: Option<String>,
    #[serde(alias = "path_contains")]
    pub path: Option<String>,
    pub method: Option<String>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub has_error: Option<bool>,
    pub device_id: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub since_cursor: Option<u64>,
    pub window_s: Option<u64>,
    pub timeout_s: Option<f64>,
}

impl FlowParams {
    pub fn to_filter(&self) -> FlowFilter {
        FlowFilter {
            host: self.host.clone(),
            path_contains: self.path.clone(),
            method: self.method.clone(),
            status_min: self.status_min,
            status_max: self.status_max,
            has_error: self.has_error,
            device_id: self.device_id.clone(),
            since_ms: self.since.as_deref().and_then(parse_time_ms),
            until_ms: self.until.as_deref().and_then(parse_time_ms),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FlowListResponse {
    pub flows: Vec<FlowRecord>,
    pub total: usize,
}

/// `GET /api/v1/proxy/flows`
pub async fn flows_list(
    State(s): State<Arc<Store>>,
    Query(params): Query<FlowParams>,
) -> Json<FlowListResponse> {
    let filter = params.to_filter();
    let flows =
        s.flows.query(&filter, Some(params.limit.unwrap_or(100).min(1000)), params.offset.unwrap_or(0));
    let total = flows.len();
    Json(FlowListResponse { flows, total })
}

/// `GET /api/v1/proxy/flows/{id}` — full detail including bodies.
pub async fn flow_detail(
    State(s): State<Arc<Store>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FlowRecord>> {
    s.flows
        .get(&id)
        .map(Json)
        .ok_or_else(|| QuernError::not_found(format!("no flow {id}")))
}

#[derive(Debug, Serialize)]
pub struct WaitResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowRecord>,
    pub elapsed_ms: u64,
}

/// `GET /api/v1/proxy/flows/wait` — long-poll for the first matching flow.
/// A timeout is a healthy 200 with `matched=false`, not an error.
pub async fn flows_wait(
    State(s): State<Arc<Store>>,
    Query(params): Query<FlowParams>,
) -> Json<WaitResponse> {
    let started = epoch_ms();
    let timeout = clamp_timeout(params.timeout_s, 30.0);
    let filter = params.to_filter();
    let since_ms = params.since.as_deref().and_then(parse_time_ms);

    let hit = s.flows.wait(&filter, timeout, since_ms).await;
    let elapsed_ms = epoch_ms().saturating_sub(started);
    Json(WaitResponse {
        matched: hit.is_some(),
        flow_id: hit.as_ref().map(|f| f.id),
        flow: hit,
        elapsed_ms,
    })
}

/// `GET /api/v1/proxy/flows/summary`
pub async fn flows_summary(
    State(s): State<Arc<Store>>,
    Query(params): Query<FlowParams>,
) -> Json<FlowSummary> {
    let summary = summarize_flows(
        &s.flows,
        params.to_filter(),
        params.since_cursor,
        params.window_s.map(|w| w * 1000),
    );
    Json(summary)
}
