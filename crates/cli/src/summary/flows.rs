// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow digest: by-host aggregation, top error patterns, top slow requests,
//! and a prose paragraph.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{DEFAULT_WINDOW, TOP_N};
use crate::flows::{FlowFilter, FlowStore};
use crate::model::{epoch_ms, FlowRecord};

#[derive(Debug, Clone, Serialize)]
pub struct HostStats {
    pub host: String,
    pub total: usize,
    pub success: usize,
    #[serde(rename = "4xx")]
    pub client_errors: usize,
    #[serde(rename = "5xx")]
    pub server_errors: usize,
    pub connection_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowErrorDigest {
    /// E.g. `POST /v1/login → 401` or `GET / → connection refused`.
    pub pattern: String,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowRequest {
    pub method: String,
    pub url: String,
    pub total_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub text: String,
    pub by_host: Vec<HostStats>,
    pub top_errors: Vec<FlowErrorDigest>,
    pub slowest: Vec<SlowRequest>,
    pub flows_scanned: usize,
    pub cursor: String,
}

fn error_pattern(flow: &FlowRecord) -> Option<String> {
    match (&flow.response, &flow.error) {
        (Some(resp), _) if resp.status_code >= 400 => Some(format!(
            "{} {} \u{2192} {}",
            flow.request.method, flow.request.path, resp.status_code
        )),
        (None, Some(err)) => {
            Some(format!("{} {} \u{2192} {}", flow.request.method, flow.request.path, err))
        }
        _ => None,
    }
}

/// Digest the flow store over a window or since a millisecond cursor.
pub fn summarize_flows(
    store: &FlowStore,
    mut filter: FlowFilter,
    since_cursor_ms: Option<u64>,
    window_ms: Option<u64>,
) -> FlowSummary {
    let now = epoch_ms();
    filter.since_ms = Some(match since_cursor_ms {
        // Strictly after the cursor.
        Some(cursor) => cursor + 1,
        None => {
            filter.since_ms.unwrap_or_else(|| {
                now.saturating_sub(window_ms.unwrap_or(DEFAULT_WINDOW.as_millis() as u64))
            })
        }
    });

    let mut flows = store.query(&filter, None, 0);
    flows.sort_by_key(|f| f.timestamp);

    let mut by_host: Vec<HostStats> = Vec::new();
    let mut latencies: Vec<(usize, Vec<f64>)> = Vec::new();
    for flow in &flows {
        let host_key = host_with_port(flow);
        let idx = match by_host.iter().position(|h| h.host == host_key) {
            Some(idx) => idx,
            None => {
                by_host.push(HostStats {
                    host: host_key,
                    total: 0,
                    success: 0,
                    client_errors: 0,
                    server_errors: 0,
                    connection_errors: 0,
                    avg_latency_ms: None,
                });
                latencies.push((by_host.len() - 1, Vec::new()));
                by_host.len() - 1
            }
        };
        let stats = &mut by_host[idx];
        stats.total += 1;
        match (&flow.response, &flow.error) {
            (Some(resp), _) => match resp.status_code {
                200..=399 => stats.success += 1,
                400..=499 => stats.client_errors += 1,
                _ => stats.server_errors += 1,
            },
            (None, Some(_)) => stats.connection_errors += 1,
            (None, None) => {}
        }
        if let Some(total) = flow.timing.as_ref().and_then(|t| t.total) {
            if let Some((_, lat)) = latencies.iter_mut().find(|(i, _)| *i == idx) {
                lat.push(total);
            }
        }
    }
    for (idx, lat) in latencies {
        if !lat.is_empty() {
            by_host[idx].avg_latency_ms = Some(lat.iter().sum::<f64>() / lat.len() as f64);
        }
    }
    by_host.sort_by(|a, b| b.total.cmp(&a.total));

    let mut top_errors: Vec<FlowErrorDigest> = Vec::new();
    for flow in &flows {
        let Some(pattern) = error_pattern(flow) else { continue };
        match top_errors.iter_mut().find(|e| e.pattern == pattern) {
            Some(digest) => {
                digest.count += 1;
                digest.last_seen = flow.timestamp;
            }
            None => top_errors.push(FlowErrorDigest {
                pattern,
                count: 1,
                first_seen: flow.timestamp,
                last_seen: flow.timestamp,
            }),
        }
    }
    top_errors.sort_by(|a, b| b.count.cmp(&a.count));
    top_errors.truncate(TOP_N);

    let mut slowest: Vec<SlowRequest> = flows
        .iter()
        .filter_map(|f| {
            f.timing.as_ref().and_then(|t| t.total).map(|total_ms| SlowRequest {
                method: f.request.method.clone(),
                url: f.request.url.clone(),
                total_ms,
                status: f.response.as_ref().map(|r| r.status_code),
            })
        })
        .collect();
    slowest.sort_by(|a, b| b.total_ms.partial_cmp(&a.total_ms).unwrap_or(std::cmp::Ordering::Equal));
    slowest.truncate(TOP_N);

    let cursor = flows
        .last()
        .map(|f| f.timestamp.timestamp_millis().max(0) as u64)
        .or(since_cursor_ms)
        .unwrap_or(now);

    let text = compose_text(&flows, &by_host, &top_errors);
    FlowSummary {
        text,
        by_host,
        top_errors,
        slowest,
        flows_scanned: flows.len(),
        cursor: cursor.to_string(),
    }
}

/// Hosts are keyed with their explicit port when the URL carries one.
fn host_with_port(flow: &FlowRecord) -> String {
    // The captured host field already includes the port for non-default
    // ports (mitmproxy reports `host:port` in pretty_host only for
    // non-standard ports via the URL).
    if flow.request.host.contains(':') {
        return flow.request.host.clone();
    }
    if let Some(rest) = flow.request.url.split("://").nth(1) {
        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.contains(':') {
            return authority.to_owned();
        }
    }
    flow.request.host.clone()
}

fn compose_text(
    flows: &[FlowRecord],
    by_host: &[HostStats],
    top_errors: &[FlowErrorDigest],
) -> String {
    if flows.is_empty() {
        return "No flows captured in the window.".to_owned();
    }
    let failures: usize =
        by_host.iter().map(|h| h.client_errors + h.server_errors + h.connection_errors).sum();
    let mut text = format!(
        "{} flow(s) across {} host(s); {} failed.",
        flows.len(),
        by_host.len(),
        failures
    );
    if let Some(top) = by_host.first() {
        text.push_str(&format!(" Busiest: {} ({} requests).", top.host, top.total));
    }
    if let Some(err) = top_errors.first() {
        text.push_str(&format!(" Top error: {} ({}x).", err.pattern, err.count));
    }
    text
}

#[cfg(test)]
#[path = "flows_tests.rs"]
mod tests;
