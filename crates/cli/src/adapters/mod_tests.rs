// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::model::{FlowRequest, FlowResponse, FlowStatus, Headers};
use crate::ring::LogQuery;
use chrono::Utc;
use uuid::Uuid;

fn sink() -> EntrySink {
    EntrySink::new(Arc::new(LogRing::new(64)), Arc::new(FlowStore::new(16)))
}

fn complete_flow() -> FlowRecord {
    FlowRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        status: FlowStatus::Complete,
        request: FlowRequest {
            method: "GET".to_owned(),
            url: "https://api.example.com/v1/user".to_owned(),
            host: "api.example.com".to_owned(),
            path: "/v1/user".to_owned(),
            headers: Headers::default(),
            body: None,
            body_size: 0,
            body_truncated: false,
            body_full_size: None,
            body_encoding: None,
        },
        response: Some(FlowResponse {
            status_code: 200,
            reason: None,
            headers: Headers::default(),
            body: None,
            body_size: 0,
            body_truncated: false,
            body_full_size: None,
            body_encoding: None,
        }),
        timing: None,
        tls: None,
        error: None,
        device_id: None,
        tags: vec![],
    }
}

#[test]
fn flow_and_summary_share_an_id() {
    let sink = sink();
    let flow = complete_flow();
    let id = flow.id;
    sink.push_flow(flow);

    assert!(sink.flows.get(&id).is_some());
    let entries = sink.ring.query(&LogQuery::default()).entries;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].source, LogSource::Proxy);
}

#[test]
fn pending_flow_defers_summary_until_completion() {
    let sink = sink();
    let mut flow = complete_flow();
    flow.status = FlowStatus::Pending;
    flow.response = None;
    let id = flow.id;

    sink.push_flow(flow.clone());
    assert!(sink.flows.get(&id).is_some());
    assert!(sink.ring.is_empty());

    flow.status = FlowStatus::Complete;
    flow.response = complete_flow().response;
    sink.push_flow(flow);
    assert_eq!(sink.ring.len(), 1);
}

#[test]
fn failed_flow_logs_at_error_level() {
    let sink = sink();
    let mut flow = complete_flow();
    flow.response = None;
    flow.error = Some("connection refused".to_owned());
    flow.status = FlowStatus::Error;
    sink.push_flow(flow);

    let entries = sink.ring.query(&LogQuery::default()).entries;
    assert_eq!(entries[0].level, LogLevel::Error);
}

struct StubAdapter {
    name: String,
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn source(&self) -> LogSource {
        LogSource::Oslog
    }
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) {}
    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            name: self.name.clone(),
            source: LogSource::Oslog,
            state: AdapterState::Running,
            detail: None,
            entries: 0,
        }
    }
}

#[tokio::test]
async fn registry_tracks_named_adapters() {
    let registry = AdapterRegistry::default();
    registry.insert(Arc::new(StubAdapter { name: "b".to_owned() }));
    registry.insert(Arc::new(StubAdapter { name: "a".to_owned() }));

    assert!(registry.get("a").is_some());
    let names: Vec<String> = registry.statuses().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["a", "b"]);

    registry.remove("a");
    assert!(registry.get("a").is_none());
    registry.stop_all().await;
}
