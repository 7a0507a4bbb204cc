// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::model::{FlowRequest, FlowResponse, FlowTiming, Headers};
use chrono::Utc;

fn flow(method: &str, host: &str, path: &str, status: Option<u16>) -> FlowRecord {
    let (response, error, state) = match status {
        Some(code) => (
            Some(FlowResponse {
                status_code: code,
                reason: None,
                headers: Headers::default(),
                body: None,
                body_size: 0,
                body_truncated: false,
                body_full_size: None,
                body_encoding: None,
            }),
            None,
            FlowStatus::Complete,
        ),
        None => (None, Some("connection refused".to_owned()), FlowStatus::Error),
    };
    FlowRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        status: state,
        request: FlowRequest {
            method: method.to_owned(),
            url: format!("https://{host}{path}"),
            host: host.to_owned(),
            path: path.to_owned(),
            headers: Headers::default(),
            body: None,
            body_size: 0,
            body_truncated: false,
            body_full_size: None,
            body_encoding: None,
        },
        response,
        timing: Some(FlowTiming::default()),
        tls: None,
        error,
        device_id: None,
        tags: vec![],
    }
}

#[test]
fn upsert_and_get_by_id() {
    let store = FlowStore::new(8);
    let f = flow("GET", "api.example.com", "/v1/user", Some(200));
    let id = f.id;
    let result = store.upsert(f);
    assert!(result.is_new);
    assert!(result.completed);
    assert_eq!(store.get(&id).map(|f| f.request.path), Some("/v1/user".to_owned()));
}

#[test]
fn update_marks_completion_once() {
    let store = FlowStore::new(8);
    let mut f = flow("GET", "api.example.com", "/v1/user", Some(200));
    f.status = FlowStatus::Pending;
    f.response = None;
    let id = f.id;

    assert!(!store.upsert(f.clone()).completed);

    f.status = FlowStatus::Complete;
    f.response = flow("GET", "api.example.com", "/v1/user", Some(200)).response;
    let second = store.upsert(f.clone());
    assert!(!second.is_new);
    assert!(second.completed);

    // A further update does not fire completion again.
    assert!(!store.upsert(f).completed);
    assert_eq!(store.len(), 1);
    assert!(store.get(&id).is_some());
}

#[test]
fn eviction_is_oldest_first_and_drops_index() {
    let store = FlowStore::new(2);
    let a = flow("GET", "a.example.com", "/", Some(200));
    let a_id = a.id;
    store.upsert(a);
    store.upsert(flow("GET", "b.example.com", "/", Some(200)));
    store.upsert(flow("GET", "c.example.com", "/", Some(200)));

    assert_eq!(store.len(), 2);
    assert!(store.get(&a_id).is_none());
    let hosts: Vec<String> =
        store.query(&FlowFilter::default(), None, 0).iter().map(|f| f.request.host.clone()).collect();
    assert_eq!(hosts, ["c.example.com", "b.example.com"]);
}

#[test]
fn filters_match_status_range_and_error() {
    let store = FlowStore::new(8);
    store.upsert(flow("GET", "api.example.com", "/ok", Some(200)));
    store.upsert(flow("POST", "api.example.com", "/login", Some(401)));
    store.upsert(flow("GET", "down.example.com", "/", None));

    let four_xx = FlowFilter { status_min: Some(400), status_max: Some(499), ..FlowFilter::default() };
    assert_eq!(store.query(&four_xx, None, 0).len(), 1);

    let errors = FlowFilter { has_error: Some(true), ..FlowFilter::default() };
    let hits = store.query(&errors, None, 0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].request.host, "down.example.com");

    let method = FlowFilter { method: Some("post".to_owned()), ..FlowFilter::default() };
    assert_eq!(store.query(&method, None, 0).len(), 1);

    let path = FlowFilter { path_contains: Some("/LOGIN".to_owned()), ..FlowFilter::default() };
    assert_eq!(store.query(&path, None, 0).len(), 1);
}

#[test]
fn clear_empties_store() {
    let store = FlowStore::new(8);
    store.upsert(flow("GET", "api.example.com", "/", Some(200)));
    store.clear();
    assert!(store.is_empty());
    assert!(store.query(&FlowFilter::default(), None, 0).is_empty());
}

#[tokio::test]
async fn wait_returns_immediately_for_backlog_match() {
    let store = FlowStore::new(8);
    store.upsert(flow("GET", "api.example.com", "/login", Some(200)));

    let filter = FlowFilter { path_contains: Some("/login".to_owned()), ..FlowFilter::default() };
    let hit = store.wait(&filter, Duration::from_secs(3), None).await;
    assert!(hit.is_some());
}

#[tokio::test]
async fn wait_returns_earliest_of_multiple_backlog_matches() {
    let store = FlowStore::new(8);
    store.upsert(flow("GET", "api.example.com", "/first", Some(200)));
    store.upsert(flow("GET", "api.example.com", "/second", Some(200)));
    store.upsert(flow("GET", "api.example.com", "/third", Some(200)));

    let filter = FlowFilter { host: Some("api.example.com".to_owned()), ..FlowFilter::default() };
    let hit = store.wait(&filter, Duration::from_secs(3), None).await;
    assert_eq!(hit.map(|f| f.request.path), Some("/first".to_owned()));
}

#[tokio::test]
async fn wait_picks_up_late_arrival() {
    let store = std::sync::Arc::new(FlowStore::new(8));
    let writer = std::sync::Arc::clone(&store);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer.upsert(flow("POST", "api.example.com", "/login", Some(401)));
    });

    let filter = FlowFilter { host: Some("api.example.com".to_owned()), ..FlowFilter::default() };
    let hit = store.wait(&filter, Duration::from_secs(3), None).await;
    assert_eq!(hit.map(|f| f.request.method), Some("POST".to_owned()));
}

#[tokio::test]
async fn wait_times_out_cleanly() {
    let store = FlowStore::new(8);
    let started = std::time::Instant::now();
    let filter = FlowFilter { host: Some("nowhere.example.com".to_owned()), ..FlowFilter::default() };
    let hit = store.wait(&filter, Duration::from_millis(200), None).await;
    assert!(hit.is_none());
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_millis(600));
}
