// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::{LogEntry, LogLevel, LogSource};

fn entry(level: LogLevel, message: &str) -> LogEntry {
    LogEntry::new(level, LogSource::Syslog, message)
}

#[test]
fn append_assigns_monotone_sequences() {
    let ring = LogRing::new(8);
    let a = ring.append(entry(LogLevel::Info, "a"));
    let b = ring.append(entry(LogLevel::Info, "b"));
    let c = ring.append(entry(LogLevel::Info, "c"));
    assert!(a < b && b < c);
}

#[test]
fn capacity_eviction_removes_exactly_one() {
    let ring = LogRing::new(4);
    for i in 0..4 {
        ring.append(entry(LogLevel::Info, &format!("m{i}")));
    }
    assert_eq!(ring.len(), 4);
    ring.append(entry(LogLevel::Info, "m4"));
    assert_eq!(ring.len(), 4);

    let result = ring.query(&LogQuery::default());
    let messages: Vec<&str> = result.entries.iter().map(|e| e.message.as_str()).collect();
    // Newest-first, oldest (m0) evicted.
    assert_eq!(messages, ["m4", "m3", "m2", "m1"]);
}

#[test]
fn query_newest_first_without_cursor() {
    let ring = LogRing::new(8);
    ring.append(entry(LogLevel::Info, "first"));
    ring.append(entry(LogLevel::Info, "second"));

    let result = ring.query(&LogQuery::default());
    assert_eq!(result.entries[0].message, "second");
    assert_eq!(result.entries[1].message, "first");
    assert_eq!(result.total_matched, 2);
}

#[test]
fn cursor_resume_returns_only_later_appends_in_order() {
    let ring = LogRing::new(16);
    ring.append(entry(LogLevel::Info, "a"));
    ring.append(entry(LogLevel::Info, "b"));
    let cursor = ring.query(&LogQuery::default()).cursor;

    ring.append(entry(LogLevel::Info, "c"));
    ring.append(entry(LogLevel::Info, "d"));

    let result = ring.query(&LogQuery { since_cursor: Some(cursor), ..LogQuery::default() });
    let messages: Vec<&str> = result.entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["c", "d"]);

    // Chaining: nothing new after the latest cursor.
    let again = ring.query(&LogQuery { since_cursor: Some(result.cursor), ..LogQuery::default() });
    assert!(again.entries.is_empty());
}

#[test]
fn cursor_roundtrip() {
    let c = Cursor { seq: 42, timestamp_ms: 1_700_000_000_123 };
    assert_eq!(Cursor::decode(&c.encode()), Some(c));
    assert_eq!(Cursor::decode("garbage"), None);
    assert_eq!(Cursor::decode("1-two"), None);
}

#[test]
fn level_floor_filter() {
    let ring = LogRing::new(8);
    ring.append(entry(LogLevel::Debug, "noise"));
    ring.append(entry(LogLevel::Error, "boom"));
    ring.append(entry(LogLevel::Warning, "hm"));

    let q = LogQuery {
        filter: LogFilter { min_level: Some(LogLevel::Warning), ..LogFilter::default() },
        ..LogQuery::default()
    };
    let result = ring.query(&q);
    let messages: Vec<&str> = result.entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["hm", "boom"]);
}

#[test]
fn search_and_exclude_filters() {
    let ring = LogRing::new(8);
    ring.append(entry(LogLevel::Info, "Failed to fetch user"));
    ring.append(entry(LogLevel::Info, "failed to fetch avatar"));
    ring.append(entry(LogLevel::Info, "all good"));

    let q = LogQuery {
        filter: LogFilter {
            search: Some("failed".to_owned()),
            exclude: Some("avatar".to_owned()),
            ..LogFilter::default()
        },
        ..LogQuery::default()
    };
    let result = ring.query(&q);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].message, "Failed to fetch user");
}

#[test]
fn source_set_membership() {
    let ring = LogRing::new(8);
    ring.append(LogEntry::new(LogLevel::Info, LogSource::Proxy, "flow"));
    ring.append(LogEntry::new(LogLevel::Info, LogSource::Build, "built"));

    let q = LogQuery {
        filter: LogFilter {
            sources: Some(vec![LogSource::Proxy]),
            ..LogFilter::default()
        },
        ..LogQuery::default()
    };
    assert_eq!(ring.query(&q).entries.len(), 1);
}

#[test]
fn limit_and_offset() {
    let ring = LogRing::new(16);
    for i in 0..6 {
        ring.append(entry(LogLevel::Info, &format!("m{i}")));
    }
    let q = LogQuery { limit: Some(2), offset: 1, ..LogQuery::default() };
    let result = ring.query(&q);
    let messages: Vec<&str> = result.entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["m4", "m3"]);
    assert_eq!(result.total_matched, 6);
}

#[tokio::test]
async fn subscribe_sees_appends_in_order() {
    let ring = LogRing::new(8);
    let mut rx = ring.subscribe();
    ring.append(entry(LogLevel::Info, "x"));
    ring.append(entry(LogLevel::Info, "y"));

    let first = rx.recv().await.ok().map(|e| e.message);
    let second = rx.recv().await.ok().map(|e| e.message);
    assert_eq!(first.as_deref(), Some("x"));
    assert_eq!(second.as_deref(), Some("y"));
}
