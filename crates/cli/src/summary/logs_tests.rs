// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::model::{LogEntry, LogSource};
use crate::ring::LogRing;

fn push(ring: &LogRing, level: LogLevel, process: &str, message: &str) {
    let mut entry = LogEntry::new(level, LogSource::Syslog, message);
    entry.process = Some(process.to_owned());
    ring.append(entry);
}

#[test]
fn counts_by_level() {
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Error, "MyApp", "boom");
    push(&ring, LogLevel::Error, "MyApp", "boom again");
    push(&ring, LogLevel::Info, "MyApp", "fine");

    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert_eq!(summary.counts.get("error"), Some(&2));
    assert_eq!(summary.counts.get("info"), Some(&1));
    assert_eq!(summary.entries_scanned, 3);
}

#[test]
fn repeated_errors_collapse_to_one_issue() {
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Error, "MyApp", "request 42 failed after 1500 ms");
    push(&ring, LogLevel::Error, "MyApp", "request 7 failed after 3000 ms");
    push(&ring, LogLevel::Error, "MyApp", "request 9 failed after 100 ms");
    push(&ring, LogLevel::Warning, "Other", "slow frame");

    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert_eq!(summary.issues.len(), 2);
    assert_eq!(summary.issues[0].count, 3);
    assert!(summary.issues[0].example.contains("request 42"));
}

#[test]
fn resolution_detection() {
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Error, "MyApp", "token refresh failed");
    push(&ring, LogLevel::Error, "MyApp", "token refresh failed");
    push(&ring, LogLevel::Info, "MyApp", "token refresh succeeded");

    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert!(summary.issues[0].resolved);

    // A success from a different process does not resolve the issue.
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Error, "MyApp", "token refresh failed");
    push(&ring, LogLevel::Info, "OtherApp", "token refresh succeeded");
    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert!(!summary.issues[0].resolved);
}

#[test]
fn lifecycle_mentions_collected() {
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Notice, "SpringBoard", "MyApp launch finished");
    push(&ring, LogLevel::Notice, "MyApp", "application did become active");
    push(&ring, LogLevel::Info, "MyApp", "nothing interesting");

    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert_eq!(summary.lifecycle.len(), 2);
}

#[test]
fn cursor_narrows_to_delta() {
    let ring = Arc::new(LogRing::new(64));
    push(&ring, LogLevel::Error, "MyApp", "first wave");
    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    let cursor = crate::ring::Cursor::decode(&summary.cursor);
    assert!(cursor.is_some());

    push(&ring, LogLevel::Error, "MyApp", "second wave");
    let delta = summarize_logs(&ring, LogFilter::default(), cursor, None);
    assert_eq!(delta.entries_scanned, 1);
    assert!(delta.issues[0].example.contains("second wave"));
}

#[test]
fn empty_window_has_calm_text() {
    let ring = Arc::new(LogRing::new(8));
    let summary = summarize_logs(&ring, LogFilter::default(), None, None);
    assert_eq!(summary.text, "No log entries in the window.");
    assert!(summary.issues.is_empty());
}
