// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log digest: level counts, top repeated error patterns, resolution
//! detection, lifecycle mentions, and a prose paragraph composed from those
//! facts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::{patterns, DEFAULT_WINDOW, TOP_N};
use crate::model::{epoch_ms, LogEntry, LogLevel};
use crate::ring::{Cursor, LogFilter, LogQuery, LogRing};

fn resolution_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"(?i)\b(succe|connected|restored|recovered|online|reachable)").unwrap()
    })
}

fn lifecycle_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"(?i)\b(launch|did become active|backgrounded|entered background|foreground|terminated|will resign)")
            .unwrap()
    })
}

/// One recurring issue in the window.
#[derive(Debug, Clone, Serialize)]
pub struct IssueDigest {
    pub pattern: String,
    pub count: usize,
    pub level: LogLevel,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// A later success-looking entry from the same process was observed.
    pub resolved: bool,
    /// One verbatim example of the collapsed messages.
    pub example: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub text: String,
    pub counts: BTreeMap<String, usize>,
    pub issues: Vec<IssueDigest>,
    pub lifecycle: Vec<String>,
    pub entries_scanned: usize,
    pub cursor: String,
}

/// Digest the ring over a window or since a cursor.
pub fn summarize_logs(
    ring: &LogRing,
    filter: LogFilter,
    since_cursor: Option<Cursor>,
    window_ms: Option<u64>,
) -> LogSummary {
    let query = match since_cursor {
        Some(cursor) => LogQuery { filter, since_cursor: Some(cursor), ..LogQuery::default() },
        None => LogQuery {
            filter,
            since_ms: Some(
                epoch_ms().saturating_sub(window_ms.unwrap_or(DEFAULT_WINDOW.as_millis() as u64)),
            ),
            ..LogQuery::default()
        },
    };
    let result = ring.query(&query);
    let mut entries = result.entries;
    // Normalize to append order for first/last bookkeeping.
    entries.sort_by_key(|e| e.seq);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &entries {
        *counts.entry(entry.level.as_str().to_owned()).or_default() += 1;
    }

    let issues = collect_issues(&entries);
    let lifecycle = entries
        .iter()
        .filter(|e| lifecycle_regex().is_match(&e.message))
        .map(|e| e.message.clone())
        .take(TOP_N)
        .collect();

    let text = compose_text(&entries, &counts, &issues);
    LogSummary {
        text,
        counts,
        issues,
        lifecycle,
        entries_scanned: entries.len(),
        cursor: result.cursor.encode(),
    }
}

fn collect_issues(entries: &[LogEntry]) -> Vec<IssueDigest> {
    struct Bucket<'a> {
        count: usize,
        level: LogLevel,
        first: &'a LogEntry,
        last: &'a LogEntry,
    }

    let mut buckets: Vec<(String, Bucket)> = Vec::new();
    for entry in entries.iter().filter(|e| e.level >= LogLevel::Warning) {
        let pattern = patterns::normalize(&entry.message);
        match buckets.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, bucket)) => {
                bucket.count += 1;
                bucket.last = entry;
                bucket.level = bucket.level.max(entry.level);
            }
            None => buckets.push((
                pattern,
                Bucket { count: 1, level: entry.level, first: entry, last: entry },
            )),
        }
    }

    let mut issues: Vec<IssueDigest> = buckets
        .into_iter()
        .map(|(pattern, bucket)| {
            // Resolution: a later success-looking entry from the same process.
            let resolved = entries.iter().any(|e| {
                e.seq > bucket.last.seq
                    && e.level < LogLevel::Warning
                    && e.process == bucket.last.process
                    && resolution_regex().is_match(&e.message)
            });
            IssueDigest {
                pattern,
                count: bucket.count,
                level: bucket.level,
                first_seen: bucket.first.timestamp,
                last_seen: bucket.last.timestamp,
                resolved,
                example: bucket.first.message.clone(),
            }
        })
        .collect();

    issues.sort_by(|a, b| b.count.cmp(&a.count));
    issues.truncate(TOP_N);
    issues
}

fn compose_text(
    entries: &[LogEntry],
    counts: &BTreeMap<String, usize>,
    issues: &[IssueDigest],
) -> String {
    if entries.is_empty() {
        return "No log entries in the window.".to_owned();
    }

    let errors = counts.get("error").copied().unwrap_or(0) + counts.get("fault").copied().unwrap_or(0);
    let warnings = counts.get("warning").copied().unwrap_or(0);
    let mut text = format!(
        "{} entries: {} error(s), {} warning(s).",
        entries.len(),
        errors,
        warnings
    );

    if let Some(top) = issues.first() {
        text.push_str(&format!(
            " Most frequent issue ({}x): {}{}",
            top.count,
            top.example,
            if top.resolved { " [appears resolved]" } else { "" }
        ));
    }
    text
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
