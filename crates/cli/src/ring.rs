// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory log store with monotone sequence numbers, opaque
//! cursors, filtered range queries, and real-time fan-out.
//!
//! Appends never block producers: the critical section is a short
//! `parking_lot` lock, and slow subscribers are dropped by the broadcast
//! channel rather than waited on.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::model::{LogEntry, LogLevel, LogSource};

/// Default ring capacity in entries.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Broadcast channel depth for real-time subscribers.
const SUBSCRIBE_DEPTH: usize = 1024;

/// Opaque resume point: the sequence number and timestamp of the last entry
/// a reader has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub seq: u64,
    pub timestamp_ms: u64,
}

impl Cursor {
    /// Encode to the wire form handed to clients.
    pub fn encode(&self) -> String {
        format!("{}-{}", self.seq, self.timestamp_ms)
    }

    /// Decode a client-supplied cursor. Malformed input yields `None`.
    pub fn decode(s: &str) -> Option<Self> {
        let (seq, ts) = s.split_once('-')?;
        Some(Self { seq: seq.parse().ok()?, timestamp_ms: ts.parse().ok()? })
    }
}

/// Server-side entry filter shared by query, stream, and summary paths.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Minimum level (floor); entries below it are excluded.
    pub min_level: Option<LogLevel>,
    pub process: Option<String>,
    pub subsystem: Option<String>,
    pub category: Option<String>,
    /// Source set membership; `None` admits every source.
    pub sources: Option<Vec<LogSource>>,
    /// Case-insensitive substring that must appear in the message.
    pub search: Option<String>,
    /// Case-insensitive substring that must NOT appear in the message.
    pub exclude: Option<String>,
    pub device_id: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(floor) = self.min_level {
            if entry.level < floor {
                return false;
            }
        }
        if let Some(ref p) = self.process {
            if entry.process.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        if let Some(ref s) = self.subsystem {
            if entry.subsystem.as_deref() != Some(s.as_str()) {
                return false;
            }
        }
        if let Some(ref c) = self.category {
            if entry.category.as_deref() != Some(c.as_str()) {
                return false;
            }
        }
        if let Some(ref sources) = self.sources {
            if !sources.contains(&entry.source) {
                return false;
            }
        }
        if let Some(ref d) = self.device_id {
            if entry.device_id.as_deref() != Some(d.as_str()) {
                return false;
            }
        }
        if let Some(ref needle) = self.search {
            if !entry.message.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref needle) = self.exclude {
            if entry.message.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Parameters for a range query.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub filter: LogFilter,
    /// Inclusive lower timestamp bound (epoch ms).
    pub since_ms: Option<u64>,
    /// Inclusive upper timestamp bound (epoch ms).
    pub until_ms: Option<u64>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Resume point: only entries strictly after this cursor are returned,
    /// in append order (oldest first).
    pub since_cursor: Option<Cursor>,
}

/// Result of a range query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub entries: Vec<LogEntry>,
    /// Resume cursor covering everything in the ring at query time.
    pub cursor: Cursor,
    /// Total matches before limit/offset were applied.
    pub total_matched: usize,
}

struct RingInner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    /// Timestamp (epoch ms) of the most recent append, for cursor synthesis.
    last_timestamp_ms: u64,
}

/// The shared ring buffer. Cheap to clone behind an `Arc` in the store.
pub struct LogRing {
    inner: Mutex<RingInner>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBE_DEPTH);
        Self {
            inner: Mutex::new(RingInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 1,
                last_timestamp_ms: 0,
            }),
            capacity,
            tx,
        }
    }

    /// Append an entry, assigning its sequence number. Evicts the oldest
    /// entry when the ring is at capacity. Returns the assigned sequence.
    pub fn append(&self, mut entry: LogEntry) -> u64 {
        let seq;
        {
            let mut inner = self.inner.lock();
            seq = inner.next_seq;
            inner.next_seq += 1;
            entry.seq = seq;
            inner.last_timestamp_ms = entry.timestamp.timestamp_millis().max(0) as u64;
            if inner.entries.len() == self.capacity {
                inner.entries.pop_front();
            }
            inner.entries.push_back(entry.clone());
        }
        // No receivers is fine.
        let _ = self.tx.send(entry);
        seq
    }

    /// Subscribe to entries appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    /// Cursor covering everything currently in the ring.
    pub fn head_cursor(&self) -> Cursor {
        let inner = self.inner.lock();
        Cursor { seq: inner.next_seq.saturating_sub(1), timestamp_ms: inner.last_timestamp_ms }
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range/filter query.
    ///
    /// Without `since_cursor`, results are newest-first. With it, results are
    /// the entries strictly after the cursor, in append order, so a reader
    /// chaining cursors sees every entry exactly once and in order.
    pub fn query(&self, q: &LogQuery) -> QueryResult {
        let inner = self.inner.lock();
        let cursor =
            Cursor { seq: inner.next_seq.saturating_sub(1), timestamp_ms: inner.last_timestamp_ms };

        let matches = |e: &LogEntry| -> bool {
            if let Some(c) = q.since_cursor {
                if e.seq <= c.seq {
                    return false;
                }
            }
            let ts = e.timestamp.timestamp_millis().max(0) as u64;
            if let Some(since) = q.since_ms {
                if ts < since {
                    return false;
                }
            }
            if let Some(until) = q.until_ms {
                if ts > until {
                    return false;
                }
            }
            q.filter.matches(e)
        };

        let mut matched: Vec<&LogEntry> = inner.entries.iter().filter(|e| matches(e)).collect();
        let total_matched = matched.len();
        if q.since_cursor.is_none() {
            matched.reverse();
        }

        let limit = q.limit.unwrap_or(usize::MAX);
        let entries =
            matched.into_iter().skip(q.offset).take(limit).cloned().collect::<Vec<_>>();

        QueryResult { entries, cursor, total_matched }
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
