// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory store of captured HTTP flows with id lookup, filtered
//! range queries, and a long-poll `wait` primitive.
//!
//! Eviction is oldest-first and never touches the summary log entries that
//! were synthesized into the ring buffer: summary retention outlives detail.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{epoch_ms, FlowRecord, FlowStatus};

/// Default flow store capacity.
pub const DEFAULT_CAPACITY: usize = 5_000;

const SUBSCRIBE_DEPTH: usize = 256;

/// How far back `wait` looks by default, to catch flows that landed between
/// the triggering action and the wait call.
pub const WAIT_LOOKBACK: Duration = Duration::from_secs(5);

/// Server-side flow filter.
#[derive(Debug, Clone, Default)]
pub struct FlowFilter {
    /// Case-insensitive substring on the host.
    pub host: Option<String>,
    /// Case-insensitive substring on the path.
    pub path_contains: Option<String>,
    /// Exact method, case-insensitive.
    pub method: Option<String>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub has_error: Option<bool>,
    pub device_id: Option<String>,
    pub since_ms: Option<u64>,
    pub until_ms: Option<u64>,
}

impl FlowFilter {
    pub fn matches(&self, flow: &FlowRecord) -> bool {
        if let Some(ref host) = self.host {
            if !flow.request.host.to_lowercase().contains(&host.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref path) = self.path_contains {
            if !flow.request.path.to_lowercase().contains(&path.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref method) = self.method {
            if !flow.request.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        let status = flow.response.as_ref().map(|r| r.status_code);
        if let Some(min) = self.status_min {
            match status {
                Some(s) if s >= min => {}
                _ => return false,
            }
        }
        if let Some(max) = self.status_max {
            match status {
                Some(s) if s <= max => {}
                _ => return false,
            }
        }
        if let Some(wants_error) = self.has_error {
            if flow.error.is_some() != wants_error {
                return false;
            }
        }
        if let Some(ref d) = self.device_id {
            if flow.device_id.as_deref() != Some(d.as_str()) {
                return false;
            }
        }
        let ts = flow.timestamp.timestamp_millis().max(0) as u64;
        if let Some(since) = self.since_ms {
            if ts < since {
                return false;
            }
        }
        if let Some(until) = self.until_ms {
            if ts > until {
                return false;
            }
        }
        true
    }
}

/// What an upsert did, so the caller can decide whether to synthesize the
/// paired summary log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertResult {
    pub is_new: bool,
    /// The flow is now in a terminal state and was not before (or arrived
    /// terminal). Fires at most once per flow id.
    pub completed: bool,
}

struct FlowsInner {
    flows: VecDeque<FlowRecord>,
    index: HashMap<Uuid, usize>,
    /// Count of flows ever evicted; `index` stores position + base.
    base: usize,
}

impl FlowsInner {
    fn position(&self, id: &Uuid) -> Option<usize> {
        self.index.get(id).map(|global| global - self.base)
    }
}

/// The shared flow store.
pub struct FlowStore {
    inner: Mutex<FlowsInner>,
    capacity: usize,
    tx: broadcast::Sender<FlowRecord>,
}

impl FlowStore {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBE_DEPTH);
        Self {
            inner: Mutex::new(FlowsInner {
                flows: VecDeque::new(),
                index: HashMap::new(),
                base: 0,
            }),
            capacity,
            tx,
        }
    }

    /// Insert or update a flow by id. Evicts the oldest flow at capacity.
    pub fn upsert(&self, flow: FlowRecord) -> UpsertResult {
        let result;
        {
            let mut inner = self.inner.lock();
            match inner.position(&flow.id) {
                Some(pos) => {
                    let was_pending = inner.flows[pos].status == FlowStatus::Pending;
                    let now_terminal = flow.status != FlowStatus::Pending;
                    inner.flows[pos] = flow.clone();
                    result = UpsertResult { is_new: false, completed: was_pending && now_terminal };
                }
                None => {
                    if inner.flows.len() == self.capacity {
                        if let Some(evicted) = inner.flows.pop_front() {
                            inner.index.remove(&evicted.id);
                        }
                        inner.base += 1;
                    }
                    let global = inner.base + inner.flows.len();
                    inner.index.insert(flow.id, global);
                    inner.flows.push_back(flow.clone());
                    result = UpsertResult {
                        is_new: true,
                        completed: flow.status != FlowStatus::Pending,
                    };
                }
            }
        }
        let _ = self.tx.send(flow);
        result
    }

    pub fn get(&self, id: &Uuid) -> Option<FlowRecord> {
        let inner = self.inner.lock();
        inner.position(id).map(|pos| inner.flows[pos].clone())
    }

    /// Filtered query, newest-first.
    pub fn query(&self, filter: &FlowFilter, limit: Option<usize>, offset: usize) -> Vec<FlowRecord> {
        let inner = self.inner.lock();
        inner
            .flows
            .iter()
            .rev()
            .filter(|f| filter.matches(f))
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.base += inner.flows.len();
        inner.flows.clear();
        inner.index.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Long-poll for the first flow matching `filter` that arrived at or
    /// after `since_ms` (default: now minus [`WAIT_LOOKBACK`]).
    ///
    /// Returns `None` at timeout — a healthy no-match, not an error.
    pub async fn wait(
        &self,
        filter: &FlowFilter,
        timeout: Duration,
        since_ms: Option<u64>,
    ) -> Option<FlowRecord> {
        let since = since_ms.unwrap_or_else(|| epoch_ms().saturating_sub(WAIT_LOOKBACK.as_millis() as u64));

        // Subscribe before scanning the backlog so no arrival is missed.
        let mut rx = self.tx.subscribe();

        let mut windowed = filter.clone();
        windowed.since_ms = Some(windowed.since_ms.unwrap_or(since));
        // query() is newest-first; the contract wants the FIRST matching
        // flow after the cursor, so take the oldest backlog match.
        if let Some(hit) = self.query(&windowed, None, 0).pop() {
            return Some(hit);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(flow)) => {
                    if windowed.matches(&flow) {
                        return Some(flow);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return None,
            }
        }
    }
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "flows_tests.rs"]
mod tests;
