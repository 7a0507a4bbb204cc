// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Held-flow table: flows paused by an intercept rule, each with a 30 s
//! auto-release deadline. Every held flow has exactly one outcome —
//! release, modify-release, drop, or auto-release by the sweeper.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::protocol::InterceptPhase;

/// Grace before an undecided held flow is auto-released.
pub const AUTO_RELEASE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct HeldFlow {
    pub flow_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub phase: InterceptPhase,
}

/// How a held flow left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeldOutcome {
    Released,
    ModifiedReleased,
    Dropped,
    AutoReleased,
}

pub struct HeldFlows {
    table: Mutex<HashMap<Uuid, HeldFlow>>,
    added_tx: broadcast::Sender<HeldFlow>,
}

impl Default for HeldFlows {
    fn default() -> Self {
        Self::new()
    }
}

impl HeldFlows {
    pub fn new() -> Self {
        let (added_tx, _) = broadcast::channel(64);
        Self { table: Mutex::new(HashMap::new()), added_tx }
    }

    pub fn add(&self, flow_id: Uuid, phase: InterceptPhase) -> HeldFlow {
        let captured_at = Utc::now();
        let held = HeldFlow {
            flow_id,
            captured_at,
            deadline: captured_at
                + chrono::Duration::from_std(AUTO_RELEASE).unwrap_or(chrono::Duration::seconds(30)),
            phase,
        };
        self.table.lock().insert(flow_id, held.clone());
        let _ = self.added_tx.send(held.clone());
        held
    }

    /// Take a flow out of the table with its outcome. `None` if it was
    /// already decided.
    pub fn decide(&self, flow_id: &Uuid, outcome: HeldOutcome) -> Option<HeldFlow> {
        let removed = self.table.lock().remove(flow_id);
        if let Some(ref held) = removed {
            tracing::debug!(flow_id = %held.flow_id, ?outcome, "held flow decided");
        }
        removed
    }

    pub fn list(&self) -> Vec<HeldFlow> {
        self.list_where(|_| true)
    }

    /// Held flows satisfying `matches`, oldest capture first.
    pub fn list_where(&self, matches: impl Fn(&HeldFlow) -> bool) -> Vec<HeldFlow> {
        let mut held: Vec<HeldFlow> =
            self.table.lock().values().filter(|h| matches(h)).cloned().collect();
        held.sort_by_key(|h| h.captured_at);
        held
    }

    pub fn get(&self, flow_id: &Uuid) -> Option<HeldFlow> {
        self.table.lock().get(flow_id).cloned()
    }

    /// Flows whose deadline has passed; they stay in the table until the
    /// sweeper decides them so exactly one outcome is recorded.
    pub fn expired(&self) -> Vec<HeldFlow> {
        let now = Utc::now();
        self.table.lock().values().filter(|h| h.deadline <= now).cloned().collect()
    }

    /// Long-poll: return immediately when anything is held, otherwise wait
    /// for the next addition up to `timeout`.
    pub async fn wait_any(&self, timeout: Duration) -> Vec<HeldFlow> {
        self.wait_matching(timeout, |_| true).await
    }

    /// Long-poll for held flows satisfying `matches`: the filtered backlog
    /// when non-empty, otherwise the first matching addition before the
    /// timeout.
    pub async fn wait_matching(
        &self,
        timeout: Duration,
        matches: impl Fn(&HeldFlow) -> bool + Send,
    ) -> Vec<HeldFlow> {
        // Subscribe before scanning the backlog so no addition is missed.
        let mut rx = self.added_tx.subscribe();
        let existing = self.list_where(&matches);
        if !existing.is_empty() {
            return existing;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Vec::new();
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(held)) => {
                    if matches(&held) {
                        return vec![held];
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                _ => return Vec::new(),
            }
        }
    }
}

#[cfg(test)]
#[path = "held_tests.rs"]
mod tests;
