// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source adapters: one per log origin, each converting an external stream
//! (subprocess stdout or a filesystem watch) into [`LogEntry`] records.
//!
//! There is no adapter type hierarchy — one interface plus shared parsing
//! helpers that live as free functions in the sibling modules. Each adapter
//! owns at most one subprocess.

pub mod build;
pub mod crash;
pub mod device_log;
pub mod oslog;
pub mod syslog;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::flows::FlowStore;
use crate::model::{FlowRecord, LogEntry, LogLevel, LogSource};
use crate::ring::LogRing;
use crate::runner::StreamingChild;

/// Where adapters deliver their output.
///
/// Flow delivery is ordered: the [`FlowRecord`] lands in the flow store
/// before its summary [`LogEntry`] becomes visible in the ring, so a reader
/// that sees the summary can always fetch the detail (until eviction).
#[derive(Clone)]
pub struct EntrySink {
    pub ring: Arc<LogRing>,
    pub flows: Arc<FlowStore>,
}

impl EntrySink {
    pub fn new(ring: Arc<LogRing>, flows: Arc<FlowStore>) -> Self {
        Self { ring, flows }
    }

    pub fn push(&self, entry: LogEntry) {
        self.ring.append(entry);
    }

    /// Store a flow and, on completion, synthesize its one-line summary
    /// entry sharing the flow id.
    pub fn push_flow(&self, flow: FlowRecord) {
        let summary = flow.summary_line();
        let level = if flow.error.is_some()
            || flow.response.as_ref().is_some_and(|r| r.status_code >= 400)
        {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let device_id = flow.device_id.clone();
        let id = flow.id;
        let timestamp = flow.timestamp;

        let result = self.flows.upsert(flow);
        if result.completed {
            let mut entry = LogEntry::new(level, LogSource::Proxy, summary);
            entry.id = id;
            entry.timestamp = timestamp;
            entry.device_id = device_id;
            self.ring.append(entry);
        }
    }
}

/// Lifecycle state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    Stopped,
    Running,
    /// Permanently off for this host (tool missing); `detail` says why.
    Disabled,
    Failed,
}

/// Reported through `GET /api/v1/logs/sources`.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    pub name: String,
    pub source: LogSource,
    pub state: AdapterState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub entries: u64,
}

/// The one adapter interface. Adapters never propagate process-level errors
/// to unrelated endpoints; failures land in `status()`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> String;
    fn source(&self) -> LogSource;
    async fn start(&self) -> Result<()>;
    async fn stop(&self);
    fn status(&self) -> AdapterStatus;
}

/// Shared bookkeeping every subprocess-backed adapter embeds.
pub(crate) struct AdapterCore {
    pub name: String,
    pub source: LogSource,
    pub sink: EntrySink,
    pub entries: Arc<AtomicU64>,
    pub state: parking_lot::Mutex<(AdapterState, Option<String>)>,
    pub cancel: parking_lot::Mutex<Option<CancellationToken>>,
}

impl AdapterCore {
    pub fn new(name: impl Into<String>, source: LogSource, sink: EntrySink) -> Self {
        Self {
            name: name.into(),
            source,
            sink,
            entries: Arc::new(AtomicU64::new(0)),
            state: parking_lot::Mutex::new((AdapterState::Stopped, None)),
            cancel: parking_lot::Mutex::new(None),
        }
    }

    pub fn set_state(&self, state: AdapterState, detail: Option<String>) {
        *self.state.lock() = (state, detail);
    }

    pub fn status(&self) -> AdapterStatus {
        let (state, detail) = self.state.lock().clone();
        AdapterStatus {
            name: self.name.clone(),
            source: self.source,
            state,
            detail,
            entries: self.entries.load(Ordering::Relaxed),
        }
    }

    /// Stop the pump task (and thereby terminate the child).
    pub async fn stop(&self) {
        let token = self.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        self.set_state(AdapterState::Stopped, None);
    }

    /// Drive a streaming child through `parse` into the sink until EOF or
    /// cancellation. Registers the cancel token and flips state to Running.
    pub fn spawn_pump(
        self: &Arc<Self>,
        mut child: StreamingChild,
        parse: impl Fn(&str) -> Option<LogEntry> + Send + 'static,
    ) {
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        self.set_state(AdapterState::Running, None);

        let core = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        child.terminate(Duration::from_secs(2)).await;
                        break;
                    }
                    line = child.lines.recv() => match line {
                        Some(line) => {
                            if let Some(mut entry) = parse(&line) {
                                entry.source = core.source;
                                core.entries.fetch_add(1, Ordering::Relaxed);
                                core.sink.push(entry);
                            }
                        }
                        None => {
                            // Child exited on its own.
                            let detail = match child.exit_code() {
                                Some(0) | None => None,
                                Some(code) => Some(format!(
                                    "stream exited with code {code}: {}",
                                    child.stderr_tail()
                                )),
                            };
                            let failed = detail.is_some();
                            core.set_state(
                                if failed { AdapterState::Failed } else { AdapterState::Stopped },
                                detail,
                            );
                            return;
                        }
                    }
                }
            }
        });
    }
}

/// Registry of live adapters, keyed by name. On-demand device logging
/// creates and removes entries at runtime.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: parking_lot::Mutex<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl AdapterRegistry {
    pub fn insert(&self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.lock().insert(adapter.name(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.lock().remove(name)
    }

    pub fn statuses(&self) -> Vec<AdapterStatus> {
        let mut statuses: Vec<AdapterStatus> =
            self.adapters.lock().values().map(|a| a.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub async fn stop_all(&self) {
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            self.adapters.lock().values().cloned().collect();
        for adapter in adapters {
            adapter.stop().await;
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
