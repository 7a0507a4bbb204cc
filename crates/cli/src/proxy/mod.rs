// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The network-proxy subsystem: owns exactly one interception process,
//! brokers its JSON-lines control plane, and tracks intercept / mock /
//! held-flow state. A watchdog observes the child; unexpected exit flips
//! status to `crashed` with no automatic restart.

pub mod cert;
pub mod held;
pub mod protocol;
pub mod rules;
pub mod system;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::EntrySink;
use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::FlowRecord;
use crate::runner::StreamingChild;

pub use cert::{CertStatus, CertTracker, CertVerification};
pub use held::{HeldFlow, HeldFlows, HeldOutcome};
pub use protocol::{FlowModifications, InterceptPhase, InterceptorCommand, InterceptorEvent, StatusEvent};
pub use rules::{InterceptRule, MockRule, RuleStore};
pub use system::{SystemProxy, SystemProxySnapshot};

/// Grace given to the interceptor on stop before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Sweep cadence for held-flow auto-release.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
}

/// Options for starting the interceptor.
#[derive(Debug, Clone, Default)]
pub struct ProxyStartOptions {
    /// Transparent per-process local capture instead of a listening proxy.
    pub local_capture: Option<String>,
}

struct RunningProxy {
    cancel: CancellationToken,
    command_tx: mpsc::Sender<String>,
    port: u16,
}

pub struct ProxySubsystem {
    sink: EntrySink,
    addon_path: PathBuf,
    interceptor_tool: String,
    pub rules: RuleStore,
    pub held: Arc<HeldFlows>,
    pub certs: CertTracker,
    state: Mutex<ProxyStatus>,
    status_tx: watch::Sender<ProxyStatus>,
    running: tokio::sync::Mutex<Option<RunningProxy>>,
    /// Last stderr tail from a crashed interceptor, for diagnostics.
    last_error: Mutex<Option<String>>,
}

impl ProxySubsystem {
    pub fn new(sink: EntrySink, addon_path: PathBuf) -> Arc<Self> {
        Self::with_interceptor(sink, addon_path, "mitmdump")
    }

    /// Constructor with a custom interceptor binary (tests use a shell).
    pub fn with_interceptor(
        sink: EntrySink,
        addon_path: PathBuf,
        interceptor_tool: &str,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ProxyStatus::Stopped);
        Arc::new(Self {
            sink,
            addon_path,
            interceptor_tool: interceptor_tool.to_owned(),
            rules: RuleStore::default(),
            held: Arc::new(HeldFlows::new()),
            certs: CertTracker::default(),
            state: Mutex::new(ProxyStatus::Stopped),
            status_tx,
            running: tokio::sync::Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    pub fn status(&self) -> ProxyStatus {
        *self.state.lock()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Subscribe to status transitions (the lifecycle layer mirrors them
    /// into the state file).
    pub fn status_watch(&self) -> watch::Receiver<ProxyStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: ProxyStatus) {
        *self.state.lock() = status;
        let _ = self.status_tx.send(status);
    }

    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }

    /// Start the interception process on `port`.
    pub async fn start(self: &Arc<Self>, port: u16, options: ProxyStartOptions) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(QuernError::conflict("proxy is already running"));
        }
        self.set_status(ProxyStatus::Starting);

        let addon = self.addon_path.to_string_lossy().into_owned();
        let port_str = port.to_string();
        let mut args: Vec<&str> = vec!["-q", "-p", &port_str, "-s", &addon];
        let mode;
        if let Some(ref spec) = options.local_capture {
            mode = format!("local:{spec}");
            args.push("--mode");
            args.push(&mode);
        }

        let mut child = match StreamingChild::spawn(&self.interceptor_tool, Tool::Mitm, &args) {
            Ok(child) => child,
            Err(err) => {
                self.set_status(ProxyStatus::Stopped);
                return Err(err);
            }
        };

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel::<String>(64);

        // Writer: commands → child stdin. Owns the child so it can also
        // terminate it on cancel; the reader gets the line receiver.
        let lines = std::mem::replace(&mut child.lines, mpsc::channel(1).1);
        let exit_rx = child.exit_watch();
        self.spawn_writer(child, command_rx, cancel.clone());
        self.spawn_reader(lines, cancel.clone());
        self.spawn_watchdog(exit_rx, cancel.clone());
        self.spawn_sweeper(cancel.clone());

        *running = Some(RunningProxy { cancel, command_tx, port });
        self.set_status(ProxyStatus::Running);
        tracing::info!(port, "interception process started");
        Ok(())
    }

    fn spawn_writer(
        self: &Arc<Self>,
        mut child: StreamingChild,
        mut command_rx: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        child.terminate(STOP_GRACE).await;
                        break;
                    }
                    command = command_rx.recv() => match command {
                        Some(line) => {
                            if let Err(err) = child.write_line(&line).await {
                                tracing::warn!(err = %err, "interceptor stdin write failed");
                            }
                        }
                        None => break,
                    }
                }
            }
        });
    }

    fn spawn_reader(self: &Arc<Self>, mut lines: mpsc::Receiver<String>, cancel: CancellationToken) {
        let subsystem = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.recv() => match line {
                        Some(line) => subsystem.handle_line(&line),
                        None => break,
                    }
                }
            }
        });
    }

    fn handle_line(&self, line: &str) {
        let Some(event) = protocol::parse_event(line) else {
            // mitmproxy chatter; transient read noise is logged, not raised.
            tracing::trace!(line, "non-protocol interceptor output");
            return;
        };
        match event {
            InterceptorEvent::Flow { flow } => {
                self.sink.push_flow(*flow);
            }
            InterceptorEvent::Status(status) => match status {
                StatusEvent::Started { port } => {
                    tracing::info!(?port, "interceptor reports started");
                }
                StatusEvent::ClientConnected { peer } => {
                    tracing::debug!(?peer, "proxy client connected");
                }
                StatusEvent::Error { message } => {
                    tracing::warn!(message = %message, "interceptor error");
                    *self.last_error.lock() = Some(message);
                }
                StatusEvent::Held { flow_id, phase } => {
                    self.held.add(flow_id, phase);
                }
                StatusEvent::RuleEcho { rule_id } => {
                    self.rules.on_rule_echo(&rule_id);
                }
            },
        }
    }

    fn spawn_watchdog(
        self: &Arc<Self>,
        mut exit_rx: watch::Receiver<Option<i32>>,
        cancel: CancellationToken,
    ) {
        let subsystem = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = exit_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let code = *exit_rx.borrow();
                        if let Some(code) = code {
                            if cancel.is_cancelled() {
                                return;
                            }
                            // Deliberate stops cancel first; reaching here
                            // means the child died on its own.
                            tracing::error!(code, "interception process exited unexpectedly");
                            subsystem.set_status(ProxyStatus::Crashed);
                            *subsystem.running.lock().await = None;
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Auto-release expired held flows: absence of a client decision is
    /// itself a decision.
    fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) {
        let subsystem = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                        for held in subsystem.held.expired() {
                            tracing::info!(flow_id = %held.flow_id, "auto-releasing held flow");
                            let _ = subsystem
                                .send_command(InterceptorCommand::Release {
                                    flow_id: held.flow_id,
                                    modifications: None,
                                })
                                .await;
                            subsystem.held.decide(&held.flow_id, HeldOutcome::AutoReleased);
                        }
                    }
                }
            }
        });
    }

    /// Stop the interceptor and clear transient state.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            running.cancel.cancel();
            // The writer task handles terminate; give it a beat.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.rules.clear_all();
        self.set_status(ProxyStatus::Stopped);
    }

    async fn send_command(&self, command: InterceptorCommand) -> Result<()> {
        let line = command.encode().ok_or_else(|| {
            QuernError::tool(ErrorKind::Internal, Tool::Mitm, "command serialization failed")
        })?;
        let running = self.running.lock().await;
        let Some(ref running) = *running else {
            return Err(QuernError::tool(
                ErrorKind::Degraded,
                Tool::Mitm,
                "proxy is not running",
            ));
        };
        running
            .command_tx
            .send(line)
            .await
            .map_err(|_| QuernError::tool(ErrorKind::Degraded, Tool::Mitm, "proxy control channel closed"))
    }

    // -- Rule operations ------------------------------------------------------

    pub async fn set_intercept(&self, pattern: String, phase: InterceptPhase) -> Result<InterceptRule> {
        let rule = self.rules.add_intercept(pattern.clone(), phase);
        self.send_command(InterceptorCommand::SetIntercept {
            rule_id: rule.rule_id.clone(),
            pattern,
            phase,
        })
        .await?;
        Ok(rule)
    }

    pub async fn clear_intercepts(&self, rule_id: Option<String>) -> Result<Vec<String>> {
        let removed = self.rules.clear_intercepts(rule_id.as_deref());
        self.send_command(InterceptorCommand::ClearIntercept { rule_id }).await?;
        Ok(removed)
    }

    pub async fn set_mock(
        &self,
        pattern: String,
        status_code: u16,
        headers: IndexMap<String, Vec<String>>,
        body: String,
    ) -> Result<MockRule> {
        let rule = self.rules.add_mock(pattern, status_code, headers, body)?;
        self.send_command(InterceptorCommand::SetMock {
            rule_id: rule.rule_id.clone(),
            pattern: rule.pattern.clone(),
            status_code: rule.status_code,
            headers: rule.headers.clone(),
            body: rule.body.clone(),
        })
        .await?;
        Ok(rule)
    }

    pub async fn update_mock(
        &self,
        rule_id: &str,
        pattern: Option<String>,
        status_code: Option<u16>,
        headers: Option<IndexMap<String, Vec<String>>>,
        body: Option<String>,
    ) -> Result<MockRule> {
        let rule = self.rules.update_mock(
            rule_id,
            pattern.clone(),
            status_code,
            headers.clone(),
            body.clone(),
        )?;
        self.send_command(InterceptorCommand::UpdateMock {
            rule_id: rule_id.to_owned(),
            pattern,
            status_code,
            headers,
            body,
        })
        .await?;
        Ok(rule)
    }

    pub async fn clear_mocks(&self, rule_id: Option<String>) -> Result<Vec<String>> {
        let removed = self.rules.clear_mocks(rule_id.as_deref());
        self.send_command(InterceptorCommand::ClearMocks { rule_id }).await?;
        Ok(removed)
    }

    pub async fn set_filter(&self, pattern: String) -> Result<()> {
        self.send_command(InterceptorCommand::SetFilter { pattern }).await
    }

    // -- Held-flow operations -------------------------------------------------

    pub async fn release(&self, flow_id: Uuid, modifications: Option<FlowModifications>) -> Result<HeldOutcome> {
        let Some(_held) = self.held.get(&flow_id) else {
            return Err(QuernError::not_found(format!("flow {flow_id} is not held")));
        };
        let outcome = match modifications {
            Some(ref m) if !m.is_empty() => HeldOutcome::ModifiedReleased,
            _ => HeldOutcome::Released,
        };
        self.send_command(InterceptorCommand::Release { flow_id, modifications }).await?;
        self.held.decide(&flow_id, outcome);
        Ok(outcome)
    }

    pub async fn drop_flow(&self, flow_id: Uuid) -> Result<()> {
        let Some(_held) = self.held.get(&flow_id) else {
            return Err(QuernError::not_found(format!("flow {flow_id} is not held")));
        };
        self.send_command(InterceptorCommand::Drop { flow_id }).await?;
        self.held.decide(&flow_id, HeldOutcome::Dropped);
        Ok(())
    }

    // -- Replay ---------------------------------------------------------------

    /// Re-send a captured request through the interceptor. The replayed
    /// flow arrives as a fresh event with a new id.
    pub async fn replay(
        &self,
        flow: &FlowRecord,
        modifications: Option<FlowModifications>,
    ) -> Result<()> {
        self.send_command(InterceptorCommand::Replay {
            flow_id: flow.id,
            request: flow.request.clone(),
            modifications,
        })
        .await
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
