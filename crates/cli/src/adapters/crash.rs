// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash watcher: observes a diagnostic-reports directory for new `.ips` /
//! `.crash` files, parses either format into a [`CrashReport`], emits an
//! error-level log entry, and optionally pipes the report JSON to a
//! user-configured hook command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::AsyncWriteExt;

use super::{AdapterCore, AdapterState, AdapterStatus, EntrySink, SourceAdapter};
use crate::error::Result;
use crate::model::{CrashFrame, CrashReport, LogEntry, LogLevel, LogSource};

/// Wall-clock budget for a crash hook before it is killed.
const HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// How many parsed reports are retained in memory.
const SPOOL_LIMIT: usize = 50;

/// Delay between seeing a new report file and reading it, so the writer can
/// finish.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// In-memory spool of parsed crash reports, newest last.
#[derive(Default)]
pub struct CrashSpool {
    reports: Mutex<Vec<CrashReport>>,
}

impl CrashSpool {
    pub fn push(&self, report: CrashReport) {
        let mut reports = self.reports.lock();
        reports.push(report);
        let excess = reports.len().saturating_sub(SPOOL_LIMIT);
        if excess > 0 {
            reports.drain(..excess);
        }
    }

    pub fn latest(&self) -> Option<CrashReport> {
        self.reports.lock().last().cloned()
    }

    pub fn all(&self) -> Vec<CrashReport> {
        self.reports.lock().clone()
    }
}

// -- Parsing ------------------------------------------------------------------

fn parse_capture_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a modern `.ips` report: a one-line JSON header followed by a JSON
/// body document.
pub fn parse_ips(content: &str, path: &str) -> Option<CrashReport> {
    let (header_line, body_text) = content.split_once('\n')?;
    let header: serde_json::Value = serde_json::from_str(header_line).ok()?;
    let body: serde_json::Value = serde_json::from_str(body_text).ok()?;

    let process = body
        .get("procName")
        .and_then(|v| v.as_str())
        .or_else(|| header.get("app_name").and_then(|v| v.as_str()))?
        .to_owned();

    let exception = body.get("exception");
    let faulting_thread = body.get("faultingThread").and_then(|v| v.as_u64()).map(|n| n as u32);

    let image_names: Vec<String> = body
        .get("usedImages")
        .and_then(|v| v.as_array())
        .map(|images| {
            images
                .iter()
                .map(|img| {
                    img.get("name").and_then(|v| v.as_str()).unwrap_or("<unknown>").to_owned()
                })
                .collect()
        })
        .unwrap_or_default();

    let frames = faulting_thread
        .and_then(|ft| body.get("threads")?.as_array()?.get(ft as usize).cloned())
        .and_then(|thread| thread.get("frames").cloned())
        .and_then(|frames| frames.as_array().cloned())
        .map(|frames| {
            frames
                .iter()
                .enumerate()
                .map(|(i, frame)| CrashFrame {
                    index: i as u32,
                    image: frame
                        .get("imageIndex")
                        .and_then(|v| v.as_u64())
                        .and_then(|idx| image_names.get(idx as usize).cloned())
                        .unwrap_or_else(|| "<unknown>".to_owned()),
                    symbol: frame
                        .get("symbol")
                        .and_then(|v| v.as_str())
                        .unwrap_or("<redacted>")
                        .to_owned(),
                    offset: frame.get("imageOffset").and_then(|v| v.as_u64()),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(CrashReport {
        process,
        bundle_id: body
            .pointer("/bundleInfo/CFBundleIdentifier")
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        exception_type: exception
            .and_then(|e| e.get("type"))
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        exception_codes: exception
            .and_then(|e| e.get("codes"))
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        signal: exception
            .and_then(|e| e.get("signal"))
            .and_then(|v| v.as_str())
            .map(str::to_owned),
        faulting_thread,
        frames,
        timestamp: body
            .get("captureTime")
            .and_then(|v| v.as_str())
            .and_then(parse_capture_time)
            .unwrap_or_else(Utc::now),
        path: path.to_owned(),
    })
}

/// Parse a legacy text `.crash` report.
pub fn parse_crash_text(content: &str, path: &str) -> Option<CrashReport> {
    fn field<'a>(content: &'a str, name: &str) -> Option<&'a str> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .map(|rest| rest.trim_start_matches(':').trim())
    }

    let process_raw = field(content, "Process")?;
    let process = process_raw.split(" [").next().unwrap_or(process_raw).trim().to_owned();

    let exception_type_raw = field(content, "Exception Type");
    // "EXC_BAD_ACCESS (SIGSEGV)" carries the signal in parentheses.
    let (exception_type, signal) = match exception_type_raw {
        Some(raw) => {
            let ty = raw.split(" (").next().map(str::to_owned);
            let sig = raw
                .split_once('(')
                .and_then(|(_, rest)| rest.strip_suffix(')'))
                .map(str::to_owned);
            (ty, sig)
        }
        None => (None, None),
    };

    let faulting_thread = field(content, "Triggered by Thread")
        .or_else(|| field(content, "Crashed Thread"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok());

    static FRAME_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let frame_re = FRAME_RE.get_or_init(|| {
        Regex::new(r"^(?P<idx>\d+)\s+(?P<image>\S+)\s+0x[0-9a-fA-F]+\s+(?P<symbol>.+?)(?:\s\+\s(?P<offset>\d+))?$").unwrap()
    });

    let frames = content
        .lines()
        .filter_map(|line| frame_re.captures(line.trim_end()))
        .map(|caps| CrashFrame {
            index: caps.name("idx").and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
            image: caps.name("image").map_or_else(String::new, |m| m.as_str().to_owned()),
            symbol: caps.name("symbol").map_or_else(String::new, |m| m.as_str().to_owned()),
            offset: caps.name("offset").and_then(|m| m.as_str().parse().ok()),
        })
        .collect();

    Some(CrashReport {
        process,
        bundle_id: field(content, "Identifier").map(str::to_owned),
        exception_type,
        exception_codes: field(content, "Exception Codes").map(str::to_owned),
        signal,
        faulting_thread,
        frames,
        timestamp: Utc::now(),
        path: path.to_owned(),
    })
}

/// Parse either report format based on extension.
pub fn parse_report(path: &Path, content: &str) -> Option<CrashReport> {
    let path_str = path.to_string_lossy();
    match path.extension().and_then(|e| e.to_str()) {
        Some("ips") => parse_ips(content, &path_str),
        Some("crash") => parse_crash_text(content, &path_str),
        _ => None,
    }
}

/// Render the one-line ring-buffer message for a report.
pub fn summary_message(report: &CrashReport) -> String {
    match (&report.exception_type, &report.signal) {
        (Some(ty), Some(sig)) => format!("Crash: {} \u{2014} {ty} ({sig})", report.process),
        (Some(ty), None) => format!("Crash: {} \u{2014} {ty}", report.process),
        _ => format!("Crash: {}", report.process),
    }
}

// -- Watcher adapter ----------------------------------------------------------

/// Watches a diagnostic-reports directory and feeds parsed reports into the
/// sink and spool.
pub struct CrashWatcher {
    core: Arc<AdapterCore>,
    dir: PathBuf,
    spool: Arc<CrashSpool>,
    hook: Option<String>,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl CrashWatcher {
    pub fn new(
        sink: EntrySink,
        dir: PathBuf,
        spool: Arc<CrashSpool>,
        hook: Option<String>,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore::new("crash", LogSource::Crash, sink)),
            dir,
            spool,
            hook,
            watcher: Mutex::new(None),
        }
    }

    /// Ingest one report file: parse, spool, log, hook.
    async fn ingest(
        core: &AdapterCore,
        spool: &CrashSpool,
        hook: Option<&str>,
        path: &Path,
    ) {
        tokio::time::sleep(SETTLE_DELAY).await;
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(path = %path.display(), err = %err, "crash report unreadable");
                return;
            }
        };
        let Some(report) = parse_report(path, &content) else {
            tracing::debug!(path = %path.display(), "crash report did not parse");
            return;
        };

        let mut entry = LogEntry::new(LogLevel::Error, LogSource::Crash, summary_message(&report));
        entry.process = Some(report.process.clone());
        entry.timestamp = report.timestamp;
        core.entries.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        core.sink.push(entry);

        if let Some(hook) = hook {
            run_hook(hook, &report).await;
        }
        spool.push(report);
    }
}

/// Run the crash hook detached: report JSON on stdin, 60 s wall clock,
/// never blocking the caller beyond the spawn itself.
async fn run_hook(hook: &str, report: &CrashReport) {
    let json = match serde_json::to_vec(report) {
        Ok(json) => json,
        Err(_) => return,
    };
    let hook = hook.to_owned();
    tokio::spawn(async move {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", &hook])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(err = %err, "crash hook failed to spawn");
                return;
            }
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&json).await;
            drop(stdin);
        }
        match tokio::time::timeout(HOOK_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                tracing::warn!(code = ?status.code(), "crash hook exited non-zero");
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("crash hook exceeded 60s, killing");
                let _ = child.kill().await;
            }
        }
    });
}

#[async_trait]
impl SourceAdapter for CrashWatcher {
    fn name(&self) -> String {
        self.core.name.clone()
    }

    fn source(&self) -> LogSource {
        LogSource::Crash
    }

    async fn start(&self) -> Result<()> {
        if !self.dir.exists() {
            self.core.set_state(
                AdapterState::Disabled,
                Some(format!("{} does not exist", self.dir.display())),
            );
            return Ok(());
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<PathBuf>(64);
        let mut watcher = match notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| {
                if let Ok(event) = result {
                    if matches!(event.kind, notify::EventKind::Create(_)) {
                        for path in event.paths {
                            let is_report = matches!(
                                path.extension().and_then(|e| e.to_str()),
                                Some("ips") | Some("crash")
                            );
                            if is_report {
                                let _ = tx.blocking_send(path);
                            }
                        }
                    }
                }
            },
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                self.core.set_state(AdapterState::Failed, Some(err.to_string()));
                return Ok(());
            }
        };

        if let Err(err) = watcher.watch(&self.dir, RecursiveMode::NonRecursive) {
            self.core.set_state(AdapterState::Failed, Some(err.to_string()));
            return Ok(());
        }
        *self.watcher.lock() = Some(watcher);
        self.core.set_state(AdapterState::Running, None);

        let core = Arc::clone(&self.core);
        let spool = Arc::clone(&self.spool);
        let hook = self.hook.clone();
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                CrashWatcher::ingest(&core, &spool, hook.as_deref(), &path).await;
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        self.watcher.lock().take();
        self.core.set_state(AdapterState::Stopped, None);
    }

    fn status(&self) -> AdapterStatus {
        self.core.status()
    }
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
