// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform subprocess execution: one-shot runs with bounded output and
//! timeouts, and streaming children with line-delimited stdio and a
//! soft-terminate / hard-kill ladder.
//!
//! Spawn failures split into `ToolMissing` (executable not found) and
//! `SubprocessFailed` (any other OS error). Stderr is always captured and
//! surfaced on error, never silently discarded.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};

use crate::error::{ErrorKind, QuernError, Result, Tool};

/// Default timeout for one-shot tool invocations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How much stderr is retained for error messages.
const STDERR_TAIL_LIMIT: usize = 8 * 1024;

/// How much of the stderr tail is embedded in an error message.
const STDERR_PREFIX: usize = 500;

/// Completed output of a one-shot tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// First [`STDERR_PREFIX`] bytes of stderr, newline-trimmed.
    pub fn stderr_prefix(&self) -> &str {
        let mut end = self.stderr.len().min(STDERR_PREFIX);
        while !self.stderr.is_char_boundary(end) {
            end -= 1;
        }
        self.stderr[..end].trim_end()
    }
}

fn spawn_error(tool: &str, tag: Tool, err: &std::io::Error) -> QuernError {
    if err.kind() == std::io::ErrorKind::NotFound {
        QuernError::tool_missing(tag, format!("{tool} not found on PATH; install it to enable this feature"))
    } else {
        QuernError::tool(ErrorKind::SubprocessFailed, tag, format!("failed to spawn {tool}: {err}"))
    }
}

/// Run a tool to completion with a timeout, returning its output regardless
/// of exit status. The child is killed if the timeout elapses.
pub async fn run_raw(tool: &str, tag: Tool, args: &[&str], timeout: Duration) -> Result<ToolOutput> {
    let mut cmd = Command::new(tool);
    cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let future = cmd.output();
    let output = match tokio::time::timeout(timeout, future).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(spawn_error(tool, tag, &err)),
        Err(_) => {
            return Err(QuernError::tool(
                ErrorKind::Timeout,
                tag,
                format!("{tool} timed out after {}s", timeout.as_secs()),
            ))
        }
    };

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    })
}

/// Run a tool to completion and require exit code zero.
pub async fn run_ok(tool: &str, tag: Tool, args: &[&str], timeout: Duration) -> Result<ToolOutput> {
    let output = run_raw(tool, tag, args, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(QuernError::tool(
            ErrorKind::SubprocessFailed,
            tag,
            format!(
                "{tool} exited with {:?}: {}",
                output.code,
                output.stderr_prefix()
            ),
        ))
    }
}

/// Seam between subsystems and the operating system: everything that shells
/// out goes through this trait so tests can substitute a scripted runner.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// One-shot invocation requiring exit code zero.
    async fn run(&self, tool: &str, tag: Tool, args: &[String]) -> Result<ToolOutput>;

    /// One-shot invocation returning output regardless of exit status.
    async fn run_unchecked(&self, tool: &str, tag: Tool, args: &[String]) -> Result<ToolOutput>;
}

/// The production runner: real subprocesses with the default timeout.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, tool: &str, tag: Tool, args: &[String]) -> Result<ToolOutput> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_ok(tool, tag, &refs, DEFAULT_TIMEOUT).await
    }

    async fn run_unchecked(&self, tool: &str, tag: Tool, args: &[String]) -> Result<ToolOutput> {
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_raw(tool, tag, &refs, DEFAULT_TIMEOUT).await
    }
}

/// A long-lived child with line-delimited stdio.
///
/// Stdout lines arrive on `lines`; stderr is drained into a bounded tail; the
/// exit status is observable through a watch channel so multiple owners
/// (watchdog, teardown) can await it independently.
pub struct StreamingChild {
    pub lines: mpsc::Receiver<String>,
    pub pid: u32,
    stdin: Option<ChildStdin>,
    exit_rx: watch::Receiver<Option<i32>>,
    stderr_tail: Arc<Mutex<String>>,
}

impl StreamingChild {
    /// Spawn a streaming child. Stdout is split into lines; stderr is drained
    /// into the retained tail.
    pub fn spawn(tool: &str, tag: Tool, args: &[&str]) -> Result<Self> {
        let mut cmd = Command::new(tool);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| spawn_error(tool, tag, &e))?;
        let pid = child.id().unwrap_or_default();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (line_tx, lines) = mpsc::channel(1024);
        if let Some(stdout) = stdout {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if line_tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = stderr {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    let mut tail = tail.lock();
                    if tail.len() < STDERR_TAIL_LIMIT {
                        tail.push_str(&line);
                        tail.push('\n');
                    }
                }
            });
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().or(Some(-1)),
                Err(_) => Some(-1),
            };
            let _ = exit_tx.send(code);
        });

        Ok(Self { lines, pid, stdin, exit_rx, stderr_tail })
    }

    /// Write one line to the child's stdin and flush.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    /// Exit code if the child has exited.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// A watch receiver resolving once the child exits. Usable by a watchdog
    /// without exclusive ownership of the child.
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.exit_rx.clone()
    }

    /// Retained stderr tail (up to 8 KB).
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.lock().clone()
    }

    /// Soft-terminate, wait up to `grace`, then hard-kill. Stdio drains via
    /// the reader tasks either way.
    pub async fn terminate(&mut self, grace: Duration) {
        self.stdin.take();
        if self.exit_code().is_some() {
            return;
        }
        let pid = Pid::from_raw(self.pid as i32);
        let _ = kill(pid, Signal::SIGTERM);

        let mut rx = self.exit_rx.clone();
        let exited = tokio::time::timeout(grace, async {
            while rx.borrow().is_none() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok();

        if !exited {
            let _ = kill(pid, Signal::SIGKILL);
            let mut rx = self.exit_rx.clone();
            let _ = tokio::time::timeout(Duration::from_secs(2), async {
                while rx.borrow().is_none() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
