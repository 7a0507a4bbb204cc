// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Drives the real `quern` binary against an isolated `--home` directory
//! and talks to it over HTTP like any other client.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

/// Resolve the path to the compiled `quern` binary.
pub fn quern_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("quern")
}

/// A quern daemon bound to a throwaway home directory. Stopped on drop.
pub struct QuernProcess {
    pub home: tempfile::TempDir,
    pub port: u16,
}

impl QuernProcess {
    /// Pick a free port for an isolated instance.
    pub fn free_port() -> anyhow::Result<u16> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        Ok(listener.local_addr()?.port())
    }

    /// Run a quern subcommand against this home, returning its output.
    pub fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        run_quern(self.home.path(), args)
    }

    /// Start a daemon and wait for it to answer health checks.
    pub async fn start() -> anyhow::Result<Self> {
        let home = tempfile::tempdir()?;
        let port = Self::free_port()?;
        let this = Self { home, port };

        let output = this.run(&["start", "--no-proxy", "--port", &port.to_string()])?;
        anyhow::ensure!(
            output.status.success(),
            "start failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        this.wait_healthy(Duration::from_secs(5)).await?;
        Ok(this)
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// The API key the daemon generated on first start.
    pub fn api_key(&self) -> anyhow::Result<String> {
        Ok(std::fs::read_to_string(self.home.path().join("api-key"))?.trim().to_owned())
    }

    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let url = format!("{}/health", self.base_url());
        loop {
            if let Ok(resp) = reqwest::get(&url).await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("quern did not become healthy within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for QuernProcess {
    fn drop(&mut self) {
        let _ = run_quern(self.home.path(), &["stop"]);
    }
}

/// Run the binary with `--home` injected.
pub fn run_quern(home: &Path, args: &[&str]) -> anyhow::Result<Output> {
    let mut cmd = Command::new(quern_binary());
    let subcommand = args.first().copied().unwrap_or("status");
    cmd.arg(subcommand);
    cmd.arg("--home").arg(home);
    for arg in &args[1..] {
        cmd.arg(arg);
    }
    Ok(cmd.output()?)
}
