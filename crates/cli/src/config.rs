// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Server configuration, shared by `start` and the daemonized child.
#[derive(Debug, Clone, Parser)]
pub struct Config {
    /// HTTP port to listen on (scans upward when taken).
    #[arg(long, env = "QUERN_PORT", default_value = "9100")]
    pub port: u16,

    /// Interception proxy port (default: server port + 1, scanning upward).
    #[arg(long, env = "QUERN_PROXY_PORT")]
    pub proxy_port: Option<u16>,

    /// Do not start the interception proxy.
    #[arg(long)]
    pub no_proxy: bool,

    /// Run in the foreground instead of daemonizing.
    #[arg(long)]
    pub foreground: bool,

    /// Verbose logging (debug level).
    #[arg(long, short)]
    pub verbose: bool,

    /// Command piped a crash-report JSON on stdin whenever a crash lands.
    #[arg(long, env = "QUERN_ON_CRASH")]
    pub on_crash: Option<String>,

    /// State directory (default: ~/.quern).
    #[arg(long, env = "QUERN_HOME")]
    pub home: Option<PathBuf>,

    /// Log format (text or json).
    #[arg(long, env = "QUERN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level override (QUERN_LOG_LEVEL > RUST_LOG > info).
    #[arg(long, env = "QUERN_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("--port must be non-zero");
        }
        if let Some(proxy_port) = self.proxy_port {
            if proxy_port == self.port {
                anyhow::bail!("--proxy-port must differ from --port");
            }
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    /// The state directory, `~/.quern` unless overridden.
    pub fn home_dir(&self) -> PathBuf {
        match &self.home {
            Some(home) => home.clone(),
            None => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".quern"),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.home_dir().join("state.json")
    }

    pub fn pool_path(&self) -> PathBuf {
        self.home_dir().join("device-pool.json")
    }

    pub fn api_key_path(&self) -> PathBuf {
        self.home_dir().join("api-key")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home_dir().join("quern.log")
    }

    /// The interception addon script installed by the setup tooling.
    pub fn addon_path(&self) -> PathBuf {
        self.home_dir().join("addon.py")
    }

    /// Effective log-level directive for the tracing filter.
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            return "debug".to_owned();
        }
        self.log_level.clone().unwrap_or_else(|| "info".to_owned())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
