// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device syslog adapter: drives `idevicesyslog` and parses its line format
//! `{date} {device} {process}({subsystem})[{pid}] <{level}>: {message}`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use super::{AdapterCore, AdapterState, AdapterStatus, EntrySink, SourceAdapter};
use crate::error::{ErrorKind, Result, Tool};
use crate::model::{LogEntry, LogLevel, LogSource};
use crate::runner::StreamingChild;

/// The syslog line shape. `subsystem` is optional in practice; pid is not.
fn line_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(
            r"^(?P<date>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<device>\S+)\s+(?P<process>[^(\[]+)(?:\((?P<subsystem>[^)]*)\))?\[(?P<pid>\d+)\]\s+<(?P<level>\w+)>:\s?(?P<message>.*)$",
        )
        .unwrap()
    })
}

/// Map a syslog level name to our closed level set.
pub fn map_syslog_level(level: &str) -> LogLevel {
    match level.to_ascii_lowercase().as_str() {
        "emergency" | "alert" | "critical" | "error" => LogLevel::Error,
        "warning" => LogLevel::Warning,
        "notice" => LogLevel::Notice,
        "info" => LogLevel::Info,
        "debug" => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

/// Parse a `MMM d HH:MM:SS` syslog date (no year) into UTC, assuming the
/// device clock matches the host's local zone.
fn parse_syslog_date(date: &str) -> Option<DateTime<Utc>> {
    let now = Local::now();
    let with_year = format!("{} {}", now.year(), date);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S").ok()?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc))
}

/// Parse one syslog line. Unparseable input degrades to a `level=info`
/// entry carrying the raw line, per the ingest contract.
pub fn parse_line(line: &str) -> Option<LogEntry> {
    if line.trim().is_empty() {
        return None;
    }
    match line_regex().captures(line) {
        Some(caps) => {
            let mut entry = LogEntry::new(
                map_syslog_level(caps.name("level").map_or("", |m| m.as_str())),
                LogSource::Syslog,
                caps.name("message").map_or("", |m| m.as_str()),
            );
            if let Some(date) = caps.name("date").and_then(|m| parse_syslog_date(m.as_str())) {
                entry.timestamp = date;
            }
            entry.device_id = caps.name("device").map(|m| m.as_str().to_owned());
            entry.process = caps.name("process").map(|m| m.as_str().trim().to_owned());
            entry.subsystem =
                caps.name("subsystem").map(|m| m.as_str().to_owned()).filter(|s| !s.is_empty());
            entry.pid = caps.name("pid").and_then(|m| m.as_str().parse().ok());
            Some(entry)
        }
        None => {
            let mut entry = LogEntry::new(LogLevel::Info, LogSource::Syslog, line);
            entry.raw = Some(line.to_owned());
            Some(entry)
        }
    }
}

/// Streams `idevicesyslog` for all connected devices (or one, with `-u`).
pub struct SyslogAdapter {
    core: Arc<AdapterCore>,
    udid: Option<String>,
}

impl SyslogAdapter {
    pub fn new(sink: EntrySink, udid: Option<String>) -> Self {
        let name = match &udid {
            Some(u) => format!("syslog:{u}"),
            None => "syslog".to_owned(),
        };
        Self { core: Arc::new(AdapterCore::new(name, LogSource::Syslog, sink)), udid }
    }
}

#[async_trait]
impl SourceAdapter for SyslogAdapter {
    fn name(&self) -> String {
        self.core.name.clone()
    }

    fn source(&self) -> LogSource {
        LogSource::Syslog
    }

    async fn start(&self) -> Result<()> {
        let mut args: Vec<&str> = vec!["--no-colors"];
        if let Some(ref udid) = self.udid {
            args.push("-u");
            args.push(udid);
        }
        match StreamingChild::spawn("idevicesyslog", Tool::Log, &args) {
            Ok(child) => {
                self.core.spawn_pump(child, parse_line);
                Ok(())
            }
            Err(err) if err.kind == ErrorKind::ToolMissing => {
                // Graceful degradation: the adapter is off, not the server.
                self.core.set_state(AdapterState::Disabled, Some(err.message.clone()));
                tracing::info!(adapter = %self.core.name, "idevicesyslog not found, adapter disabled");
                Ok(())
            }
            Err(err) => {
                self.core.set_state(AdapterState::Failed, Some(err.message.clone()));
                Err(err)
            }
        }
    }

    async fn stop(&self) {
        self.core.stop().await;
    }

    fn status(&self) -> AdapterStatus {
        self.core.status()
    }
}

#[cfg(test)]
#[path = "syslog_tests.rs"]
mod tests;
