// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified log adapter: drives `log stream --style ndjson` with a predicate
//! and maps its JSON objects onto [`LogEntry`] fields directly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{AdapterCore, AdapterState, AdapterStatus, EntrySink, SourceAdapter};
use crate::error::{ErrorKind, Result, Tool};
use crate::model::{LogEntry, LogLevel, LogSource};
use crate::runner::StreamingChild;

#[derive(Debug, Deserialize)]
struct OslogEvent {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "eventMessage", default)]
    event_message: Option<String>,
    #[serde(rename = "messageType", default)]
    message_type: Option<String>,
    #[serde(default)]
    subsystem: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "processImagePath", default)]
    process_image_path: Option<String>,
    #[serde(rename = "processID", default)]
    process_id: Option<u32>,
}

/// `log stream` timestamps look like `2026-02-07 14:23:01.123456-0800`.
fn parse_oslog_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn map_message_type(message_type: Option<&str>) -> LogLevel {
    match message_type.unwrap_or("Default") {
        "Error" => LogLevel::Error,
        "Fault" => LogLevel::Fault,
        "Info" => LogLevel::Info,
        "Debug" => LogLevel::Debug,
        _ => LogLevel::Notice,
    }
}

/// Parse one ndjson line from the unified log tool. Non-JSON framing lines
/// (the header `log` prints before the stream) are dropped.
pub fn parse_ndjson_line(line: &str) -> Option<LogEntry> {
    let event: OslogEvent = serde_json::from_str(line.trim_start_matches(',')).ok()?;
    let message = event.event_message?;

    let mut entry =
        LogEntry::new(map_message_type(event.message_type.as_deref()), LogSource::Oslog, message);
    if let Some(ts) = event.timestamp.as_deref().and_then(parse_oslog_timestamp) {
        entry.timestamp = ts;
    }
    entry.subsystem = event.subsystem.filter(|s| !s.is_empty());
    entry.category = event.category.filter(|s| !s.is_empty());
    entry.process = event
        .process_image_path
        .as_deref()
        .and_then(|p| p.rsplit('/').next())
        .map(str::to_owned);
    entry.pid = event.process_id;
    Some(entry)
}

/// Streams the host unified log, filtered by a predicate expression.
pub struct OslogAdapter {
    core: Arc<AdapterCore>,
    predicate: Option<String>,
}

impl OslogAdapter {
    pub fn new(sink: EntrySink, predicate: Option<String>) -> Self {
        Self { core: Arc::new(AdapterCore::new("oslog", LogSource::Oslog, sink)), predicate }
    }
}

#[async_trait]
impl SourceAdapter for OslogAdapter {
    fn name(&self) -> String {
        self.core.name.clone()
    }

    fn source(&self) -> LogSource {
        LogSource::Oslog
    }

    async fn start(&self) -> Result<()> {
        let mut args: Vec<&str> = vec!["stream", "--style", "ndjson"];
        if let Some(ref predicate) = self.predicate {
            args.push("--predicate");
            args.push(predicate);
        }
        match StreamingChild::spawn("log", Tool::Log, &args) {
            Ok(child) => {
                self.core.spawn_pump(child, parse_ndjson_line);
                Ok(())
            }
            Err(err) if err.kind == ErrorKind::ToolMissing => {
                self.core.set_state(AdapterState::Disabled, Some(err.message.clone()));
                tracing::info!("unified log tool not found, oslog adapter disabled");
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
#[path = "oslog_tests.rs"]
mod tests;
