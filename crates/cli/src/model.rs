// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core entities shared across the ingest pipeline, proxy subsystem, and
//! device control plane.
//!
//! Everything here is a closed sum type or a plain record: open maps are
//! reserved for HTTP headers (insertion-ordered) and process environments.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Insertion-ordered header multimap. Order is part of the captured flow.
pub type Headers = IndexMap<String, Vec<String>>;

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// -- Logs ---------------------------------------------------------------------

/// Severity of a log entry. Variant order is the level-floor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Fault,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fault => "fault",
        }
    }

    /// Parse a level name, case-insensitive. Unknown names map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "notice" | "default" => Some(Self::Notice),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "fault" | "critical" => Some(Self::Fault),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a log entry — one variant per adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Syslog,
    Oslog,
    Simulator,
    Device,
    Crash,
    Build,
    Proxy,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::Oslog => "oslog",
            Self::Simulator => "simulator",
            Self::Device => "device",
            Self::Crash => "crash",
            Self::Build => "build",
            Self::Proxy => "proxy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "syslog" => Some(Self::Syslog),
            "oslog" => Some(Self::Oslog),
            "simulator" => Some(Self::Simulator),
            "device" => Some(Self::Device),
            "crash" => Some(Self::Crash),
            "build" => Some(Self::Build),
            "proxy" => Some(Self::Proxy),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log record. Immutable once appended to the ring buffer.
///
/// `seq` is assigned by the ring at append time and is monotone within a
/// server process; `id` is stable and shared with a [`FlowRecord`] when the
/// entry is a synthesized flow summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    #[serde(default)]
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: LogSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LogEntry {
    /// Build an entry with a fresh id, current timestamp, and newline-normalized
    /// message. `seq` is filled in by the ring at append time.
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq: 0,
            timestamp: Utc::now(),
            level,
            source,
            device_id: None,
            process: None,
            pid: None,
            subsystem: None,
            category: None,
            message: normalize_newlines(&message.into()),
            raw: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Collapse `\r\n` and bare `\r` to `\n`.
pub fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

// -- Flows --------------------------------------------------------------------

/// How a flow body is encoded on the wire of our own API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Pending,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_size: u64,
    #[serde(default)]
    pub body_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_full_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_size: u64,
    #[serde(default)]
    pub body_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_full_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

/// Per-phase timing in milliseconds. A phase the interceptor did not measure
/// is `None`, not zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowTiming {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

/// One captured request/response pair.
///
/// Invariant: when `status != Pending`, exactly one of `response`/`error` is
/// populated. The `id` is shared with the summary [`LogEntry`] synthesized
/// into the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: FlowStatus,
    pub request: FlowRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<FlowResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<FlowTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<FlowTls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl FlowRecord {
    /// One-line digest used for the synthesized ring-buffer entry.
    pub fn summary_line(&self) -> String {
        let req = &self.request;
        match (&self.response, &self.error) {
            (Some(resp), _) => {
                let ms = self
                    .timing
                    .as_ref()
                    .and_then(|t| t.total)
                    .map(|t| format!(" ({t:.0} ms)"))
                    .unwrap_or_default();
                format!("{} {} \u{2192} {}{}", req.method, req.url, resp.status_code, ms)
            }
            (None, Some(err)) => format!("{} {} \u{2192} error: {}", req.method, req.url, err),
            (None, None) => format!("{} {} \u{2192} pending", req.method, req.url),
        }
    }

    /// Whether the flow ended in a transport error (no HTTP response).
    pub fn is_connection_error(&self) -> bool {
        self.response.is_none() && self.error.is_some()
    }
}

// -- Devices ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Simulator,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Booted,
    Shutdown,
    Booting,
}

/// A device as enumerated from the management tools, before pool bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub udid: String,
    pub name: String,
    pub os_version: String,
    pub device_type: DeviceType,
    pub state: DeviceState,
    pub is_available: bool,
}

/// Extract the numeric version component from a raw OS string:
/// `"iOS 18.2"` → `"18.2"`, `"18.0"` → `"18.0"`.
pub fn numeric_os_version(raw: &str) -> &str {
    raw.split_whitespace()
        .find(|part| part.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .unwrap_or(raw)
}

/// OS version criteria matching on the numeric component. A bare major
/// version is a prefix (`"18"` matches `"iOS 18.0"` and `"iOS 18.2"`); a
/// more specific request must match exactly (`"18.2"` matches `"iOS 18.2"`
/// only).
pub fn os_version_matches(wanted: &str, actual_raw: &str) -> bool {
    let actual = numeric_os_version(actual_raw);
    let wanted_parts: Vec<&str> = wanted.split('.').collect();
    let actual_parts: Vec<&str> = actual.split('.').collect();
    if wanted_parts.len() > actual_parts.len() {
        return false;
    }
    if wanted_parts.iter().zip(&actual_parts).any(|(w, a)| w != a) {
        return false;
    }
    wanted_parts.len() == 1 || wanted_parts.len() == actual_parts.len()
}

// -- UI -----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UiFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl UiFrame {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// One node of an accessibility tree. `children` is empty for flat output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub frame: UiFrame,
    pub enabled: bool,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiElement>,
}

impl UiElement {
    /// Switch-like controls get their tap point offset toward the knob.
    pub fn is_switch_like(&self) -> bool {
        matches!(self.element_type.as_str(), "CheckBox" | "Switch")
            || self.role_description.as_deref() == Some("switch")
    }
}

// -- Crashes ------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashFrame {
    pub index: u32,
    pub image: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// A parsed crash report from an `.ips` or legacy `.crash` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashReport {
    pub process: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_codes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faulting_thread: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<CrashFrame>,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

// -- Builds -------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub class: String,
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Everything extracted from one build log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildDiagnostics {
    pub errors: Vec<BuildIssue>,
    pub warnings: Vec<BuildIssue>,
    pub tests: Vec<TestResult>,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
