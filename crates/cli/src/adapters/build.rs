// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build-output parser: extracts compiler errors, warnings, and test results
//! from an `xcodebuild` log (file or streamed text).

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use super::EntrySink;
use crate::error::{QuernError, Result};
use crate::model::{BuildDiagnostics, BuildIssue, LogEntry, LogLevel, LogSource, TestResult};

fn diagnostic_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(
            r"^(?P<file>/[^:]+):(?P<line>\d+):(?P<col>\d+):\s+(?P<kind>error|warning):\s+(?P<msg>.*)$",
        )
        .unwrap()
    })
}

fn bare_diagnostic_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"^(?P<kind>error|warning):\s+(?P<msg>.*)$").unwrap()
    })
}

fn test_case_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(
            r"^Test Case '-\[(?P<class>\S+)\s+(?P<test>[^\]]+)\]'\s+(?P<outcome>passed|failed)\s+\((?P<duration>[\d.]+)\s+seconds\)",
        )
        .unwrap()
    })
}

fn test_failure_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"^(?P<file>/[^:]+):(?P<line>\d+):\s+error:\s+-\[(?P<class>\S+)\s+(?P<test>[^\]]+)\]\s+:\s+(?P<msg>.*)$")
            .unwrap()
    })
}

/// Parse a complete build log into structured diagnostics.
///
/// Duplicate diagnostics (xcodebuild repeats them per-target) are collapsed.
pub fn parse_build_log(content: &str) -> BuildDiagnostics {
    let mut diagnostics = BuildDiagnostics::default();
    let mut pending_failures: Vec<(String, String, String)> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end();

        if let Some(caps) = test_failure_regex().captures(line) {
            pending_failures.push((
                caps.name("class").map_or_else(String::new, |m| m.as_str().to_owned()),
                caps.name("test").map_or_else(String::new, |m| m.as_str().to_owned()),
                caps.name("msg").map_or_else(String::new, |m| m.as_str().to_owned()),
            ));
            continue;
        }

        if let Some(caps) = test_case_regex().captures(line) {
            let class = caps.name("class").map_or("", |m| m.as_str()).to_owned();
            let test = caps.name("test").map_or("", |m| m.as_str()).to_owned();
            let passed = caps.name("outcome").map_or("", |m| m.as_str()) == "passed";
            let failure = if passed {
                None
            } else {
                pending_failures
                    .iter()
                    .rev()
                    .find(|(c, t, _)| *c == class && *t == test)
                    .map(|(_, _, msg)| msg.clone())
            };
            diagnostics.tests.push(TestResult {
                class,
                test,
                duration_s: caps.name("duration").and_then(|m| m.as_str().parse().ok()),
                passed,
                failure,
            });
            continue;
        }

        if let Some(caps) = diagnostic_regex().captures(line) {
            let issue = BuildIssue {
                file: caps.name("file").map(|m| m.as_str().to_owned()),
                line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
                column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
                message: caps.name("msg").map_or_else(String::new, |m| m.as_str().to_owned()),
            };
            push_issue(&mut diagnostics, caps.name("kind").map_or("", |m| m.as_str()), issue);
            continue;
        }

        if let Some(caps) = bare_diagnostic_regex().captures(line) {
            let issue = BuildIssue {
                file: None,
                line: None,
                column: None,
                message: caps.name("msg").map_or_else(String::new, |m| m.as_str().to_owned()),
            };
            push_issue(&mut diagnostics, caps.name("kind").map_or("", |m| m.as_str()), issue);
        }
    }

    diagnostics
}

fn push_issue(diagnostics: &mut BuildDiagnostics, kind: &str, issue: BuildIssue) {
    let bucket =
        if kind == "error" { &mut diagnostics.errors } else { &mut diagnostics.warnings };
    let duplicate = bucket.iter().any(|existing| {
        existing.file == issue.file && existing.line == issue.line && existing.message == issue.message
    });
    if !duplicate {
        bucket.push(issue);
    }
}

/// Holds the most recent build diagnostics and forwards issues to the ring.
pub struct BuildLog {
    sink: EntrySink,
    latest: Mutex<Option<BuildDiagnostics>>,
}

impl BuildLog {
    pub fn new(sink: EntrySink) -> Arc<Self> {
        Arc::new(Self { sink, latest: Mutex::new(None) })
    }

    /// Parse a build-log file, record it as the latest build, and emit each
    /// error/warning as a ring entry.
    pub async fn parse_file(&self, path: &Path) -> Result<BuildDiagnostics> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| QuernError::validation(format!("cannot read {}: {e}", path.display())))?;
        Ok(self.ingest(&content))
    }

    /// Parse streamed build text.
    pub fn ingest(&self, content: &str) -> BuildDiagnostics {
        let diagnostics = parse_build_log(content);
        for issue in &diagnostics.errors {
            self.sink.push(self.issue_entry(LogLevel::Error, issue));
        }
        for issue in &diagnostics.warnings {
            self.sink.push(self.issue_entry(LogLevel::Warning, issue));
        }
        *self.latest.lock() = Some(diagnostics.clone());
        diagnostics
    }

    fn issue_entry(&self, level: LogLevel, issue: &BuildIssue) -> LogEntry {
        let message = match (&issue.file, issue.line) {
            (Some(file), Some(line)) => format!("{file}:{line}: {}", issue.message),
            _ => issue.message.clone(),
        };
        LogEntry::new(level, LogSource::Build, message)
    }

    pub fn latest(&self) -> Option<BuildDiagnostics> {
        self.latest.lock().clone()
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
