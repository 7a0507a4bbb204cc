// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str =
    "Feb  7 14:23:01 iPhone MyApp(CoreFoundation)[1234] <Error>: Failed to fetch";

#[test]
fn parses_documented_format() {
    let entry = match parse_line(SAMPLE) {
        Some(e) => e,
        None => return assert!(false, "sample line must parse"),
    };
    assert_eq!(entry.device_id.as_deref(), Some("iPhone"));
    assert_eq!(entry.process.as_deref(), Some("MyApp"));
    assert_eq!(entry.subsystem.as_deref(), Some("CoreFoundation"));
    assert_eq!(entry.pid, Some(1234));
    assert_eq!(entry.level, LogLevel::Error);
    assert_eq!(entry.message, "Failed to fetch");
    assert_eq!(entry.source, LogSource::Syslog);
    assert!(entry.raw.is_none());
}

#[test]
fn parses_line_without_subsystem() {
    let entry = match parse_line("Feb  7 09:01:02 iPhone backboardd[77] <Notice>: hello") {
        Some(e) => e,
        None => return assert!(false, "line must parse"),
    };
    assert_eq!(entry.process.as_deref(), Some("backboardd"));
    assert!(entry.subsystem.is_none());
    assert_eq!(entry.level, LogLevel::Notice);
}

#[yare::parameterized(
    emergency = { "Emergency", LogLevel::Error },
    alert = { "Alert", LogLevel::Error },
    critical = { "Critical", LogLevel::Error },
    error = { "Error", LogLevel::Error },
    warning = { "Warning", LogLevel::Warning },
    notice = { "Notice", LogLevel::Notice },
    info = { "Info", LogLevel::Info },
    debug = { "Debug", LogLevel::Debug },
    unknown = { "Frobnicate", LogLevel::Info },
)]
fn level_mapping(name: &str, expected: LogLevel) {
    assert_eq!(map_syslog_level(name), expected);
}

#[test]
fn malformed_line_becomes_info_with_raw() {
    let line = "=== garbled output that matches nothing ===";
    let entry = match parse_line(line) {
        Some(e) => e,
        None => return assert!(false, "malformed line still yields an entry"),
    };
    assert_eq!(entry.level, LogLevel::Info);
    assert_eq!(entry.message, line);
    assert_eq!(entry.raw.as_deref(), Some(line));
}

#[test]
fn blank_lines_are_dropped() {
    assert!(parse_line("").is_none());
    assert!(parse_line("   ").is_none());
}

#[test]
fn timestamp_is_utc_normalized() {
    let entry = match parse_line(SAMPLE) {
        Some(e) => e,
        None => return assert!(false, "sample line must parse"),
    };
    // Round-trip through RFC 3339 keeps the Z/UTC form.
    let iso = entry.timestamp.to_rfc3339();
    assert!(iso.contains('T'));
}
