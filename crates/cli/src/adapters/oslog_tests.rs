// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = r#"{"timestamp":"2026-02-07 14:23:01.123456-0800","eventMessage":"Token refresh failed","messageType":"Error","subsystem":"com.example.app","category":"network","processImagePath":"/Applications/MyApp.app/MyApp","processID":512}"#;

#[test]
fn maps_fields_directly() {
    let entry = match parse_ndjson_line(SAMPLE) {
        Some(e) => e,
        None => return assert!(false, "sample event must parse"),
    };
    assert_eq!(entry.level, LogLevel::Error);
    assert_eq!(entry.source, LogSource::Oslog);
    assert_eq!(entry.subsystem.as_deref(), Some("com.example.app"));
    assert_eq!(entry.category.as_deref(), Some("network"));
    assert_eq!(entry.process.as_deref(), Some("MyApp"));
    assert_eq!(entry.pid, Some(512));
    assert_eq!(entry.message, "Token refresh failed");
}

#[test]
fn timestamp_converts_to_utc() {
    let entry = match parse_ndjson_line(SAMPLE) {
        Some(e) => e,
        None => return assert!(false, "sample event must parse"),
    };
    // 14:23:01 at -0800 is 22:23:01 UTC.
    assert_eq!(entry.timestamp.to_rfc3339(), "2026-02-07T22:23:01.123456+00:00");
}

#[yare::parameterized(
    default = { "Default", LogLevel::Notice },
    info = { "Info", LogLevel::Info },
    debug = { "Debug", LogLevel::Debug },
    error = { "Error", LogLevel::Error },
    fault = { "Fault", LogLevel::Fault },
)]
fn message_type_mapping(message_type: &str, expected: LogLevel) {
    assert_eq!(map_message_type(Some(message_type)), expected);
}

#[test]
fn non_json_framing_lines_are_dropped() {
    assert!(parse_ndjson_line("Filtering the log data using ...").is_none());
    assert!(parse_ndjson_line("").is_none());
}

#[test]
fn events_without_message_are_dropped() {
    assert!(parse_ndjson_line(r#"{"timestamp":"x","messageType":"Info"}"#).is_none());
}
