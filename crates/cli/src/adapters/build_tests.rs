// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const BUILD_LOG: &str = "\
CompileSwift normal arm64 /Users/dev/MyApp/Sources/Login.swift\n\
/Users/dev/MyApp/Sources/Login.swift:42:17: error: cannot find 'tokenStore' in scope\n\
/Users/dev/MyApp/Sources/Login.swift:42:17: error: cannot find 'tokenStore' in scope\n\
/Users/dev/MyApp/Sources/Profile.swift:10:5: warning: variable 'user' was never used\n\
error: unable to open dependencies file\n\
Test Suite 'LoginTests' started\n\
/Users/dev/MyApp/Tests/LoginTests.swift:30: error: -[MyAppTests.LoginTests testRefreshFails] : XCTAssertEqual failed: (\"401\") is not equal to (\"200\")\n\
Test Case '-[MyAppTests.LoginTests testRefreshFails]' failed (0.042 seconds).\n\
Test Case '-[MyAppTests.LoginTests testLoginHappyPath]' passed (0.120 seconds).\n";

#[test]
fn extracts_errors_with_location() {
    let d = parse_build_log(BUILD_LOG);
    assert_eq!(d.errors.len(), 2);
    assert_eq!(d.errors[0].file.as_deref(), Some("/Users/dev/MyApp/Sources/Login.swift"));
    assert_eq!(d.errors[0].line, Some(42));
    assert_eq!(d.errors[0].column, Some(17));
    assert_eq!(d.errors[0].message, "cannot find 'tokenStore' in scope");
    // The bare linker-style error has no location.
    assert!(d.errors[1].file.is_none());
}

#[test]
fn duplicate_diagnostics_collapse() {
    let d = parse_build_log(BUILD_LOG);
    let scope_errors =
        d.errors.iter().filter(|e| e.message.contains("tokenStore")).count();
    assert_eq!(scope_errors, 1);
}

#[test]
fn extracts_warnings() {
    let d = parse_build_log(BUILD_LOG);
    assert_eq!(d.warnings.len(), 1);
    assert_eq!(d.warnings[0].line, Some(10));
}

#[test]
fn extracts_test_results_with_failure_detail() {
    let d = parse_build_log(BUILD_LOG);
    assert_eq!(d.tests.len(), 2);

    let failed = &d.tests[0];
    assert_eq!(failed.class, "MyAppTests.LoginTests");
    assert_eq!(failed.test, "testRefreshFails");
    assert!(!failed.passed);
    assert_eq!(failed.duration_s, Some(0.042));
    assert!(failed.failure.as_deref().is_some_and(|f| f.contains("XCTAssertEqual")));

    let passed = &d.tests[1];
    assert!(passed.passed);
    assert!(passed.failure.is_none());
}

#[tokio::test]
async fn build_log_records_latest_and_emits_entries() {
    use crate::flows::FlowStore;
    use crate::ring::{LogQuery, LogRing};
    use std::sync::Arc;

    let ring = Arc::new(LogRing::new(64));
    let sink = EntrySink::new(Arc::clone(&ring), Arc::new(FlowStore::new(8)));
    let build = BuildLog::new(sink);

    let d = build.ingest(BUILD_LOG);
    assert_eq!(d.errors.len(), 2);
    assert!(build.latest().is_some());

    let entries = ring.query(&LogQuery::default()).entries;
    assert_eq!(entries.len(), 3); // 2 errors + 1 warning
    assert!(entries.iter().all(|e| e.source == LogSource::Build));
}
