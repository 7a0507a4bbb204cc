// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_mapping() {
    assert_eq!(ErrorKind::Validation.http_status(), 400);
    assert_eq!(ErrorKind::Unauthenticated.http_status(), 401);
    assert_eq!(ErrorKind::NotFound.http_status(), 404);
    assert_eq!(ErrorKind::Conflict.http_status(), 409);
    assert_eq!(ErrorKind::Timeout.http_status(), 408);
    assert_eq!(ErrorKind::ToolMissing.http_status(), 503);
    assert_eq!(ErrorKind::SubprocessFailed.http_status(), 500);
}

#[test]
fn envelope_carries_tool_tag() {
    let err = QuernError::tool(ErrorKind::SubprocessFailed, Tool::Simctl, "boot failed");
    let body = err.to_error_body();
    assert_eq!(body.code, "SUBPROCESS_FAILED");
    assert_eq!(body.tool.as_deref(), Some("simctl"));
    assert_eq!(body.message, "boot failed");
}

#[test]
fn envelope_omits_absent_tool() -> anyhow::Result<()> {
    let err = QuernError::not_found("no such flow");
    let json = serde_json::to_value(ErrorResponse { error: err.to_error_body() })?;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(json["error"].get("tool").is_none());
    Ok(())
}

#[test]
fn display_includes_tool() {
    let err = QuernError::tool_missing(Tool::Mitm, "install mitmproxy");
    assert_eq!(err.to_string(), "TOOL_MISSING: [mitm] install mitmproxy");
}
