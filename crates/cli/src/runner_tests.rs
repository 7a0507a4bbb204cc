// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::error::ErrorKind;

#[tokio::test]
async fn run_ok_captures_stdout() -> anyhow::Result<()> {
    let out = run_ok("echo", Tool::Log, &["hello"], DEFAULT_TIMEOUT).await?;
    assert_eq!(out.stdout.trim(), "hello");
    assert!(out.success());
    Ok(())
}

#[tokio::test]
async fn missing_tool_is_tool_missing() {
    let err = match run_ok("quern-no-such-tool-xyz", Tool::Simctl, &[], DEFAULT_TIMEOUT).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "spawn should have failed"),
    };
    assert_eq!(err.kind, ErrorKind::ToolMissing);
    assert_eq!(err.tool, Some(Tool::Simctl));
}

#[tokio::test]
async fn nonzero_exit_carries_code_and_stderr() {
    let err = match run_ok("sh", Tool::Log, &["-c", "echo boom >&2; exit 3"], DEFAULT_TIMEOUT).await
    {
        Err(e) => e,
        Ok(_) => return assert!(false, "exit 3 should be an error"),
    };
    assert_eq!(err.kind, ErrorKind::SubprocessFailed);
    assert!(err.message.contains("3"), "message: {}", err.message);
    assert!(err.message.contains("boom"), "message: {}", err.message);
}

#[tokio::test]
async fn run_raw_tolerates_nonzero_exit() -> anyhow::Result<()> {
    let out = run_raw("sh", Tool::Log, &["-c", "exit 7"], DEFAULT_TIMEOUT).await?;
    assert_eq!(out.code, Some(7));
    assert!(!out.success());
    Ok(())
}

#[tokio::test]
async fn timeout_kills_child() {
    let started = std::time::Instant::now();
    let err = match run_ok("sleep", Tool::Log, &["5"], Duration::from_millis(150)).await {
        Err(e) => e,
        Ok(_) => return assert!(false, "sleep should have timed out"),
    };
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn stderr_prefix_respects_char_boundaries() {
    let out = ToolOutput { stdout: String::new(), stderr: "é".repeat(600), code: Some(1) };
    let prefix = out.stderr_prefix();
    assert!(prefix.len() <= 500);
    assert!(prefix.chars().all(|c| c == 'é'));

    let short = ToolOutput { stdout: String::new(), stderr: "abc\n".to_owned(), code: Some(1) };
    assert_eq!(short.stderr_prefix(), "abc");
}

#[tokio::test]
async fn streaming_child_roundtrip_and_terminate() -> anyhow::Result<()> {
    let mut child = StreamingChild::spawn("cat", Tool::Mitm, &[])?;
    child.write_line("ping").await?;
    let echoed = child.lines.recv().await;
    assert_eq!(echoed.as_deref(), Some("ping"));

    child.terminate(Duration::from_secs(2)).await;
    assert!(child.exit_code().is_some());
    Ok(())
}

#[tokio::test]
async fn streaming_child_reports_exit() -> anyhow::Result<()> {
    let child = StreamingChild::spawn("sh", Tool::Mitm, &["-c", "exit 0"])?;
    let mut rx = child.exit_watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow().is_none() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await?;
    assert_eq!(*rx.borrow(), Some(0));
    Ok(())
}
