// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests: the real binary, a throwaway home directory,
//! and plain HTTP.

use std::time::Duration;

use quern_specs::QuernProcess;

#[tokio::test]
async fn start_is_idempotent() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;

    // State file exists and health answers.
    assert!(quern.home.path().join("state.json").exists());
    let resp: serde_json::Value =
        reqwest::get(format!("{}/health", quern.base_url())).await?.json().await?;
    assert_eq!(resp["status"], "ok");

    // A second start is a no-op that reports the running instance.
    let output = quern.run(&["start", "--no-proxy", "--port", &quern.port.to_string()])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("already running"), "stdout: {stdout}");
    assert!(stdout.contains(&quern.port.to_string()));
    Ok(())
}

#[tokio::test]
async fn stop_then_status_exit_codes() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;

    let output = quern.run(&["stop"])?;
    assert!(output.status.success());

    // Give the daemon a beat to fully exit, then status reports not-running
    // with exit code 2.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let output = quern.run(&["status"])?;
    assert_eq!(output.status.code(), Some(2));

    // Stopping again is a clean no-op.
    let output = quern.run(&["stop"])?;
    assert!(output.status.success());
    Ok(())
}

#[tokio::test]
async fn state_file_removed_on_clean_stop() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;
    let state_path = quern.home.path().join("state.json");
    assert!(state_path.exists());

    let output = quern.run(&["stop"])?;
    assert!(output.status.success());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!state_path.exists(), "clean shutdown removes the state file");
    Ok(())
}

#[tokio::test]
async fn api_requires_the_generated_key() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/logs/query", quern.base_url());

    let resp = client.get(&url).send().await?;
    assert_eq!(resp.status(), 401);

    let key = quern.api_key()?;
    let resp = client.get(&url).header("x-api-key", &key).send().await?;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await?;
    assert!(body["entries"].is_array());
    Ok(())
}

#[tokio::test]
async fn sources_report_adapter_degradation() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;
    let client = reqwest::Client::new();
    let key = quern.api_key()?;

    let body: serde_json::Value = client
        .get(format!("{}/api/v1/logs/sources", quern.base_url()))
        .header("x-api-key", &key)
        .send()
        .await?
        .json()
        .await?;
    let sources = body["sources"].as_array().cloned().unwrap_or_default();
    assert!(!sources.is_empty(), "baseline adapters are registered");
    // Every adapter reports a definite state; missing tools show up as
    // disabled with a reason, never as server errors.
    for source in sources {
        let state = source["state"].as_str().unwrap_or("");
        assert!(
            ["running", "stopped", "disabled", "failed"].contains(&state),
            "state: {state}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn wait_for_flow_times_out_with_matched_false() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;
    let client = reqwest::Client::new();
    let key = quern.api_key()?;

    let started = std::time::Instant::now();
    let body: serde_json::Value = client
        .get(format!(
            "{}/api/v1/proxy/flows/wait?host=api.example.com&timeout_s=0.5",
            quern.base_url()
        ))
        .header("x-api-key", &key)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["matched"], false);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(started.elapsed() <= Duration::from_millis(1500));
    Ok(())
}

#[tokio::test]
async fn proxy_status_degrades_without_interceptor() -> anyhow::Result<()> {
    let quern = QuernProcess::start().await?;
    let client = reqwest::Client::new();
    let key = quern.api_key()?;

    let body: serde_json::Value = client
        .get(format!("{}/api/v1/proxy/status", quern.base_url()))
        .header("x-api-key", &key)
        .send()
        .await?
        .json()
        .await?;
    // Started with --no-proxy: stopped, and adjacent endpoints still work.
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["held_count"], 0);
    Ok(())
}
