// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn state() -> ServerState {
    ServerState {
        pid: 4242,
        server_port: 9100,
        proxy_port: 9101,
        proxy_enabled: true,
        started_at: Utc::now(),
        api_key: "k".repeat(32),
        active_devices: vec!["SIM-1".to_owned()],
        system_proxy_configured: false,
        system_proxy_interface: None,
        system_proxy_snapshot: None,
    }
}

#[test]
fn write_then_load_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = StateFile::new(dir.path().join("state.json"));
    file.write(&state())?;

    let loaded = file.load().ok_or_else(|| anyhow::anyhow!("state must load"))?;
    assert_eq!(loaded.pid, 4242);
    assert_eq!(loaded.server_port, 9100);
    assert_eq!(loaded.active_devices, ["SIM-1"]);
    Ok(())
}

#[test]
fn state_file_mode_is_0600() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = StateFile::new(dir.path().join("state.json"));
    file.write(&state())?;
    let mode = std::fs::metadata(file.path())?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    Ok(())
}

#[test]
fn missing_and_corrupt_files_load_as_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = StateFile::new(dir.path().join("state.json"));
    assert!(file.load().is_none());

    std::fs::write(file.path(), "{ nope")?;
    assert!(file.load().is_none());
    Ok(())
}

#[test]
fn update_mutates_in_place() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = StateFile::new(dir.path().join("state.json"));
    file.write(&state())?;
    file.update(|s| s.system_proxy_configured = true)?;
    assert!(file.load().is_some_and(|s| s.system_proxy_configured));
    Ok(())
}

#[test]
fn remove_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = StateFile::new(dir.path().join("state.json"));
    file.write(&state())?;
    file.remove();
    file.remove();
    assert!(!file.exists());
    Ok(())
}

#[test]
fn api_key_created_once_with_0600() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("api-key");
    let first = load_or_create_api_key(&path)?;
    let second = load_or_create_api_key(&path)?;
    assert_eq!(first, second);
    assert_eq!(first.len(), 32);
    let mode = std::fs::metadata(&path)?.permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
    Ok(())
}
