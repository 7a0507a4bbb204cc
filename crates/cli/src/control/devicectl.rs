// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical-device backend: `devicectl` for lifecycle and app management.
//! Simulator-only operations (boot, location, permissions) are rejected
//! before reaching this layer.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::{Device, DeviceState, DeviceType};
use crate::runner::{ToolOutput, ToolRunner};

#[derive(Clone)]
pub struct Devicectl {
    runner: Arc<dyn ToolRunner>,
}

impl Devicectl {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    async fn devicectl(&self, parts: &[&str]) -> Result<ToolOutput> {
        let mut argv = vec!["devicectl".to_owned()];
        argv.extend(parts.iter().map(|s| (*s).to_owned()));
        self.runner.run("xcrun", Tool::Devicectl, &argv).await
    }

    /// Enumerate connected physical devices.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let path = std::env::temp_dir().join(format!("quern-devices-{}.json", uuid::Uuid::new_v4()));
        let path_str = path.to_string_lossy().into_owned();
        self.devicectl(&["list", "devices", "--json-output", &path_str]).await?;
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            QuernError::tool(ErrorKind::SubprocessFailed, Tool::Devicectl, format!("read device list: {e}"))
        })?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok(parse_device_list(&raw))
    }

    pub async fn install(&self, udid: &str, app_path: &str) -> Result<()> {
        self.devicectl(&["device", "install", "app", "--device", udid, app_path]).await.map(drop)
    }

    pub async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.devicectl(&["device", "uninstall", "app", "--device", udid, bundle_id])
            .await
            .map(drop)
    }

    pub async fn launch(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.devicectl(&["device", "process", "launch", "--device", udid, bundle_id])
            .await
            .map(drop)
    }

    pub async fn terminate(&self, udid: &str, bundle_id: &str) -> Result<()> {
        // devicectl terminates by pid; the signal subcommand accepts a
        // bundle identifier filter on recent toolchains.
        self.devicectl(&["device", "process", "terminate", "--device", udid, bundle_id])
            .await
            .map(drop)
    }

    pub async fn list_apps(&self, udid: &str) -> Result<Vec<String>> {
        let path = std::env::temp_dir().join(format!("quern-apps-{}.json", uuid::Uuid::new_v4()));
        let path_str = path.to_string_lossy().into_owned();
        self.devicectl(&["device", "info", "apps", "--device", udid, "--json-output", &path_str])
            .await?;
        let raw = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        let _ = tokio::fs::remove_file(&path).await;
        Ok(parse_app_list(&raw))
    }
}

/// Parse `devicectl list devices --json-output`.
pub fn parse_device_list(raw: &str) -> Vec<Device> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else { return Vec::new() };
    let Some(items) = value.pointer("/result/devices").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let udid = item
                .pointer("/hardwareProperties/udid")
                .or_else(|| item.get("identifier"))
                .and_then(|v| v.as_str())?;
            let name = item
                .pointer("/deviceProperties/name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_owned();
            let os = item
                .pointer("/deviceProperties/osVersionNumber")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_owned();
            let connected = item
                .pointer("/connectionProperties/tunnelState")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s != "unavailable");
            Some(Device {
                udid: udid.to_owned(),
                name,
                os_version: format!("iOS {os}").trim().to_owned(),
                device_type: DeviceType::Device,
                // Physical devices are "booted" whenever they are reachable.
                state: if connected { DeviceState::Booted } else { DeviceState::Shutdown },
                is_available: connected,
            })
        })
        .collect()
}

fn parse_app_list(raw: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else { return Vec::new() };
    value
        .pointer("/result/apps")
        .and_then(|v| v.as_array())
        .map(|apps| {
            apps.iter()
                .filter_map(|a| a.get("bundleIdentifier").and_then(|v| v.as_str()))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "devicectl_tests.rs"]
mod tests;
