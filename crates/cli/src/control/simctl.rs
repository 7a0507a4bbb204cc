// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulator backend: every operation shells out to `xcrun simctl`.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::error::{QuernError, Result, Tool};
use crate::model::{Device, DeviceState, DeviceType};
use crate::runner::{ToolOutput, ToolRunner};

/// Thin wrapper holding the shared runner.
#[derive(Clone)]
pub struct Simctl {
    runner: Arc<dyn ToolRunner>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

impl Simctl {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    async fn simctl(&self, parts: &[&str]) -> Result<ToolOutput> {
        let mut argv = vec!["simctl".to_owned()];
        argv.extend(args(parts));
        self.runner.run("xcrun", Tool::Simctl, &argv).await
    }

    /// Enumerate simulators from `simctl list devices -j`.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let output = self.simctl(&["list", "devices", "-j"]).await?;
        parse_device_list(&output.stdout)
            .ok_or_else(|| QuernError::tool(crate::error::ErrorKind::SubprocessFailed, Tool::Simctl, "unparseable simctl device list"))
    }

    pub async fn boot(&self, udid: &str) -> Result<()> {
        self.simctl(&["boot", udid]).await.map(drop)
    }

    pub async fn shutdown(&self, udid: &str) -> Result<()> {
        self.simctl(&["shutdown", udid]).await.map(drop)
    }

    pub async fn install(&self, udid: &str, app_path: &str) -> Result<()> {
        self.simctl(&["install", udid, app_path]).await.map(drop)
    }

    pub async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.simctl(&["uninstall", udid, bundle_id]).await.map(drop)
    }

    pub async fn launch(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.simctl(&["launch", udid, bundle_id]).await.map(drop)
    }

    pub async fn terminate(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.simctl(&["terminate", udid, bundle_id]).await.map(drop)
    }

    /// Installed app bundle ids, parsed from `simctl listapps` plist output.
    pub async fn list_apps(&self, udid: &str) -> Result<Vec<String>> {
        let output = self.simctl(&["listapps", udid]).await?;
        Ok(parse_bundle_ids(&output.stdout))
    }

    /// Screenshot to a temp file, returning the image bytes.
    pub async fn screenshot(&self, udid: &str, image_format: Option<&str>) -> Result<Vec<u8>> {
        let ext = image_format.unwrap_or("png");
        let path = std::env::temp_dir().join(format!("quern-shot-{}.{ext}", uuid::Uuid::new_v4()));
        let path_str = path.to_string_lossy().into_owned();
        let mut args = vec!["io", udid, "screenshot"];
        if let Some(image_format) = image_format {
            args.push("--type");
            args.push(image_format);
        }
        args.push(&path_str);
        self.simctl(&args).await?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            QuernError::tool(crate::error::ErrorKind::SubprocessFailed, Tool::Simctl, format!("read screenshot: {e}"))
        })?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok(bytes)
    }

    pub async fn set_location(&self, udid: &str, lat: f64, lon: f64) -> Result<()> {
        let coords = format!("{lat},{lon}");
        self.simctl(&["location", udid, "set", &coords]).await.map(drop)
    }

    pub async fn grant_permission(&self, udid: &str, bundle_id: &str, permission: &str) -> Result<()> {
        self.simctl(&["privacy", udid, "grant", permission, bundle_id]).await.map(drop)
    }

    pub async fn add_root_cert(&self, udid: &str, cert_path: &str) -> Result<()> {
        self.simctl(&["keychain", udid, "add-root-cert", cert_path]).await.map(drop)
    }

    /// Path to a simulator's data directory (for trust-store inspection).
    pub async fn data_dir(&self, udid: &str) -> Result<String> {
        let output = self.simctl(&["getenv", udid, "HOME"]).await?;
        Ok(output.stdout.trim().to_owned())
    }
}

/// Runtime keys look like `com.apple.CoreSimulator.SimRuntime.iOS-18-2`.
fn runtime_to_os(runtime: &str) -> String {
    let tail = runtime.rsplit('.').next().unwrap_or(runtime);
    let mut parts = tail.split('-');
    let platform = parts.next().unwrap_or("iOS");
    let version: Vec<&str> = parts.collect();
    if version.is_empty() {
        platform.to_owned()
    } else {
        format!("{platform} {}", version.join("."))
    }
}

fn parse_state(raw: &str) -> DeviceState {
    match raw {
        "Booted" => DeviceState::Booted,
        "Booting" => DeviceState::Booting,
        _ => DeviceState::Shutdown,
    }
}

/// Parse `simctl list devices -j`.
pub fn parse_device_list(raw: &str) -> Option<Vec<Device>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let runtimes = value.get("devices")?.as_object()?;
    let mut devices = Vec::new();
    for (runtime, list) in runtimes {
        let os_version = runtime_to_os(runtime);
        let Some(list) = list.as_array() else { continue };
        for item in list {
            let Some(udid) = item.get("udid").and_then(|v| v.as_str()) else { continue };
            devices.push(Device {
                udid: udid.to_owned(),
                name: item.get("name").and_then(|v| v.as_str()).unwrap_or("").to_owned(),
                os_version: os_version.clone(),
                device_type: DeviceType::Simulator,
                state: parse_state(item.get("state").and_then(|v| v.as_str()).unwrap_or("")),
                is_available: item.get("isAvailable").and_then(|v| v.as_bool()).unwrap_or(false),
            });
        }
    }
    Some(devices)
}

/// Pull bundle identifiers out of `simctl listapps` plist-style output.
pub fn parse_bundle_ids(raw: &str) -> Vec<String> {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    let re = RE.get_or_init(|| {
        Regex::new(r#"CFBundleIdentifier\s*=\s*"([^"]+)""#).unwrap()
    });
    let mut ids: Vec<String> = re
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_owned()))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
#[path = "simctl_tests.rs"]
mod tests;
