// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System proxy snapshot / configure / restore via `networksetup`.
//!
//! Before reconfiguring host proxy settings, the current configuration for
//! the active interface is snapshotted and persisted in the server state
//! file. Restore is unconditional on stop, shutdown, and crash recovery; a
//! diff against the snapshot is logged first so clobbered external changes
//! are at least visible.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, Tool};
use crate::runner::ToolRunner;

/// One proxy setting (HTTP or HTTPS) as reported by `networksetup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySetting {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Snapshot of the active interface's proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProxySnapshot {
    pub interface: String,
    pub http: ProxySetting,
    pub https: ProxySetting,
}

/// Parse `networksetup -getwebproxy` output:
/// `Enabled: Yes` / `Server: host` / `Port: 8080`.
pub fn parse_proxy_setting(raw: &str) -> ProxySetting {
    let mut setting = ProxySetting::default();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim() {
            "Enabled" => setting.enabled = value.eq_ignore_ascii_case("yes"),
            "Server" => {
                if !value.is_empty() && value != "0" {
                    setting.server = Some(value.to_owned());
                }
            }
            "Port" => setting.port = value.parse().ok().filter(|p| *p != 0),
            _ => {}
        }
    }
    setting
}

/// Pick the active network service from `-listallnetworkservices` output:
/// the first entry that is not disabled (disabled entries lead with `*`).
pub fn pick_active_service(raw: &str) -> Option<String> {
    raw.lines()
        .skip(1) // banner line
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('*'))
        .map(str::to_owned)
        .next()
}

pub struct SystemProxy {
    runner: Arc<dyn ToolRunner>,
}

impl SystemProxy {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    async fn networksetup(&self, args: &[&str]) -> Result<String> {
        let argv: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
        Ok(self.runner.run("networksetup", Tool::Networksetup, &argv).await?.stdout)
    }

    /// Identify the active interface.
    pub async fn active_interface(&self) -> Result<String> {
        let raw = self.networksetup(&["-listallnetworkservices"]).await?;
        pick_active_service(&raw).ok_or_else(|| {
            crate::error::QuernError::tool(
                crate::error::ErrorKind::Degraded,
                Tool::Networksetup,
                "no active network service found",
            )
        })
    }

    /// Snapshot the current configuration for `interface`.
    pub async fn snapshot(&self, interface: &str) -> Result<SystemProxySnapshot> {
        let http = parse_proxy_setting(&self.networksetup(&["-getwebproxy", interface]).await?);
        let https =
            parse_proxy_setting(&self.networksetup(&["-getsecurewebproxy", interface]).await?);
        Ok(SystemProxySnapshot { interface: interface.to_owned(), http, https })
    }

    /// Point both web proxies at the interceptor.
    pub async fn configure(&self, interface: &str, host: &str, port: u16) -> Result<()> {
        let port_str = port.to_string();
        self.networksetup(&["-setwebproxy", interface, host, &port_str]).await?;
        self.networksetup(&["-setsecurewebproxy", interface, host, &port_str]).await?;
        Ok(())
    }

    /// Restore a snapshot unconditionally, logging any live settings the
    /// restore will clobber.
    pub async fn restore(&self, snapshot: &SystemProxySnapshot) -> Result<()> {
        if let Ok(current) = self.snapshot(&snapshot.interface).await {
            for field in diff_fields(&current, snapshot) {
                tracing::warn!(
                    interface = %snapshot.interface,
                    field,
                    "system proxy changed since snapshot; restore overwrites it"
                );
            }
        }

        self.restore_one(&snapshot.interface, "-setwebproxy", "-setwebproxystate", &snapshot.http)
            .await?;
        self.restore_one(
            &snapshot.interface,
            "-setsecurewebproxy",
            "-setsecurewebproxystate",
            &snapshot.https,
        )
        .await?;
        Ok(())
    }

    async fn restore_one(
        &self,
        interface: &str,
        set_cmd: &str,
        state_cmd: &str,
        setting: &ProxySetting,
    ) -> Result<()> {
        if setting.enabled {
            let server = setting.server.as_deref().unwrap_or("");
            let port = setting.port.unwrap_or(0).to_string();
            self.networksetup(&[set_cmd, interface, server, &port]).await?;
            self.networksetup(&[state_cmd, interface, "on"]).await?;
        } else {
            self.networksetup(&[state_cmd, interface, "off"]).await?;
        }
        Ok(())
    }
}

/// Names of fields that differ between live settings and the snapshot.
pub fn diff_fields(current: &SystemProxySnapshot, snapshot: &SystemProxySnapshot) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if current.http != snapshot.http {
        fields.push("http");
    }
    if current.https != snapshot.https {
        fields.push("https");
    }
    fields
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
