// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand per-device logging, started and stopped through the API.
//!
//! Simulators stream the unified log through `simctl spawn`; physical
//! devices stream `idevicesyslog -u`. Either way the entries are bound to
//! the requested device id.

use std::sync::Arc;

use async_trait::async_trait;

use super::{oslog, syslog, AdapterCore, AdapterState, AdapterStatus, EntrySink, SourceAdapter};
use crate::error::{Result, Tool};
use crate::model::{DeviceType, LogSource};
use crate::runner::StreamingChild;

/// Streams logs for one specific device.
pub struct DeviceLogAdapter {
    core: Arc<AdapterCore>,
    udid: String,
    device_type: DeviceType,
}

impl DeviceLogAdapter {
    pub fn new(sink: EntrySink, udid: impl Into<String>, device_type: DeviceType) -> Self {
        let udid = udid.into();
        let (name, source) = match device_type {
            DeviceType::Simulator => (format!("simulator:{udid}"), LogSource::Simulator),
            DeviceType::Device => (format!("device:{udid}"), LogSource::Device),
        };
        Self { core: Arc::new(AdapterCore::new(name, source, sink)), udid, device_type }
    }

    /// Registry key for a given device, shared with the HTTP layer.
    pub fn registry_name(udid: &str, device_type: DeviceType) -> String {
        match device_type {
            DeviceType::Simulator => format!("simulator:{udid}"),
            DeviceType::Device => format!("device:{udid}"),
        }
    }
}

#[async_trait]
impl SourceAdapter for DeviceLogAdapter {
    fn name(&self) -> String {
        self.core.name.clone()
    }

    fn source(&self) -> LogSource {
        self.core.source
    }

    async fn start(&self) -> Result<()> {
        let udid = self.udid.clone();
        let result = match self.device_type {
            DeviceType::Simulator => StreamingChild::spawn(
                "xcrun",
                Tool::Simctl,
                &["simctl", "spawn", &self.udid, "log", "stream", "--style", "ndjson"],
            )
            .map(|child| {
                self.core.spawn_pump(child, move |line| {
                    oslog::parse_ndjson_line(line).map(|e| e.with_device(udid.clone()))
                });
            }),
            DeviceType::Device => {
                StreamingChild::spawn("idevicesyslog", Tool::Log, &["-u", &self.udid, "--no-colors"])
                    .map(|child| {
                        self.core.spawn_pump(child, move |line| {
                            syslog::parse_line(line).map(|mut e| {
                                e.device_id = Some(udid.clone());
                                e
                            })
                        });
                    })
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.core.set_state(AdapterState::Failed, Some(err.message.clone()));
                Err(err)
            }
        }
    }

    async fn stop(&self) {
        self.core.stop().await;
    }

    fn status(&self) -> AdapterStatus {
        self.core.status()
    }
}

#[cfg(test)]
#[path = "device_log_tests.rs"]
mod tests;
