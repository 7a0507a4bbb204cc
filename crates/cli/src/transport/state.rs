// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::adapters::build::BuildLog;
use crate::adapters::crash::CrashSpool;
use crate::adapters::{AdapterRegistry, EntrySink};
use crate::control::DeviceController;
use crate::flows::FlowStore;
use crate::pool::DevicePool;
use crate::proxy::{ProxySubsystem, SystemProxy};
use crate::ring::{LogFilter, LogRing};
use crate::statefile::StateFile;

/// Shared application state passed to all handlers via the axum `State`
/// extractor. One instance per server process.
pub struct Store {
    pub ring: Arc<LogRing>,
    pub flows: Arc<FlowStore>,
    pub sink: EntrySink,
    pub registry: Arc<AdapterRegistry>,
    pub controller: Arc<DeviceController>,
    pub pool: Arc<DevicePool>,
    pub proxy: Arc<ProxySubsystem>,
    pub system_proxy: SystemProxy,
    pub build: Arc<BuildLog>,
    pub crashes: Arc<CrashSpool>,
    pub statefile: StateFile,
    pub config: ServerSettings,
    pub lifecycle: LifecycleState,
    /// Server-side default filter applied when a request passes none.
    pub default_filter: RwLock<LogFilter>,
}

/// Static server settings (immutable after startup).
pub struct ServerSettings {
    pub api_key: String,
    pub server_port: u16,
    pub proxy_port: u16,
    pub started_at: Instant,
    pub home_dir: PathBuf,
}

/// Runtime lifecycle primitives.
pub struct LifecycleState {
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("server_port", &self.config.server_port)
            .field("proxy_port", &self.config.proxy_port)
            .finish()
    }
}
