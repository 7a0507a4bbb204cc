// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide server state file: written by the daemon, read by the
//! CLI and other tools. Exclusive advisory lock for writes, shared for
//! reads; deleted on clean shutdown; readers detect staleness with a
//! health check.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, QuernError, Result};
use crate::proxy::SystemProxySnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    pub pid: u32,
    pub server_port: u16,
    pub proxy_port: u16,
    pub proxy_enabled: bool,
    pub started_at: DateTime<Utc>,
    pub api_key: String,
    #[serde(default)]
    pub active_devices: Vec<String>,
    #[serde(default)]
    pub system_proxy_configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_proxy_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_proxy_snapshot: Option<SystemProxySnapshot>,
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read under a shared lock. Missing or corrupt files read as `None`.
    pub fn load(&self) -> Option<ServerState> {
        let mut file = OpenOptions::new().read(true).open(&self.path).ok()?;
        file.lock_shared().ok()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        let _ = fs2::FileExt::unlock(&file);
        read.ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Write under an exclusive lock, mode 0600. State-file write failures
    /// are always surfaced, never swallowed.
    pub fn write(&self, state: &ServerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QuernError::internal(format!("create {}: {e}", parent.display())))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| QuernError::internal(format!("open state file: {e}")))?;
        file.lock_exclusive()
            .map_err(|e| QuernError::internal(format!("lock state file: {e}")))?;

        let result = (|| -> Result<()> {
            let serialized = serde_json::to_string_pretty(state)
                .map_err(|e| QuernError::internal(e.to_string()))?;
            file.set_len(0).map_err(|e| QuernError::internal(e.to_string()))?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| QuernError::internal(format!("write state file: {e}")))?;
            file.flush().map_err(|e| QuernError::internal(e.to_string()))?;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| QuernError::internal(e.to_string()))?;
            Ok(())
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Update one field through a read-modify-write.
    pub fn update(&self, mutate: impl FnOnce(&mut ServerState)) -> Result<()> {
        let Some(mut state) = self.load() else {
            return Err(QuernError::new(ErrorKind::Internal, "state file missing during update"));
        };
        mutate(&mut state);
        self.write(&state)
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Load the API key, generating one (mode 0600) on first start.
pub fn load_or_create_api_key(path: &Path) -> Result<String> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let key = existing.trim().to_owned();
        if !key.is_empty() {
            return Ok(key);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| QuernError::internal(format!("create {}: {e}", parent.display())))?;
    }
    let key = uuid::Uuid::new_v4().simple().to_string();
    std::fs::write(path, &key).map_err(|e| QuernError::internal(format!("write api key: {e}")))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| QuernError::internal(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
#[path = "statefile_tests.rs"]
mod tests;
