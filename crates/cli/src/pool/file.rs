// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared pool file: JSON on disk, guarded by advisory locks so multiple
//! server and CLI processes can cooperate. Writers take an exclusive lock
//! and follow a snapshot-modify-write ritual; readers take a shared lock for
//! the duration of one parse.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::{DeviceState, DeviceType};

/// Schema version for forward-compatible evolution.
pub const POOL_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Available,
    Claimed,
}

/// One device as tracked by the pool.
///
/// Invariants: `claimed_by` and `claimed_at` are non-null iff
/// `claim_status == Claimed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub udid: String,
    pub name: String,
    pub os_version: String,
    pub device_type: DeviceType,
    pub state: DeviceState,
    pub is_available: bool,
    pub claim_status: ClaimStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl PoolEntry {
    pub fn is_claimed(&self) -> bool {
        self.claim_status == ClaimStatus::Claimed
    }

    pub fn claim(&mut self, session_id: &str) {
        self.claim_status = ClaimStatus::Claimed;
        self.claimed_by = Some(session_id.to_owned());
        self.claimed_at = Some(Utc::now());
        self.last_used = Some(Utc::now());
    }

    pub fn release(&mut self) {
        self.claim_status = ClaimStatus::Available;
        self.claimed_by = None;
        self.claimed_at = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolFile {
    pub version: u32,
    pub devices: Vec<PoolEntry>,
}

impl Default for PoolFile {
    fn default() -> Self {
        Self { version: POOL_FILE_VERSION, devices: Vec::new() }
    }
}

impl PoolFile {
    pub fn entry(&self, udid: &str) -> Option<&PoolEntry> {
        self.devices.iter().find(|d| d.udid == udid)
    }

    pub fn entry_mut(&mut self, udid: &str) -> Option<&mut PoolEntry> {
        self.devices.iter_mut().find(|d| d.udid == udid)
    }
}

/// Handle to the on-disk pool file.
#[derive(Debug, Clone)]
pub struct PoolStore {
    path: PathBuf,
}

impl PoolStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QuernError::tool(ErrorKind::Internal, Tool::Pool, format!("create {}: {e}", parent.display()))
            })?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| {
                QuernError::tool(
                    ErrorKind::Internal,
                    Tool::Pool,
                    format!("open {}: {e}", self.path.display()),
                )
            })
    }

    fn parse(content: &str) -> PoolFile {
        if content.trim().is_empty() {
            return PoolFile::default();
        }
        serde_json::from_str(content).unwrap_or_default()
    }

    /// Read under a shared lock.
    pub fn load(&self) -> Result<PoolFile> {
        let mut file = self.open()?;
        file.lock_shared().map_err(|e| lock_error("shared", &e))?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        let _ = fs2::FileExt::unlock(&file);
        read.map_err(|e| QuernError::tool(ErrorKind::Internal, Tool::Pool, e.to_string()))?;
        Ok(Self::parse(&content))
    }

    /// Snapshot-modify-write under an exclusive lock. The closure's return
    /// value is handed back to the caller; any state mutation it performed
    /// is persisted before the lock is dropped.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut PoolFile) -> T) -> Result<T> {
        let mut file = self.open()?;
        file.lock_exclusive().map_err(|e| lock_error("exclusive", &e))?;

        let result = (|| -> Result<T> {
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|e| QuernError::tool(ErrorKind::Internal, Tool::Pool, e.to_string()))?;
            let mut pool = Self::parse(&content);

            let value = mutate(&mut pool);

            let serialized = serde_json::to_string_pretty(&pool)
                .map_err(|e| QuernError::tool(ErrorKind::Internal, Tool::Pool, e.to_string()))?;
            file.set_len(0)
                .and_then(|()| file.rewind())
                .and_then(|()| file.write_all(serialized.as_bytes()))
                .map_err(|e| QuernError::tool(ErrorKind::Internal, Tool::Pool, e.to_string()))?;
            Ok(value)
        })();

        let _ = fs2::FileExt::unlock(&file);
        result
    }
}

fn lock_error(kind: &str, err: &std::io::Error) -> QuernError {
    QuernError::tool(ErrorKind::Internal, Tool::Pool, format!("{kind} lock failed: {err}"))
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
