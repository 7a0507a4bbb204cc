// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certificate verification for simulators.
//!
//! Rather than probing behavior, each simulator's trust-store database is
//! inspected directly: the CA certificate's DER bytes appearing in the
//! store is ground truth for "installed".

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use base64::Engine;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::Device;

/// Per-device certificate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    Installed,
    NotInstalled,
    NeverBooted,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCertStatus {
    pub udid: String,
    pub name: String,
    pub status: CertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertVerification {
    pub devices: Vec<DeviceCertStatus>,
    /// Devices where a previously installed certificate is now missing —
    /// the signature of a device erase.
    pub erased_devices: Vec<String>,
}

/// Extract DER bytes from a PEM certificate.
pub fn pem_to_der(pem: &str) -> Option<Vec<u8>> {
    let begin = pem.find("-----BEGIN CERTIFICATE-----")?;
    let end = pem.find("-----END CERTIFICATE-----")?;
    let body: String = pem[begin..end]
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    base64::engine::general_purpose::STANDARD.decode(body.trim()).ok()
}

/// Naive subsequence search; trust stores are small.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Tracks cert presence over time so erases can be detected.
#[derive(Default)]
pub struct CertTracker {
    previously_installed: Mutex<HashSet<String>>,
}

impl CertTracker {
    /// Default location of the interception CA certificate.
    pub fn default_ca_path() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".mitmproxy").join("mitmproxy-ca-cert.pem")
    }

    /// Default simulator device-data root.
    pub fn default_devices_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join("Library")
            .join("Developer")
            .join("CoreSimulator")
            .join("Devices")
    }

    fn trust_store_path(devices_root: &Path, udid: &str) -> PathBuf {
        devices_root
            .join(udid)
            .join("data")
            .join("Library")
            .join("Keychains")
            .join("TrustStore.sqlite3")
    }

    fn check_one(devices_root: &Path, udid: &str, ca_der: &[u8]) -> (CertStatus, Option<String>) {
        let data_dir = devices_root.join(udid).join("data");
        if !data_dir.exists() {
            return (CertStatus::NeverBooted, None);
        }
        let store = Self::trust_store_path(devices_root, udid);
        if !store.exists() {
            return (CertStatus::NotInstalled, None);
        }
        match std::fs::read(&store) {
            Ok(bytes) => {
                if contains_bytes(&bytes, ca_der) {
                    (CertStatus::Installed, None)
                } else {
                    (CertStatus::NotInstalled, None)
                }
            }
            Err(err) => (CertStatus::Error, Some(err.to_string())),
        }
    }

    /// Verify the CA against every supplied simulator's trust store.
    pub fn verify(
        &self,
        devices: &[Device],
        ca_path: &Path,
        devices_root: &Path,
    ) -> Result<CertVerification> {
        let pem = std::fs::read_to_string(ca_path).map_err(|e| {
            QuernError::tool(
                ErrorKind::ToolMissing,
                Tool::Mitm,
                format!("CA certificate not found at {}: {e}", ca_path.display()),
            )
        })?;
        let ca_der = pem_to_der(&pem).ok_or_else(|| {
            QuernError::tool(ErrorKind::Internal, Tool::Mitm, "CA certificate is not valid PEM")
        })?;

        let mut statuses = Vec::new();
        let mut erased = Vec::new();
        let mut previously = self.previously_installed.lock();
        for device in devices {
            let (status, detail) = Self::check_one(devices_root, &device.udid, &ca_der);
            match status {
                CertStatus::Installed => {
                    previously.insert(device.udid.clone());
                }
                CertStatus::NotInstalled | CertStatus::NeverBooted => {
                    if previously.remove(&device.udid) {
                        erased.push(device.udid.clone());
                    }
                }
                CertStatus::Error => {}
            }
            statuses.push(DeviceCertStatus {
                udid: device.udid.clone(),
                name: device.name.clone(),
                status,
                detail,
            });
        }
        Ok(CertVerification { devices: statuses, erased_devices: erased })
    }
}

#[cfg(test)]
#[path = "cert_tests.rs"]
mod tests;
