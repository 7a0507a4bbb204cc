// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device pool: file-locked claim state shared across processes, plus the
//! resolution protocol (claim / auto-boot / wait-if-busy).
//!
//! The pool holds a deliberately narrow view of the controller — just
//! enumeration and boot — so the two do not form a reference cycle; wiring
//! happens at lifecycle start.

pub mod file;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::{os_version_matches, Device, DeviceState, DeviceType};

pub use file::{ClaimStatus, PoolEntry, PoolFile, PoolStore};

/// Claims older than this are released on the next pool access.
pub const STALE_CLAIM: Duration = Duration::from_secs(30 * 60);

/// Device enumeration is refreshed from the management tool at most this
/// often; external state changes become visible within the window.
pub const REFRESH_TTL: Duration = Duration::from_secs(2);

/// Auto-boot: poll cadence and overall deadline.
pub const BOOT_POLL: Duration = Duration::from_millis(500);
pub const BOOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait-for-available poll cadence.
pub const WAIT_POLL: Duration = Duration::from_secs(1);

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The narrow device interface the pool depends on.
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>>;
    async fn boot(&self, udid: &str) -> Result<()>;
}

/// Criteria + behavior knobs for `resolve`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub auto_boot: bool,
    #[serde(default)]
    pub wait_if_busy: bool,
    #[serde(default)]
    pub wait_timeout_s: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ResolveRequest {
    fn criteria_match(&self, entry: &PoolEntry) -> bool {
        if !entry.is_available {
            return false;
        }
        if let Some(ref name) = self.name {
            if !entry.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref os) = self.os_version {
            if !os_version_matches(os, &entry.os_version) {
                return false;
            }
        }
        if let Some(ty) = self.device_type {
            if entry.device_type != ty {
                return false;
            }
        }
        self.tags.iter().all(|t| entry.tags.contains(t))
    }

    fn wait_timeout(&self) -> Duration {
        self.wait_timeout_s.map_or(DEFAULT_WAIT_TIMEOUT, Duration::from_secs_f64)
    }
}

/// What a single locked selection pass produced.
enum Selection {
    /// A device was selected (and claimed, when a session was supplied).
    Ready { udid: String, needs_boot: bool },
    /// Matching devices exist but are all claimed (or need a boot we may not
    /// perform yet); worth waiting for when `wait_if_busy`.
    Busy { detail: String },
    /// Nothing matches; `kind` picks the HTTP status.
    NoMatch { kind: ErrorKind, detail: String },
}

struct RefreshCache {
    at: Option<Instant>,
    devices: Vec<Device>,
}

/// The pool itself. One per server process; state lives in the pool file.
pub struct DevicePool {
    store: PoolStore,
    inventory: Arc<dyn DeviceInventory>,
    cache: Mutex<RefreshCache>,
}

impl DevicePool {
    pub fn new(store: PoolStore, inventory: Arc<dyn DeviceInventory>) -> Self {
        Self { store, inventory, cache: Mutex::new(RefreshCache { at: None, devices: Vec::new() }) }
    }

    /// Refresh enumeration from the management tool, rate-limited to
    /// [`REFRESH_TTL`], then merge into the pool file (claims preserved).
    pub async fn refresh(&self) -> Result<()> {
        let stale = {
            let cache = self.cache.lock();
            cache.at.is_none_or(|at| at.elapsed() >= REFRESH_TTL)
        };
        if stale {
            let devices = self.inventory.list_devices().await?;
            {
                let mut cache = self.cache.lock();
                cache.at = Some(Instant::now());
                cache.devices = devices.clone();
            }
            self.store.update(|pool| merge_devices(pool, &devices))?;
        }
        Ok(())
    }

    /// Force the next refresh to hit the management tool.
    pub fn invalidate_cache(&self) {
        self.cache.lock().at = None;
    }

    /// Current pool entries (after opportunistic stale-claim cleanup).
    pub async fn entries(&self) -> Result<Vec<PoolEntry>> {
        self.refresh().await?;
        self.store.update(|pool| {
            cleanup_stale(pool);
            pool.devices.clone()
        })
    }

    /// Release claims older than [`STALE_CLAIM`]. Returns how many were
    /// released.
    pub fn cleanup(&self) -> Result<usize> {
        self.store.update(cleanup_stale)
    }

    /// Claim a specific device for a session. `Conflict` if another session
    /// holds it.
    pub async fn claim(&self, udid: &str, session_id: &str) -> Result<PoolEntry> {
        self.refresh().await?;
        self.store.update(|pool| {
            cleanup_stale(pool);
            let entry = pool
                .entry_mut(udid)
                .ok_or_else(|| QuernError::not_found(format!("unknown device {udid}")))?;
            match entry.claimed_by.as_deref() {
                Some(owner) if owner != session_id => Err(QuernError::tool(
                    ErrorKind::Conflict,
                    Tool::Pool,
                    format!("device {udid} is claimed by {owner}"),
                )),
                _ => {
                    entry.claim(session_id);
                    Ok(entry.clone())
                }
            }
        })?
    }

    /// Release a device. With a session id, only that session's claim is
    /// released; without one, the claim is dropped unconditionally.
    pub fn release(&self, udid: &str, session_id: Option<&str>) -> Result<bool> {
        self.store.update(|pool| {
            let Some(entry) = pool.entry_mut(udid) else {
                return Err(QuernError::not_found(format!("unknown device {udid}")));
            };
            if let Some(session) = session_id {
                if entry.claimed_by.as_deref() != Some(session) {
                    return Ok(false);
                }
            }
            let was_claimed = entry.is_claimed();
            entry.release();
            Ok(was_claimed)
        })?
    }

    /// Release every claim held by a session (used at session teardown).
    pub fn release_session(&self, session_id: &str) -> Result<usize> {
        self.store.update(|pool| {
            let mut released = 0;
            for entry in &mut pool.devices {
                if entry.claimed_by.as_deref() == Some(session_id) {
                    entry.release();
                    released += 1;
                }
            }
            released
        })
    }

    /// Resolve a single device per the documented preference order,
    /// optionally claiming it. Selection and claim happen under one lock
    /// acquisition so concurrent resolvers never double-claim.
    pub async fn resolve(&self, req: &ResolveRequest) -> Result<String> {
        let deadline = Instant::now() + req.wait_timeout();
        loop {
            self.refresh().await?;
            let selection = self.store.update(|pool| {
                cleanup_stale(pool);
                select(pool, req)
            })?;

            match selection {
                Selection::Ready { udid, needs_boot } => {
                    if needs_boot {
                        if let Err(err) = self.boot_and_wait(&udid).await {
                            // Roll back the claim we took under the lock.
                            if req.session_id.is_some() {
                                let _ = self.release(&udid, req.session_id.as_deref());
                            }
                            return Err(err);
                        }
                    }
                    self.store.update(|pool| {
                        if let Some(entry) = pool.entry_mut(&udid) {
                            entry.last_used = Some(Utc::now());
                        }
                    })?;
                    return Ok(udid);
                }
                Selection::Busy { detail } => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !req.wait_if_busy || remaining.is_zero() {
                        let kind =
                            if req.wait_if_busy { ErrorKind::Timeout } else { ErrorKind::Conflict };
                        return Err(QuernError::tool(kind, Tool::Pool, detail));
                    }
                    // Short timeouts are respected: never oversleep.
                    tokio::time::sleep(WAIT_POLL.min(remaining)).await;
                    self.invalidate_cache();
                }
                Selection::NoMatch { kind, detail } => {
                    return Err(QuernError::tool(kind, Tool::Pool, detail));
                }
            }
        }
    }

    /// Return `count` ready devices, booting shutdown ones to fill the gap.
    /// With a session id the whole set is claimed; partial failure releases
    /// everything already claimed.
    pub async fn ensure(&self, count: usize, req: &ResolveRequest) -> Result<Vec<String>> {
        self.refresh().await?;
        let (selected, to_boot) = self.store.update(|pool| {
            cleanup_stale(pool);
            select_many(pool, count, req)
        })??;

        for udid in &to_boot {
            if let Err(err) = self.boot_and_wait(udid).await {
                if let Some(ref session) = req.session_id {
                    let _ = self.release_session(session);
                }
                return Err(err);
            }
        }
        Ok(selected)
    }

    async fn boot_and_wait(&self, udid: &str) -> Result<()> {
        self.inventory.boot(udid).await?;
        let deadline = Instant::now() + BOOT_TIMEOUT;
        loop {
            let devices = self.inventory.list_devices().await?;
            if devices.iter().any(|d| d.udid == udid && d.state == DeviceState::Booted) {
                self.invalidate_cache();
                self.store.update(|pool| {
                    if let Some(entry) = pool.entry_mut(udid) {
                        entry.state = DeviceState::Booted;
                    }
                })?;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(QuernError::tool(
                    ErrorKind::Timeout,
                    Tool::Pool,
                    format!("device {udid} did not reach booted within {}s", BOOT_TIMEOUT.as_secs()),
                ));
            }
            tokio::time::sleep(BOOT_POLL).await;
        }
    }
}

/// Merge fresh enumeration into the pool, preserving claim bookkeeping.
/// Devices that disappeared from enumeration become unavailable.
fn merge_devices(pool: &mut PoolFile, devices: &[Device]) {
    for device in devices {
        match pool.entry_mut(&device.udid) {
            Some(entry) => {
                entry.name = device.name.clone();
                entry.os_version = device.os_version.clone();
                entry.device_type = device.device_type;
                entry.state = device.state;
                entry.is_available = device.is_available;
            }
            None => pool.devices.push(PoolEntry {
                udid: device.udid.clone(),
                name: device.name.clone(),
                os_version: device.os_version.clone(),
                device_type: device.device_type,
                state: device.state,
                is_available: device.is_available,
                claim_status: ClaimStatus::Available,
                claimed_by: None,
                claimed_at: None,
                last_used: None,
                tags: Vec::new(),
            }),
        }
    }
    for entry in &mut pool.devices {
        if !devices.iter().any(|d| d.udid == entry.udid) {
            entry.is_available = false;
        }
    }
}

fn cleanup_stale(pool: &mut PoolFile) -> usize {
    let now = Utc::now();
    let mut released = 0;
    for entry in &mut pool.devices {
        if let Some(at) = entry.claimed_at {
            let age = (now - at).to_std().unwrap_or_default();
            if age >= STALE_CLAIM {
                tracing::info!(udid = %entry.udid, claimant = ?entry.claimed_by, "releasing stale claim");
                entry.release();
                released += 1;
            }
        }
    }
    released
}

fn claimed_by_other(entry: &PoolEntry, session: Option<&str>) -> bool {
    match entry.claimed_by.as_deref() {
        Some(owner) => session != Some(owner),
        None => false,
    }
}

/// Rank key: booted first, unclaimed first, most recently used first, then
/// name for stability.
fn rank_key(entry: &PoolEntry) -> (u8, u8, i64, String) {
    (
        u8::from(entry.state != DeviceState::Booted),
        u8::from(entry.is_claimed()),
        -entry.last_used.map_or(0, |t| t.timestamp_millis()),
        entry.name.clone(),
    )
}

fn select(pool: &mut PoolFile, req: &ResolveRequest) -> Selection {
    // 1. Explicit udid wins; claim check only applies when a session asks.
    if let Some(ref udid) = req.udid {
        return match pool.entry_mut(udid) {
            None => Selection::NoMatch {
                kind: ErrorKind::NotFound,
                detail: format!("no device with udid {udid}"),
            },
            Some(entry) => {
                if let Some(ref session) = req.session_id {
                    if entry.is_claimed() && entry.claimed_by.as_deref() != Some(session.as_str()) {
                        let claimant = entry.claimed_by.clone().unwrap_or_default();
                        if req.wait_if_busy {
                            return Selection::Busy {
                                detail: format!("device {udid} is claimed by {claimant}"),
                            };
                        }
                        return Selection::NoMatch {
                            kind: ErrorKind::Conflict,
                            detail: format!("device {udid} is claimed by {claimant}"),
                        };
                    }
                    entry.claim(session);
                }
                let needs_boot = entry.state != DeviceState::Booted && req.auto_boot;
                Selection::Ready { udid: udid.clone(), needs_boot }
            }
        };
    }

    let mut candidates: Vec<usize> = pool
        .devices
        .iter()
        .enumerate()
        .filter(|(_, e)| req.criteria_match(e))
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by_key(|&i| rank_key(&pool.devices[i]));

    if candidates.is_empty() {
        return Selection::NoMatch { kind: ErrorKind::NotFound, detail: diagnose(pool, req) };
    }

    // 2. Booted + unclaimed → immediate.
    // 3. Shutdown + unclaimed + auto_boot → boot-then-use.
    for &i in &candidates {
        let entry = &pool.devices[i];
        if claimed_by_other(entry, req.session_id.as_deref()) {
            continue;
        }
        match entry.state {
            DeviceState::Booted => {
                let entry = &mut pool.devices[i];
                if let Some(ref session) = req.session_id {
                    entry.claim(session);
                }
                return Selection::Ready { udid: entry.udid.clone(), needs_boot: false };
            }
            DeviceState::Shutdown | DeviceState::Booting if req.auto_boot => {
                let entry = &mut pool.devices[i];
                if let Some(ref session) = req.session_id {
                    entry.claim(session);
                }
                return Selection::Ready { udid: entry.udid.clone(), needs_boot: true };
            }
            _ => {}
        }
    }

    // 4/5. Everything matching is claimed (or shutdown without auto_boot).
    let claimed: Vec<&PoolEntry> = candidates
        .iter()
        .map(|&i| &pool.devices[i])
        .filter(|e| claimed_by_other(e, req.session_id.as_deref()))
        .collect();
    if !claimed.is_empty() {
        let claimants: Vec<String> = claimed
            .iter()
            .map(|e| format!("{} ({})", e.udid, e.claimed_by.as_deref().unwrap_or("?")))
            .collect();
        return Selection::Busy {
            detail: format!(
                "all {} matching device(s) are claimed: {}",
                claimed.len(),
                claimants.join(", ")
            ),
        };
    }

    let shutdown: Vec<String> = candidates
        .iter()
        .map(|&i| &pool.devices[i])
        .filter(|e| e.state != DeviceState::Booted)
        .map(|e| e.name.clone())
        .collect();
    Selection::NoMatch {
        kind: ErrorKind::NotFound,
        detail: format!(
            "matching device(s) exist but are shut down and auto_boot is off: {}",
            shutdown.join(", ")
        ),
    }
}

fn select_many(
    pool: &mut PoolFile,
    count: usize,
    req: &ResolveRequest,
) -> Result<(Vec<String>, Vec<String>)> {
    let mut indices: Vec<usize> = pool
        .devices
        .iter()
        .enumerate()
        .filter(|(_, e)| req.criteria_match(e))
        .map(|(i, _)| i)
        .collect();
    indices.sort_by_key(|&i| rank_key(&pool.devices[i]));

    let mut selected = Vec::new();
    let mut to_boot = Vec::new();

    for &i in &indices {
        if selected.len() == count {
            break;
        }
        let entry = &pool.devices[i];
        if claimed_by_other(entry, req.session_id.as_deref()) || entry.state != DeviceState::Booted {
            continue;
        }
        selected.push(entry.udid.clone());
    }
    if selected.len() < count {
        for &i in &indices {
            if selected.len() == count {
                break;
            }
            let entry = &pool.devices[i];
            if claimed_by_other(entry, req.session_id.as_deref())
                || entry.state == DeviceState::Booted
            {
                continue;
            }
            selected.push(entry.udid.clone());
            to_boot.push(entry.udid.clone());
        }
    }

    if selected.len() < count {
        let matching = indices.len();
        let claimed = indices
            .iter()
            .filter(|&&i| claimed_by_other(&pool.devices[i], req.session_id.as_deref()))
            .count();
        let detail = if matching < count {
            format!("only {matching} device(s) match the criteria, {count} requested")
        } else {
            format!(
                "{matching} device(s) match but {claimed} are claimed; only {} usable",
                selected.len()
            )
        };
        let kind = if matching >= count { ErrorKind::Conflict } else { ErrorKind::NotFound };
        return Err(QuernError::tool(kind, Tool::Pool, detail));
    }

    if let Some(ref session) = req.session_id {
        for udid in &selected {
            if let Some(entry) = pool.entry_mut(udid) {
                entry.claim(session);
            }
        }
    }
    Ok((selected, to_boot))
}

/// Build the five-way diagnostic for a criteria miss.
fn diagnose(pool: &PoolFile, req: &ResolveRequest) -> String {
    let available: Vec<&PoolEntry> = pool.devices.iter().filter(|e| e.is_available).collect();
    if available.is_empty() {
        return "no devices are available".to_owned();
    }

    let name_matches: Vec<&&PoolEntry> = available
        .iter()
        .filter(|e| {
            req.name
                .as_ref()
                .is_none_or(|n| e.name.to_lowercase().contains(&n.to_lowercase()))
        })
        .collect();
    let os_matches: Vec<&&PoolEntry> = available
        .iter()
        .filter(|e| req.os_version.as_ref().is_none_or(|os| os_version_matches(os, &e.os_version)))
        .collect();

    match (name_matches.is_empty(), os_matches.is_empty()) {
        (false, true) => {
            let versions: Vec<String> =
                name_matches.iter().map(|e| e.os_version.clone()).collect();
            format!(
                "name matched but no device runs {}; observed versions: {}",
                req.os_version.as_deref().unwrap_or("?"),
                versions.join(", ")
            )
        }
        (true, false) => {
            let names: Vec<String> = os_matches.iter().map(|e| e.name.clone()).collect();
            format!(
                "no device named like {:?}; devices on that OS: {}",
                req.name.as_deref().unwrap_or("?"),
                names.join(", ")
            )
        }
        _ => {
            let names: Vec<String> = available.iter().map(|e| e.name.clone()).collect();
            format!("no device matches the criteria; available: {}", names.join(", "))
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
