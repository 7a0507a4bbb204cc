// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device controller: a facade over the simulator and physical-device
//! backends plus the UI-automation layer. All operations take an optional
//! udid; when omitted, the active device is resolved on demand.

pub mod devicectl;
pub mod screen;
pub mod simctl;
pub mod tree;
pub mod ui;
pub mod wda;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{QuernError, Result};
use crate::model::{Device, DeviceState, DeviceType, UiElement};
use crate::pool::{DeviceInventory, DevicePool, ResolveRequest};
use crate::runner::ToolRunner;

pub use screen::{summarize_screen, ScreenSummary};
pub use tree::{ElementQuery, TAP_DURATION_S};

/// UI-tree cache TTL. The cache is a latency optimization only; mutations
/// invalidate it synchronously.
const UI_CACHE_TTL: Duration = Duration::from_millis(300);

/// Coordinate cache tuning.
const COORD_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const COORD_CACHE_MAX_MISSES: u32 = 3;

/// Outcome of `tap_element`: ambiguity is an informational result the
/// caller refines, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum TapOutcome {
    Tapped { x: f64, y: f64, element: UiElement },
    Ambiguous { candidates: Vec<UiElement> },
}

/// Coordinate-cache key: (bundle_id, device_model, identifier). The model
/// scopes entries across same-model devices; the foreground bundle keeps
/// app A's coordinates from leaking into app B.
type CoordKey = (String, String, String);

/// Per-identifier cached tap coordinates with hit/miss bookkeeping.
struct CoordEntry {
    x: f64,
    y: f64,
    stored_at: Instant,
    hits: u64,
    consecutive_misses: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceListing {
    pub devices: Vec<Device>,
    /// Capability flags: a missing tool is a flag here, never an error.
    pub tools: std::collections::BTreeMap<String, bool>,
}

struct CachedTree {
    at: Instant,
    flat: Vec<UiElement>,
}

/// Enumeration is throttled like the pool's refresh so chained operations
/// do not spam the management tools.
const ENUM_CACHE_TTL: Duration = Duration::from_secs(2);

struct CachedDevices {
    at: Option<Instant>,
    devices: Vec<Device>,
}

pub struct DeviceController {
    pub simctl: simctl::Simctl,
    pub devicectl: devicectl::Devicectl,
    pub ui: ui::IdbUi,
    pub wda: Arc<wda::WdaControl>,
    active: RwLock<Option<String>>,
    pool: RwLock<Option<Arc<DevicePool>>>,
    ui_cache: Mutex<HashMap<String, CachedTree>>,
    coord_cache: Mutex<HashMap<CoordKey, CoordEntry>>,
    /// Foreground bundle per udid, maintained by launch/terminate.
    foreground: Mutex<HashMap<String, String>>,
    enum_cache: Mutex<CachedDevices>,
}

impl DeviceController {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Arc<Self> {
        Arc::new(Self {
            simctl: simctl::Simctl::new(Arc::clone(&runner)),
            devicectl: devicectl::Devicectl::new(Arc::clone(&runner)),
            ui: ui::IdbUi::new(Arc::clone(&runner)),
            wda: wda::WdaControl::new(runner),
            active: RwLock::new(None),
            pool: RwLock::new(None),
            ui_cache: Mutex::new(HashMap::new()),
            coord_cache: Mutex::new(HashMap::new()),
            foreground: Mutex::new(HashMap::new()),
            enum_cache: Mutex::new(CachedDevices { at: None, devices: Vec::new() }),
        })
    }

    /// Wire the pool in at lifecycle start (breaks the pool↔controller cycle).
    pub fn attach_pool(&self, pool: Arc<DevicePool>) {
        *self.pool.write() = Some(pool);
    }

    pub fn set_active(&self, udid: Option<String>) {
        *self.active.write() = udid;
    }

    pub fn active(&self) -> Option<String> {
        self.active.read().clone()
    }

    // -- Resolution -----------------------------------------------------------

    /// Resolve the target device: explicit parameter → stored active → pool
    /// resolution → auto-detect a single booted simulator → error.
    ///
    /// A pool failure must be invisible: any error from pool-backed
    /// resolution falls through to the original logic.
    pub async fn resolve_udid(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(udid) = explicit {
            return Ok(udid.to_owned());
        }
        if let Some(active) = self.active() {
            return Ok(active);
        }

        let pool = self.pool.read().clone();
        if let Some(pool) = pool {
            match pool.resolve(&ResolveRequest::default()).await {
                Ok(udid) => return Ok(udid),
                Err(err) => {
                    tracing::debug!(err = %err, "pool resolution failed, falling back");
                }
            }
        }

        let devices = self.enumerate().await;
        let booted: Vec<&Device> =
            devices.iter().filter(|d| d.state == DeviceState::Booted).collect();
        match booted.as_slice() {
            [single] => Ok(single.udid.clone()),
            [] => Err(QuernError::not_found(
                "no booted device; boot one or pass an explicit udid",
            )),
            many => Err(QuernError::validation(format!(
                "{} devices are booted; pass an explicit udid ({})",
                many.len(),
                many.iter().map(|d| d.udid.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Whether a udid names a simulator (falls back to assuming simulator
    /// when enumeration cannot say).
    async fn device_type_of(&self, udid: &str) -> DeviceType {
        let devices = self.enumerate().await;
        devices
            .iter()
            .find(|d| d.udid == udid)
            .map(|d| d.device_type)
            .unwrap_or(DeviceType::Simulator)
    }

    /// Best-effort enumeration across both backends; a failing backend
    /// contributes nothing rather than an error. Cached briefly so chained
    /// operations (resolve → dispatch → dispatch) reuse one listing.
    async fn enumerate(&self) -> Vec<Device> {
        {
            let cache = self.enum_cache.lock();
            if let Some(at) = cache.at {
                if at.elapsed() < ENUM_CACHE_TTL {
                    return cache.devices.clone();
                }
            }
        }
        let mut devices = self.simctl.list_devices().await.unwrap_or_default();
        devices.extend(self.devicectl.list_devices().await.unwrap_or_default());
        let mut cache = self.enum_cache.lock();
        cache.at = Some(Instant::now());
        cache.devices = devices.clone();
        devices
    }

    /// `list_devices` always succeeds; missing tools become capability
    /// flags in the response.
    pub async fn list_devices(
        &self,
        state: Option<DeviceState>,
        device_type: Option<DeviceType>,
    ) -> DeviceListing {
        let mut devices = self.enumerate().await;
        if let Some(state) = state {
            devices.retain(|d| d.state == state);
        }
        if let Some(ty) = device_type {
            devices.retain(|d| d.device_type == ty);
        }

        let mut tools = std::collections::BTreeMap::new();
        for tool in ["xcrun", "idb", "idevicesyslog", "mitmdump", "networksetup", "xcodebuild"] {
            tools.insert(tool.to_owned(), tool_on_path(tool));
        }
        DeviceListing { devices, tools }
    }

    // -- Lifecycle ------------------------------------------------------------

    pub async fn boot(&self, udid: Option<&str>) -> Result<String> {
        let udid = self.resolve_udid(udid).await?;
        self.require_simulator(&udid, "boot").await?;
        self.simctl.boot(&udid).await?;
        Ok(udid)
    }

    pub async fn shutdown(&self, udid: Option<&str>) -> Result<String> {
        let udid = self.resolve_udid(udid).await?;
        self.require_simulator(&udid, "shutdown").await?;
        self.simctl.shutdown(&udid).await?;
        self.invalidate_ui_cache(&udid);
        Ok(udid)
    }

    async fn require_simulator(&self, udid: &str, operation: &str) -> Result<()> {
        if self.device_type_of(udid).await == DeviceType::Device {
            return Err(QuernError::validation(format!(
                "{operation} is a simulator-only operation"
            )));
        }
        Ok(())
    }

    // -- Apps -----------------------------------------------------------------

    pub async fn install(&self, udid: Option<&str>, app_path: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.install(&udid, app_path).await,
            DeviceType::Device => self.devicectl.install(&udid, app_path).await,
        }
    }

    pub async fn uninstall(&self, udid: Option<&str>, bundle_id: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.uninstall(&udid, bundle_id).await,
            DeviceType::Device => self.devicectl.uninstall(&udid, bundle_id).await,
        }
    }

    pub async fn launch(&self, udid: Option<&str>, bundle_id: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.launch(&udid, bundle_id).await,
            DeviceType::Device => self.devicectl.launch(&udid, bundle_id).await,
        }?;
        self.foreground.lock().insert(udid, bundle_id.to_owned());
        Ok(())
    }

    pub async fn terminate(&self, udid: Option<&str>, bundle_id: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.terminate(&udid, bundle_id).await,
            DeviceType::Device => self.devicectl.terminate(&udid, bundle_id).await,
        }?;
        let mut foreground = self.foreground.lock();
        if foreground.get(&udid).is_some_and(|b| b == bundle_id) {
            foreground.remove(&udid);
        }
        Ok(())
    }

    pub async fn list_apps(&self, udid: Option<&str>) -> Result<Vec<String>> {
        let udid = self.resolve_udid(udid).await?;
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.list_apps(&udid).await,
            DeviceType::Device => self.devicectl.list_apps(&udid).await,
        }
    }

    // -- Inspection -----------------------------------------------------------

    /// Screenshot bytes. `image_format` maps to the capture tool's `--type`
    /// (png by default); the driver path always produces PNG.
    pub async fn screenshot(&self, udid: Option<&str>, image_format: Option<&str>) -> Result<Vec<u8>> {
        let udid = self.resolve_udid(udid).await?;
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.simctl.screenshot(&udid, image_format).await,
            DeviceType::Device => self.wda.screenshot().await,
        }
    }

    /// Flat accessibility tree, through the short-TTL cache.
    pub async fn ui_tree(&self, udid: Option<&str>) -> Result<Vec<UiElement>> {
        let udid = self.resolve_udid(udid).await?;
        self.fetch_tree(&udid, true).await
    }

    async fn fetch_tree(&self, udid: &str, allow_cache: bool) -> Result<Vec<UiElement>> {
        if allow_cache {
            let cache = self.ui_cache.lock();
            if let Some(cached) = cache.get(udid) {
                if cached.at.elapsed() < UI_CACHE_TTL {
                    return Ok(cached.flat.clone());
                }
            }
        }
        let flat = match self.device_type_of(udid).await {
            DeviceType::Simulator => self.ui.describe_all(udid).await?,
            DeviceType::Device => tree::flatten(&self.wda.source().await?),
        };
        self.ui_cache
            .lock()
            .insert(udid.to_owned(), CachedTree { at: Instant::now(), flat: flat.clone() });
        Ok(flat)
    }

    fn invalidate_ui_cache(&self, udid: &str) {
        self.ui_cache.lock().remove(udid);
    }

    pub async fn screen_summary(
        &self,
        udid: Option<&str>,
        max_elements: usize,
        include_hierarchy: bool,
    ) -> Result<ScreenSummary> {
        let udid = self.resolve_udid(udid).await?;
        let flat = self.fetch_tree(&udid, true).await?;
        let hierarchy = if include_hierarchy {
            // The flat list carries no nesting; hand back the elements as a
            // single level rather than inventing structure.
            Some(flat.clone())
        } else {
            None
        };
        Ok(summarize_screen(&flat, max_elements, hierarchy))
    }

    /// First element matching the query, long-polling up to `timeout`.
    pub async fn wait_for_element(
        &self,
        udid: Option<&str>,
        query: &ElementQuery,
        timeout: Duration,
    ) -> Result<Option<UiElement>> {
        let udid = self.resolve_udid(udid).await?;
        let deadline = Instant::now() + timeout;
        loop {
            let flat = self.fetch_tree(&udid, false).await?;
            if let Some(hit) = tree::find_elements(&flat, query).into_iter().next() {
                return Ok(Some(hit));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(500).min(remaining)).await;
        }
    }

    // -- Interaction ----------------------------------------------------------

    pub async fn tap(&self, udid: Option<&str>, x: f64, y: f64) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.ui.tap(&udid, x, y).await,
            DeviceType::Device => self.wda.tap(x, y).await,
        }
    }

    /// Resolve → match → (stability check) → tap. Multiple matches return
    /// the candidate list for the caller to refine.
    pub async fn tap_element(
        &self,
        udid: Option<&str>,
        query: &ElementQuery,
        skip_stability_check: bool,
    ) -> Result<TapOutcome> {
        if query.is_empty() {
            return Err(QuernError::validation(
                "tap_element needs at least one of label, identifier, element_type",
            ));
        }
        let udid = self.resolve_udid(udid).await?;

        // Identifier lookups may hit the coordinate cache: probe the element
        // at the cached point and tap immediately when identity confirms.
        // The key needs the foreground bundle; with no bundle tracked the
        // cache is skipped entirely.
        if let (Some(identifier), None) = (&query.identifier, &query.label) {
            if let Some(key) = self.coord_key(&udid, identifier).await {
                if let Some((x, y)) = self.coord_cache_lookup(&key) {
                    if let Ok(Some(probed)) = self.ui.describe_point(&udid, x, y).await {
                        if probed.identifier.as_deref() == Some(identifier.as_str()) {
                            self.coord_cache_hit(&key);
                            self.invalidate_ui_cache(&udid);
                            self.do_tap(&udid, x, y).await?;
                            return Ok(TapOutcome::Tapped { x, y, element: probed });
                        }
                    }
                    self.coord_cache_miss(&key);
                }
            }
        }

        let flat = self.fetch_tree(&udid, true).await?;
        let mut matches = tree::find_elements(&flat, query);
        let mut element = match matches.len() {
            0 => {
                return Err(QuernError::not_found(format!(
                    "no element matches {query:?}"
                )))
            }
            1 => matches.remove(0),
            _ => return Ok(TapOutcome::Ambiguous { candidates: matches }),
        };

        // Pre-tap stability: re-read once and follow the element if it
        // settled somewhere nearby. Skipped for static chrome.
        if !skip_stability_check {
            let fresh = self.fetch_tree(&udid, false).await?;
            if let Some(moved) = tree::find_elements(&fresh, query).into_iter().next() {
                if !tree::frames_equivalent(&element.frame, &moved.frame) {
                    tracing::debug!(udid = %udid, "element moved between reads, using fresh frame");
                }
                element = moved;
            }
        }

        let (x, y) = tree::get_tap_point(&element);
        self.invalidate_ui_cache(&udid);
        self.do_tap(&udid, x, y).await?;

        if let Some(ref identifier) = element.identifier {
            if let Some(key) = self.coord_key(&udid, identifier).await {
                self.coord_cache_store(key, x, y);
            }
        }
        Ok(TapOutcome::Tapped { x, y, element })
    }

    async fn do_tap(&self, udid: &str, x: f64, y: f64) -> Result<()> {
        match self.device_type_of(udid).await {
            DeviceType::Simulator => self.ui.tap(udid, x, y).await,
            DeviceType::Device => self.wda.tap(x, y).await,
        }
    }

    pub async fn swipe(
        &self,
        udid: Option<&str>,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        duration_s: f64,
    ) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.ui.swipe(&udid, x0, y0, x1, y1, duration_s).await,
            DeviceType::Device => self.wda.swipe(x0, y0, x1, y1, duration_s).await,
        }
    }

    pub async fn type_text(&self, udid: Option<&str>, text: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.ui.text(&udid, text).await,
            DeviceType::Device => self.wda.type_text(text).await,
        }
    }

    pub async fn clear_text(&self, udid: Option<&str>) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        self.require_simulator(&udid, "clear_text").await?;
        self.ui.clear_text(&udid).await
    }

    pub async fn press_button(&self, udid: Option<&str>, button: &str) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.invalidate_ui_cache(&udid);
        match self.device_type_of(&udid).await {
            DeviceType::Simulator => self.ui.press_button(&udid, button).await,
            DeviceType::Device => self.wda.press_button(button).await,
        }
    }

    // -- Configuration --------------------------------------------------------

    pub async fn set_location(&self, udid: Option<&str>, lat: f64, lon: f64) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.require_simulator(&udid, "set_location").await?;
        self.simctl.set_location(&udid, lat, lon).await
    }

    pub async fn grant_permission(
        &self,
        udid: Option<&str>,
        bundle_id: &str,
        permission: &str,
    ) -> Result<()> {
        let udid = self.resolve_udid(udid).await?;
        self.require_simulator(&udid, "grant_permission").await?;
        self.simctl.grant_permission(&udid, bundle_id, permission).await
    }

    // -- Coordinate cache -----------------------------------------------------

    /// Device model (enumeration name) for a udid, from the cached listing.
    async fn device_model_of(&self, udid: &str) -> Option<String> {
        self.enumerate().await.iter().find(|d| d.udid == udid).map(|d| d.name.clone())
    }

    /// Assemble the full cache key. `None` when the foreground bundle or
    /// the device model is unknown — no key, no caching.
    async fn coord_key(&self, udid: &str, identifier: &str) -> Option<CoordKey> {
        let bundle = self.foreground.lock().get(udid).cloned()?;
        let model = self.device_model_of(udid).await?;
        Some((bundle, model, identifier.to_owned()))
    }

    fn coord_cache_lookup(&self, key: &CoordKey) -> Option<(f64, f64)> {
        let mut cache = self.coord_cache.lock();
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < COORD_CACHE_TTL => Some((entry.x, entry.y)),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn coord_cache_store(&self, key: CoordKey, x: f64, y: f64) {
        self.coord_cache.lock().insert(
            key,
            CoordEntry { x, y, stored_at: Instant::now(), hits: 0, consecutive_misses: 0 },
        );
    }

    fn coord_cache_hit(&self, key: &CoordKey) {
        if let Some(entry) = self.coord_cache.lock().get_mut(key) {
            entry.hits += 1;
            entry.consecutive_misses = 0;
        }
    }

    fn coord_cache_miss(&self, key: &CoordKey) {
        let mut cache = self.coord_cache.lock();
        if let Some(entry) = cache.get_mut(key) {
            entry.consecutive_misses += 1;
            if entry.consecutive_misses >= COORD_CACHE_MAX_MISSES {
                cache.remove(key);
            }
        }
    }
}

/// Minimal PATH probe so missing tools become capability flags.
pub fn tool_on_path(tool: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else { return false };
    std::env::split_paths(&path).any(|dir| dir.join(tool).is_file())
}

/// The narrow inventory view handed to the pool.
pub struct ControllerInventory {
    controller: Arc<DeviceController>,
}

impl ControllerInventory {
    pub fn new(controller: Arc<DeviceController>) -> Arc<Self> {
        Arc::new(Self { controller })
    }
}

#[async_trait]
impl DeviceInventory for ControllerInventory {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.controller.enumerate().await)
    }

    async fn boot(&self, udid: &str) -> Result<()> {
        self.controller.simctl.boot(udid).await
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
