// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-control endpoints: enumeration, lifecycle, apps, inspection,
//! interaction, configuration, on-demand logging, and driver controls.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::clamp_timeout;
use crate::adapters::device_log::DeviceLogAdapter;
use crate::adapters::SourceAdapter;
use crate::control::{DeviceListing, ElementQuery, TapOutcome};
use crate::error::{QuernError, Result};
use crate::model::{DeviceState, DeviceType, UiElement};
use crate::transport::state::Store;

fn parse_state(raw: &str) -> Result<DeviceState> {
    match raw.to_lowercase().as_str() {
        "booted" => Ok(DeviceState::Booted),
        "shutdown" => Ok(DeviceState::Shutdown),
        "booting" => Ok(DeviceState::Booting),
        other => Err(QuernError::validation(format!("unknown device state: {other}"))),
    }
}

fn parse_type(raw: &str) -> Result<DeviceType> {
    match raw.to_lowercase().as_str() {
        "simulator" => Ok(DeviceType::Simulator),
        "device" => Ok(DeviceType::Device),
        other => Err(QuernError::validation(format!("unknown device type: {other}"))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
}

/// `GET /api/v1/device/list` — always succeeds; missing tools are
/// capability flags.
pub async fn device_list(
    State(s): State<Arc<Store>>,
    Query(params): Query<ListParams>,
) -> Result<Json<DeviceListing>> {
    let state = params.state.as_deref().map(parse_state).transpose()?;
    let device_type = params.device_type.as_deref().map(parse_type).transpose()?;
    Ok(Json(s.controller.list_devices(state, device_type).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct UdidBody {
    #[serde(default)]
    pub udid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UdidParams {
    pub udid: Option<String>,
}

/// `POST /api/v1/device/boot`
pub async fn device_boot(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = s.controller.boot(udid_of(&body)).await?;
    Ok(Json(serde_json::json!({ "booted": udid })))
}

/// `POST /api/v1/device/shutdown`
pub async fn device_shutdown(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = s.controller.shutdown(udid_of(&body)).await?;
    Ok(Json(serde_json::json!({ "shutdown": udid })))
}

fn udid_of(body: &Option<Json<UdidBody>>) -> Option<&str> {
    body.as_ref().and_then(|b| b.udid.as_deref())
}

// -- Apps ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InstallBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub path: String,
}

/// `POST /api/v1/device/app/install`
pub async fn app_install(
    State(s): State<Arc<Store>>,
    Json(body): Json<InstallBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.install(body.udid.as_deref(), &body.path).await?;
    Ok(Json(serde_json::json!({ "installed": body.path })))
}

#[derive(Debug, Deserialize)]
pub struct BundleBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub bundle_id: String,
}

/// `POST /api/v1/device/app/launch`
pub async fn app_launch(
    State(s): State<Arc<Store>>,
    Json(body): Json<BundleBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.launch(body.udid.as_deref(), &body.bundle_id).await?;
    Ok(Json(serde_json::json!({ "launched": body.bundle_id })))
}

/// `POST /api/v1/device/app/terminate`
pub async fn app_terminate(
    State(s): State<Arc<Store>>,
    Json(body): Json<BundleBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.terminate(body.udid.as_deref(), &body.bundle_id).await?;
    Ok(Json(serde_json::json!({ "terminated": body.bundle_id })))
}

/// `POST /api/v1/device/app/uninstall`
pub async fn app_uninstall(
    State(s): State<Arc<Store>>,
    Json(body): Json<BundleBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.uninstall(body.udid.as_deref(), &body.bundle_id).await?;
    Ok(Json(serde_json::json!({ "uninstalled": body.bundle_id })))
}

/// `GET /api/v1/device/app/list`
pub async fn app_list(
    State(s): State<Arc<Store>>,
    Query(params): Query<UdidParams>,
) -> Result<Json<serde_json::Value>> {
    let apps = s.controller.list_apps(params.udid.as_deref()).await?;
    Ok(Json(serde_json::json!({ "apps": apps })))
}

// -- Inspection ---------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScreenshotParams {
    pub udid: Option<String>,
    /// png or jpeg; forwarded to the capture tool.
    pub format: Option<String>,
    pub scale: Option<f64>,
    pub quality: Option<u8>,
}

/// `GET /api/v1/device/screenshot`
pub async fn device_screenshot(
    State(s): State<Arc<Store>>,
    Query(params): Query<ScreenshotParams>,
) -> Result<impl IntoResponse> {
    if let Some(ref format) = params.format {
        if !matches!(format.as_str(), "png" | "jpeg") {
            return Err(QuernError::validation(format!("unsupported format: {format}")));
        }
    }
    let bytes =
        s.controller.screenshot(params.udid.as_deref(), params.format.as_deref()).await?;
    let content_type = match params.format.as_deref() {
        Some("jpeg") => "image/jpeg",
        _ => "image/png",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// `GET /api/v1/device/screenshot/annotated` — the screenshot plus a
/// numbered element legend.
pub async fn device_screenshot_annotated(
    State(s): State<Arc<Store>>,
    Query(params): Query<UdidParams>,
) -> Result<Json<serde_json::Value>> {
    let udid = params.udid.as_deref();
    let bytes = s.controller.screenshot(udid, None).await?;
    let summary = s.controller.screen_summary(udid, 30, false).await?;
    Ok(Json(serde_json::json!({
        "elements": summary.elements,
        "image_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeParams {
    pub udid: Option<String>,
    pub children_of: Option<String>,
}

/// `GET /api/v1/device/ui` — full tree or the subtree under an identifier.
pub async fn device_ui(
    State(s): State<Arc<Store>>,
    Query(params): Query<TreeParams>,
) -> Result<Json<serde_json::Value>> {
    let flat = s.controller.ui_tree(params.udid.as_deref()).await?;
    let elements: Vec<UiElement> = match params.children_of {
        Some(ref parent) => {
            let parent_frame = flat
                .iter()
                .find(|e| e.identifier.as_deref() == Some(parent.as_str()))
                .map(|e| e.frame)
                .ok_or_else(|| QuernError::not_found(format!("no element {parent}")))?;
            flat.into_iter()
                .filter(|e| {
                    let (cx, cy) = e.frame.center();
                    parent_frame.contains(cx, cy)
                })
                .collect()
        }
        None => flat,
    };
    Ok(Json(serde_json::json!({ "elements": elements })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ElementParams {
    pub udid: Option<String>,
    pub label: Option<String>,
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub element_type: Option<String>,
    pub timeout_s: Option<f64>,
}

impl ElementParams {
    fn query(&self) -> ElementQuery {
        ElementQuery {
            label: self.label.clone(),
            identifier: self.identifier.clone(),
            element_type: self.element_type.clone(),
        }
    }
}

/// `GET /api/v1/device/ui/element`
pub async fn device_ui_element(
    State(s): State<Arc<Store>>,
    Query(params): Query<ElementParams>,
) -> Result<Json<serde_json::Value>> {
    let flat = s.controller.ui_tree(params.udid.as_deref()).await?;
    let matches = crate::control::tree::find_elements(&flat, &params.query());
    Ok(Json(serde_json::json!({ "elements": matches })))
}

/// `GET /api/v1/device/ui/wait-for-element` — long-poll; a timeout is a
/// healthy `matched=false`.
pub async fn device_wait_for_element(
    State(s): State<Arc<Store>>,
    Query(params): Query<ElementParams>,
) -> Result<Json<serde_json::Value>> {
    let started = std::time::Instant::now();
    let timeout = clamp_timeout(params.timeout_s, 10.0);
    let hit = s
        .controller
        .wait_for_element(params.udid.as_deref(), &params.query(), timeout)
        .await?;
    Ok(Json(serde_json::json!({
        "matched": hit.is_some(),
        "element": hit,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub udid: Option<String>,
    pub max_elements: Option<usize>,
    pub include_hierarchy: Option<bool>,
}

/// `GET /api/v1/device/screen-summary`
pub async fn device_screen_summary(
    State(s): State<Arc<Store>>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<crate::control::ScreenSummary>> {
    let summary = s
        .controller
        .screen_summary(
            params.udid.as_deref(),
            params.max_elements.unwrap_or(30).min(200),
            params.include_hierarchy.unwrap_or(false),
        )
        .await?;
    Ok(Json(summary))
}

// -- Interaction --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TapBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// `POST /api/v1/device/ui/tap`
pub async fn device_tap(
    State(s): State<Arc<Store>>,
    Json(body): Json<TapBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.tap(body.udid.as_deref(), body.x, body.y).await?;
    Ok(Json(serde_json::json!({ "tapped": { "x": body.x, "y": body.y } })))
}

#[derive(Debug, Deserialize)]
pub struct TapElementBody {
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default, rename = "element_type")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub skip_stability_check: bool,
}

/// `POST /api/v1/device/ui/tap-element`
pub async fn device_tap_element(
    State(s): State<Arc<Store>>,
    Json(body): Json<TapElementBody>,
) -> Result<Json<TapOutcome>> {
    let query = ElementQuery {
        label: body.label,
        identifier: body.identifier,
        element_type: body.element_type,
    };
    let outcome = s
        .controller
        .tap_element(body.udid.as_deref(), &query, body.skip_stability_check)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct SwipeBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    #[serde(default)]
    pub duration_s: Option<f64>,
}

/// `POST /api/v1/device/ui/swipe`
pub async fn device_swipe(
    State(s): State<Arc<Store>>,
    Json(body): Json<SwipeBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller
        .swipe(body.udid.as_deref(), body.x0, body.y0, body.x1, body.y1, body.duration_s.unwrap_or(0.3))
        .await?;
    Ok(Json(serde_json::json!({ "swiped": true })))
}

#[derive(Debug, Deserialize)]
pub struct TypeBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub text: String,
}

/// `POST /api/v1/device/ui/type`
pub async fn device_type_text(
    State(s): State<Arc<Store>>,
    Json(body): Json<TypeBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.type_text(body.udid.as_deref(), &body.text).await?;
    Ok(Json(serde_json::json!({ "typed": body.text.chars().count() })))
}

/// `POST /api/v1/device/ui/clear` — select-all then delete.
pub async fn device_clear_text(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    s.controller.clear_text(udid_of(&body)).await?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}

#[derive(Debug, Deserialize)]
pub struct PressBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub button: String,
}

/// `POST /api/v1/device/ui/press`
pub async fn device_press(
    State(s): State<Arc<Store>>,
    Json(body): Json<PressBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.press_button(body.udid.as_deref(), &body.button).await?;
    Ok(Json(serde_json::json!({ "pressed": body.button })))
}

// -- Configuration ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LocationBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// `POST /api/v1/device/location` — simulator only.
pub async fn device_location(
    State(s): State<Arc<Store>>,
    Json(body): Json<LocationBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller.set_location(body.udid.as_deref(), body.latitude, body.longitude).await?;
    Ok(Json(serde_json::json!({ "set": true })))
}

#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub bundle_id: String,
    pub permission: String,
}

/// `POST /api/v1/device/permission` — simulator only.
pub async fn device_permission(
    State(s): State<Arc<Store>>,
    Json(body): Json<PermissionBody>,
) -> Result<Json<serde_json::Value>> {
    s.controller
        .grant_permission(body.udid.as_deref(), &body.bundle_id, &body.permission)
        .await?;
    Ok(Json(serde_json::json!({ "granted": body.permission })))
}

// -- On-demand device logging -------------------------------------------------

async fn logging_start(s: &Store, udid: Option<&str>, device_type: DeviceType) -> Result<String> {
    let udid = s.controller.resolve_udid(udid).await?;
    let name = DeviceLogAdapter::registry_name(&udid, device_type);
    if s.registry.get(&name).is_some() {
        return Err(QuernError::conflict(format!("logging already running for {udid}")));
    }
    let adapter = Arc::new(DeviceLogAdapter::new(s.sink.clone(), udid.clone(), device_type));
    adapter.start().await?;
    s.registry.insert(adapter);
    Ok(udid)
}

async fn logging_stop(s: &Store, udid: Option<&str>, device_type: DeviceType) -> Result<String> {
    let udid = s.controller.resolve_udid(udid).await?;
    let name = DeviceLogAdapter::registry_name(&udid, device_type);
    match s.registry.remove(&name) {
        Some(adapter) => {
            adapter.stop().await;
            Ok(udid)
        }
        None => Err(QuernError::not_found(format!("no logging running for {udid}"))),
    }
}

/// `POST /api/v1/device/logging/simulator/start`
pub async fn sim_logging_start(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = logging_start(&s, udid_of(&body), DeviceType::Simulator).await?;
    Ok(Json(serde_json::json!({ "logging": udid })))
}

/// `POST /api/v1/device/logging/simulator/stop`
pub async fn sim_logging_stop(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = logging_stop(&s, udid_of(&body), DeviceType::Simulator).await?;
    Ok(Json(serde_json::json!({ "stopped": udid })))
}

/// `POST /api/v1/device/logging/device/start`
pub async fn device_logging_start(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = logging_start(&s, udid_of(&body), DeviceType::Device).await?;
    Ok(Json(serde_json::json!({ "logging": udid })))
}

/// `POST /api/v1/device/logging/device/stop`
pub async fn device_logging_stop(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = logging_stop(&s, udid_of(&body), DeviceType::Device).await?;
    Ok(Json(serde_json::json!({ "stopped": udid })))
}

// -- Preview / WDA controls ---------------------------------------------------

/// `GET /api/v1/device/preview/status` — the preview binary is an external
/// collaborator; its absence is a capability, not an error.
pub async fn preview_status(State(_s): State<Arc<Store>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "running": false,
        "available": crate::control::tool_on_path("quern-preview"),
    }))
}

/// `POST /api/v1/device/preview/start`
pub async fn preview_start(State(_s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    Err(QuernError::tool_missing(
        crate::error::Tool::Idb,
        "quern-preview is not installed; see the setup guide",
    ))
}

/// `POST /api/v1/device/preview/stop`
pub async fn preview_stop(State(_s): State<Arc<Store>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "running": false }))
}

#[derive(Debug, Deserialize)]
pub struct WdaSetupBody {
    #[serde(default)]
    pub udid: Option<String>,
    pub project_path: String,
}

/// `POST /api/v1/device/wda/setup`
pub async fn wda_setup(
    State(s): State<Arc<Store>>,
    Json(body): Json<WdaSetupBody>,
) -> Result<Json<serde_json::Value>> {
    let udid = s.controller.resolve_udid(body.udid.as_deref()).await?;
    s.controller.wda.setup(&udid, &body.project_path).await?;
    Ok(Json(serde_json::json!({ "built": true, "udid": udid })))
}

/// `POST /api/v1/device/wda/start`
pub async fn wda_start(
    State(s): State<Arc<Store>>,
    body: Option<Json<UdidBody>>,
) -> Result<Json<serde_json::Value>> {
    let udid = s.controller.resolve_udid(udid_of(&body)).await?;
    s.controller.wda.start(&udid).await?;
    Ok(Json(serde_json::json!({ "status": s.controller.wda.status(), "udid": udid })))
}

/// `POST /api/v1/device/wda/stop`
pub async fn wda_stop(State(s): State<Arc<Store>>) -> Json<serde_json::Value> {
    s.controller.wda.stop().await;
    Json(serde_json::json!({ "status": s.controller.wda.status() }))
}
