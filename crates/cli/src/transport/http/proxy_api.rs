// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy control endpoints: lifecycle, system-proxy configuration,
//! certificates, interception, mocks, and replay.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clamp_timeout;
use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::DeviceType;
use crate::proxy::{
    CertTracker, FlowModifications, HeldFlow, InterceptPhase, ProxyStartOptions, ProxyStatus,
};
use crate::transport::state::Store;

#[derive(Debug, Serialize)]
pub struct ProxyStatusResponse {
    pub status: ProxyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub intercepts: Vec<crate::proxy::InterceptRule>,
    pub mocks: Vec<crate::proxy::MockRule>,
    pub held_count: usize,
    pub system_proxy_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// `GET /api/v1/proxy/status`
pub async fn proxy_status(State(s): State<Arc<Store>>) -> Json<ProxyStatusResponse> {
    let configured =
        s.statefile.load().map(|st| st.system_proxy_configured).unwrap_or(false);
    Json(ProxyStatusResponse {
        status: s.proxy.status(),
        port: s.proxy.port().await,
        intercepts: s.proxy.rules.intercepts(),
        mocks: s.proxy.rules.mocks(),
        held_count: s.proxy.held.list().len(),
        system_proxy_configured: configured,
        last_error: s.proxy.last_error(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxyStartRequest {
    #[serde(default)]
    pub port: Option<u16>,
}

/// `POST /api/v1/proxy/start`
pub async fn proxy_start(
    State(s): State<Arc<Store>>,
    body: Option<Json<ProxyStartRequest>>,
) -> Result<Json<serde_json::Value>> {
    let port = body.and_then(|Json(b)| b.port).unwrap_or(s.config.proxy_port);
    s.proxy.start(port, ProxyStartOptions::default()).await?;
    s.statefile.update(|st| {
        st.proxy_enabled = true;
        st.proxy_port = port;
    })?;
    Ok(Json(serde_json::json!({ "status": s.proxy.status(), "port": port })))
}

/// `POST /api/v1/proxy/stop`
pub async fn proxy_stop(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    s.proxy.stop().await;
    restore_system_proxy_if_configured(&s).await;
    s.statefile.update(|st| st.proxy_enabled = false)?;
    Ok(Json(serde_json::json!({ "status": s.proxy.status() })))
}

#[derive(Debug, Default, Deserialize)]
pub struct LocalCaptureRequest {
    /// Process spec for transparent local capture (e.g. an app name).
    pub spec: String,
}

/// `POST /api/v1/proxy/local-capture` — restart interception in
/// per-process local-capture mode, attributing flows to their origin.
pub async fn proxy_local_capture(
    State(s): State<Arc<Store>>,
    Json(body): Json<LocalCaptureRequest>,
) -> Result<Json<serde_json::Value>> {
    if s.proxy.status() == ProxyStatus::Running {
        return Err(QuernError::conflict("stop the proxy before switching to local capture"));
    }
    let port = s.config.proxy_port;
    s.proxy
        .start(port, ProxyStartOptions { local_capture: Some(body.spec.clone()) })
        .await?;
    Ok(Json(serde_json::json!({ "status": s.proxy.status(), "mode": "local", "spec": body.spec })))
}

/// Restore the host proxy settings from the state-file snapshot.
/// Unconditional; external changes are logged by the diff inside
/// `SystemProxy::restore`.
pub(crate) async fn restore_system_proxy_if_configured(s: &Store) {
    let Some(state) = s.statefile.load() else { return };
    if !state.system_proxy_configured {
        return;
    }
    if let Some(snapshot) = state.system_proxy_snapshot {
        if let Err(err) = s.system_proxy.restore(&snapshot).await {
            tracing::error!(err = %err, "system proxy restore failed");
            return;
        }
    }
    let _ = s.statefile.update(|st| {
        st.system_proxy_configured = false;
        st.system_proxy_interface = None;
        st.system_proxy_snapshot = None;
    });
}

/// `POST /api/v1/proxy/configure-system`
pub async fn configure_system(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    if s.statefile.load().is_some_and(|st| st.system_proxy_configured) {
        return Err(QuernError::conflict("system proxy is already configured"));
    }
    let interface = s.system_proxy.active_interface().await?;
    let snapshot = s.system_proxy.snapshot(&interface).await?;
    // The snapshot is persisted before configuration so a crash between the
    // two still restores.
    s.statefile.update(|st| {
        st.system_proxy_configured = true;
        st.system_proxy_interface = Some(interface.clone());
        st.system_proxy_snapshot = Some(snapshot.clone());
    })?;
    s.system_proxy.configure(&interface, "127.0.0.1", s.config.proxy_port).await?;
    Ok(Json(serde_json::json!({ "configured": true, "interface": interface })))
}

/// `POST /api/v1/proxy/unconfigure-system`
pub async fn unconfigure_system(State(s): State<Arc<Store>>) -> Result<Json<serde_json::Value>> {
    if !s.statefile.load().is_some_and(|st| st.system_proxy_configured) {
        return Ok(Json(serde_json::json!({ "configured": false })));
    }
    restore_system_proxy_if_configured(&s).await;
    Ok(Json(serde_json::json!({ "configured": false })))
}

// -- Certificates -------------------------------------------------------------

/// `GET /api/v1/proxy/cert` — the CA certificate, served unauthenticated
/// so a device's Safari can download it.
pub async fn proxy_cert() -> Result<impl IntoResponse> {
    let path = CertTracker::default_ca_path();
    let pem = tokio::fs::read(&path).await.map_err(|e| {
        QuernError::tool(
            ErrorKind::ToolMissing,
            Tool::Mitm,
            format!("CA certificate not found at {}: {e}", path.display()),
        )
    })?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-pem-file"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"mitmproxy-ca-cert.pem\""),
        ],
        pem,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct CertVerifyParams {
    pub state: Option<String>,
}

/// `GET /api/v1/proxy/cert/verify` — ground-truth trust-store inspection.
pub async fn cert_verify(
    State(s): State<Arc<Store>>,
    Query(params): Query<CertVerifyParams>,
) -> Result<Json<crate::proxy::CertVerification>> {
    let listing = s.controller.list_devices(None, Some(DeviceType::Simulator)).await;
    let mut devices = listing.devices;
    if let Some(ref state) = params.state {
        let wanted = state.to_lowercase();
        devices.retain(|d| format!("{:?}", d.state).to_lowercase() == wanted);
    }
    let verification = s.proxy.certs.verify(
        &devices,
        &CertTracker::default_ca_path(),
        &CertTracker::default_devices_root(),
    )?;
    Ok(Json(verification))
}

#[derive(Debug, Default, Deserialize)]
pub struct CertInstallRequest {
    #[serde(default)]
    pub udid: Option<String>,
}

/// `POST /api/v1/proxy/cert/install` — simulators only; physical devices
/// install through Safari per the setup guide.
pub async fn cert_install(
    State(s): State<Arc<Store>>,
    body: Option<Json<CertInstallRequest>>,
) -> Result<Json<serde_json::Value>> {
    let udid = s
        .controller
        .resolve_udid(body.as_ref().and_then(|b| b.udid.as_deref()))
        .await?;
    let ca = CertTracker::default_ca_path();
    s.controller.simctl.add_root_cert(&udid, &ca.to_string_lossy()).await?;
    Ok(Json(serde_json::json!({ "installed": true, "udid": udid })))
}

// -- Interception -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InterceptRequest {
    pub pattern: String,
    #[serde(default)]
    pub phase: Option<InterceptPhase>,
}

/// `POST /api/v1/proxy/intercept`
pub async fn intercept_set(
    State(s): State<Arc<Store>>,
    Json(body): Json<InterceptRequest>,
) -> Result<Json<crate::proxy::InterceptRule>> {
    let rule = s
        .proxy
        .set_intercept(body.pattern, body.phase.unwrap_or(InterceptPhase::Request))
        .await?;
    Ok(Json(rule))
}

#[derive(Debug, Default, Deserialize)]
pub struct RuleIdParams {
    pub rule_id: Option<String>,
}

/// `DELETE /api/v1/proxy/intercept`
pub async fn intercept_clear(
    State(s): State<Arc<Store>>,
    Query(params): Query<RuleIdParams>,
) -> Result<Json<serde_json::Value>> {
    let removed = s.proxy.clear_intercepts(params.rule_id).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// Filter + timeout for the held-flow long-poll; the filter fields mirror
/// the flow list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HeldParams {
    pub phase: Option<InterceptPhase>,
    pub flow_id: Option<Uuid>,
    pub host: Option<String>,
    #[serde(alias = "path_contains")]
    pub path: Option<String>,
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct HeldResponse {
    pub matched: bool,
    pub held: Vec<HeldFlow>,
}

/// `GET /api/v1/proxy/intercept/held` — filtered long-poll; server-side
/// waiting beats client polling.
pub async fn intercept_held(
    State(s): State<Arc<Store>>,
    Query(params): Query<HeldParams>,
) -> Json<HeldResponse> {
    let timeout = clamp_timeout(params.timeout_s, 0.0);
    let flows = Arc::clone(&s.flows);
    let matches = move |held: &HeldFlow| {
        if let Some(phase) = params.phase {
            if held.phase != phase {
                return false;
            }
        }
        if let Some(flow_id) = params.flow_id {
            if held.flow_id != flow_id {
                return false;
            }
        }
        if params.host.is_some() || params.path.is_some() {
            // Host/path filters join against the captured flow detail.
            let Some(flow) = flows.get(&held.flow_id) else { return false };
            if let Some(ref host) = params.host {
                if !flow.request.host.to_lowercase().contains(&host.to_lowercase()) {
                    return false;
                }
            }
            if let Some(ref path) = params.path {
                if !flow.request.path.to_lowercase().contains(&path.to_lowercase()) {
                    return false;
                }
            }
        }
        true
    };

    let held = if timeout.is_zero() {
        s.proxy.held.list_where(matches)
    } else {
        s.proxy.held.wait_matching(timeout, matches).await
    };
    Json(HeldResponse { matched: !held.is_empty(), held })
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub flow_id: Uuid,
    #[serde(default)]
    pub modifications: Option<FlowModifications>,
    /// Drop instead of forwarding.
    #[serde(default)]
    pub drop: bool,
}

/// `POST /api/v1/proxy/intercept/release`
pub async fn intercept_release(
    State(s): State<Arc<Store>>,
    Json(body): Json<ReleaseRequest>,
) -> Result<Json<serde_json::Value>> {
    if body.drop {
        s.proxy.drop_flow(body.flow_id).await?;
        return Ok(Json(serde_json::json!({ "outcome": "dropped" })));
    }
    let outcome = s.proxy.release(body.flow_id, body.modifications).await?;
    Ok(Json(serde_json::json!({ "outcome": outcome })))
}

// -- Replay -------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ReplayRequest {
    #[serde(default)]
    pub modifications: Option<FlowModifications>,
}

/// `POST /api/v1/proxy/replay/{id}`
pub async fn proxy_replay(
    State(s): State<Arc<Store>>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReplayRequest>>,
) -> Result<Json<serde_json::Value>> {
    let flow = s
        .flows
        .get(&id)
        .ok_or_else(|| QuernError::not_found(format!("no flow {id} to replay")))?;
    let modifications = body.and_then(|Json(b)| b.modifications);
    s.proxy.replay(&flow, modifications).await?;
    Ok(Json(serde_json::json!({ "replayed": id })))
}

// -- Mocks --------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MockRequest {
    pub pattern: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
}

/// `GET /api/v1/proxy/mocks`
pub async fn mocks_list(State(s): State<Arc<Store>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "mocks": s.proxy.rules.mocks() }))
}

/// `POST /api/v1/proxy/mocks`
pub async fn mocks_set(
    State(s): State<Arc<Store>>,
    Json(body): Json<MockRequest>,
) -> Result<Json<crate::proxy::MockRule>> {
    let rule = s.proxy.set_mock(body.pattern, body.status_code, body.headers, body.body).await?;
    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
pub struct MockUpdateRequest {
    pub rule_id: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub headers: Option<IndexMap<String, Vec<String>>>,
    #[serde(default)]
    pub body: Option<String>,
}

/// `PATCH /api/v1/proxy/mocks`
pub async fn mocks_update(
    State(s): State<Arc<Store>>,
    Json(body): Json<MockUpdateRequest>,
) -> Result<Json<crate::proxy::MockRule>> {
    let rule = s
        .proxy
        .update_mock(&body.rule_id, body.pattern, body.status_code, body.headers, body.body)
        .await?;
    Ok(Json(rule))
}

/// `DELETE /api/v1/proxy/mocks`
pub async fn mocks_clear(
    State(s): State<Arc<Store>>,
    Query(params): Query<RuleIdParams>,
) -> Result<Json<serde_json::Value>> {
    let removed = s.proxy.clear_mocks(params.rule_id).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

// -- Setup guide --------------------------------------------------------------

const SETUP_GUIDE: &str = include_str!("../../../docs/proxy-setup.md");

/// `GET /api/v1/proxy/setup-guide`
pub async fn setup_guide() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], SETUP_GUIDE)
}
