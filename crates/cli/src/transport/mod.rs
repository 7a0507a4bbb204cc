// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: the explicit route table, auth middleware, and SSE.
//! Routes are values built at init time, not introspected attributes.

pub mod auth;
pub mod http;
pub mod sse;
pub mod state;

pub use state::Store;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum `Router` with the full HTTP surface.
pub fn build_router(state: Arc<Store>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        // Logs
        .route("/api/v1/logs/stream", get(sse::logs_stream))
        .route("/api/v1/logs/query", get(http::logs_query))
        .route("/api/v1/logs/summary", get(http::logs_summary))
        .route("/api/v1/logs/errors", get(http::logs_errors))
        .route("/api/v1/logs/sources", get(http::logs_sources))
        .route("/api/v1/logs/filter", post(http::logs_set_filter))
        // Builds / crashes
        .route("/api/v1/builds/latest", get(http::builds_latest))
        .route("/api/v1/builds/parse-file", post(http::builds_parse_file))
        .route("/api/v1/crashes/latest", get(http::crashes_latest))
        // Proxy
        .route("/api/v1/proxy/status", get(http::proxy_status))
        .route("/api/v1/proxy/start", post(http::proxy_start))
        .route("/api/v1/proxy/stop", post(http::proxy_stop))
        .route("/api/v1/proxy/configure-system", post(http::configure_system))
        .route("/api/v1/proxy/unconfigure-system", post(http::unconfigure_system))
        .route("/api/v1/proxy/local-capture", post(http::proxy_local_capture))
        .route("/api/v1/proxy/cert", get(http::proxy_cert))
        .route("/api/v1/proxy/cert/verify", get(http::cert_verify))
        .route("/api/v1/proxy/cert/install", post(http::cert_install))
        .route("/api/v1/proxy/flows", get(http::flows_list))
        .route("/api/v1/proxy/flows/wait", get(http::flows_wait))
        .route("/api/v1/proxy/flows/summary", get(http::flows_summary))
        .route("/api/v1/proxy/flows/{id}", get(http::flow_detail))
        .route("/api/v1/proxy/intercept", post(http::intercept_set).delete(http::intercept_clear))
        .route("/api/v1/proxy/intercept/held", get(http::intercept_held))
        .route("/api/v1/proxy/intercept/release", post(http::intercept_release))
        .route("/api/v1/proxy/replay/{id}", post(http::proxy_replay))
        .route(
            "/api/v1/proxy/mocks",
            get(http::mocks_list)
                .post(http::mocks_set)
                .patch(http::mocks_update)
                .delete(http::mocks_clear),
        )
        .route("/api/v1/proxy/setup-guide", get(http::setup_guide))
        // Device control
        .route("/api/v1/device/list", get(http::device_list))
        .route("/api/v1/device/boot", post(http::device_boot))
        .route("/api/v1/device/shutdown", post(http::device_shutdown))
        .route("/api/v1/device/app/install", post(http::app_install))
        .route("/api/v1/device/app/launch", post(http::app_launch))
        .route("/api/v1/device/app/terminate", post(http::app_terminate))
        .route("/api/v1/device/app/uninstall", post(http::app_uninstall))
        .route("/api/v1/device/app/list", get(http::app_list))
        .route("/api/v1/device/screenshot", get(http::device_screenshot))
        .route("/api/v1/device/screenshot/annotated", get(http::device_screenshot_annotated))
        .route("/api/v1/device/ui", get(http::device_ui))
        .route("/api/v1/device/ui/element", get(http::device_ui_element))
        .route("/api/v1/device/ui/wait-for-element", get(http::device_wait_for_element))
        .route("/api/v1/device/screen-summary", get(http::device_screen_summary))
        .route("/api/v1/device/ui/tap", post(http::device_tap))
        .route("/api/v1/device/ui/tap-element", post(http::device_tap_element))
        .route("/api/v1/device/ui/swipe", post(http::device_swipe))
        .route("/api/v1/device/ui/type", post(http::device_type_text))
        .route("/api/v1/device/ui/clear", post(http::device_clear_text))
        .route("/api/v1/device/ui/press", post(http::device_press))
        .route("/api/v1/device/location", post(http::device_location))
        .route("/api/v1/device/permission", post(http::device_permission))
        .route("/api/v1/device/logging/simulator/start", post(http::sim_logging_start))
        .route("/api/v1/device/logging/simulator/stop", post(http::sim_logging_stop))
        .route("/api/v1/device/logging/device/start", post(http::device_logging_start))
        .route("/api/v1/device/logging/device/stop", post(http::device_logging_stop))
        .route("/api/v1/device/preview/start", post(http::preview_start))
        .route("/api/v1/device/preview/stop", post(http::preview_stop))
        .route("/api/v1/device/preview/status", get(http::preview_status))
        .route("/api/v1/device/wda/setup", post(http::wda_setup))
        .route("/api/v1/device/wda/start", post(http::wda_start))
        .route("/api/v1/device/wda/stop", post(http::wda_stop))
        // Device pool
        .route("/api/v1/devices/pool", get(http::pool_list))
        .route("/api/v1/devices/claim", post(http::pool_claim))
        .route("/api/v1/devices/release", post(http::pool_release))
        .route("/api/v1/devices/resolve", post(http::pool_resolve))
        .route("/api/v1/devices/ensure", post(http::pool_ensure))
        .route("/api/v1/devices/cleanup", post(http::pool_cleanup))
        .route("/api/v1/devices/refresh", post(http::pool_refresh))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
