// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build-log and crash-report endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::{QuernError, Result};
use crate::model::{BuildDiagnostics, CrashReport};
use crate::transport::state::Store;

/// `GET /api/v1/builds/latest`
pub async fn builds_latest(State(s): State<Arc<Store>>) -> Result<Json<BuildDiagnostics>> {
    s.build
        .latest()
        .map(Json)
        .ok_or_else(|| QuernError::not_found("no build has been parsed yet"))
}

#[derive(Debug, Deserialize)]
pub struct ParseFileBody {
    pub path: String,
}

/// `POST /api/v1/builds/parse-file`
pub async fn builds_parse_file(
    State(s): State<Arc<Store>>,
    Json(body): Json<ParseFileBody>,
) -> Result<Json<BuildDiagnostics>> {
    let diagnostics = s.build.parse_file(std::path::Path::new(&body.path)).await?;
    Ok(Json(diagnostics))
}

/// `GET /api/v1/crashes/latest`
pub async fn crashes_latest(State(s): State<Arc<Store>>) -> Result<Json<CrashReport>> {
    s.crashes
        .latest()
        .map(Json)
        .ok_or_else(|| QuernError::not_found("no crash reports observed"))
}
