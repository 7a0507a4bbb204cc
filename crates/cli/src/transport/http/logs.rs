// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log endpoints: range query, digest, error shortcut, adapter sources,
//! and the server-side default filter.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::parse_time_ms;
use crate::error::{QuernError, Result};
use crate::model::{LogLevel, LogSource};
use crate::ring::{Cursor, LogFilter, LogQuery};
use crate::summary::{summarize_logs, LogSummary};
use crate::transport::state::Store;

/// Shared filter parameters across `/logs/*`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LogParams {
    pub level: Option<String>,
    pub process: Option<String>,
    pub subsystem: Option<String>,
    pub category: Option<String>,
    /// Comma-separated source set.
    pub source: Option<String>,
    pub search: Option<String>,
    pub exclude: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub device_id: Option<String>,
    pub since_cursor: Option<String>,
    /// Summary window in seconds (summary endpoint only).
    pub window_s: Option<u64>,
}

impl LogParams {
    fn has_filter_fields(&self) -> bool {
        self.level.is_some()
            || self.process.is_some()
            || self.subsystem.is_some()
            || self.category.is_some()
            || self.source.is_some()
            || self.search.is_some()
            || self.exclude.is_some()
            || self.device_id.is_some()
    }

    /// Build the effective filter, falling back to the server default when
    /// the request names no filter fields.
    pub fn to_filter(&self, default: &LogFilter) -> Result<LogFilter> {
        if !self.has_filter_fields() {
            return Ok(default.clone());
        }
        let min_level = match &self.level {
            Some(raw) => Some(
                LogLevel::parse(raw)
                    .ok_or_else(|| QuernError::validation(format!("unknown level: {raw}")))?,
            ),
            None => None,
        };
        let sources = match &self.source {
            Some(raw) => {
                let mut sources = Vec::new();
                for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    sources.push(
                        LogSource::parse(part)
                            .ok_or_else(|| QuernError::validation(format!("unknown source: {part}")))?,
                    );
                }
                Some(sources)
            }
            None => None,
        };
        Ok(LogFilter {
            min_level,
            process: self.process.clone(),
            subsystem: self.subsystem.clone(),
            category: self.category.clone(),
            sources,
            search: self.search.clone(),
            exclude: self.exclude.clone(),
            device_id: self.device_id.clone(),
        })
    }

    pub fn to_query(&self, default: &LogFilter) -> Result<LogQuery> {
        let since_cursor = match &self.since_cursor {
            Some(raw) => Some(
                Cursor::decode(raw)
                    .ok_or_else(|| QuernError::validation(format!("bad cursor: {raw}")))?,
            ),
            None => None,
        };
        Ok(LogQuery {
            filter: self.to_filter(default)?,
            since_ms: self.since.as_deref().and_then(parse_time_ms),
            until_ms: self.until.as_deref().and_then(parse_time_ms),
            limit: Some(self.limit.unwrap_or(100).min(1000)),
            offset: self.offset.unwrap_or(0),
            since_cursor,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogQueryResponse {
    pub entries: Vec<crate::model::LogEntry>,
    pub cursor: String,
    pub total_matched: usize,
}

/// `GET /api/v1/logs/query`
pub async fn logs_query(
    State(s): State<Arc<Store>>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogQueryResponse>> {
    let query = params.to_query(&s.default_filter.read())?;
    let result = s.ring.query(&query);
    Ok(Json(LogQueryResponse {
        entries: result.entries,
        cursor: result.cursor.encode(),
        total_matched: result.total_matched,
    }))
}

/// `GET /api/v1/logs/errors` — level floor shortcut.
pub async fn logs_errors(
    State(s): State<Arc<Store>>,
    Query(mut params): Query<LogParams>,
) -> Result<Json<LogQueryResponse>> {
    params.level = Some("error".to_owned());
    let query = params.to_query(&s.default_filter.read())?;
    let result = s.ring.query(&query);
    Ok(Json(LogQueryResponse {
        entries: result.entries,
        cursor: result.cursor.encode(),
        total_matched: result.total_matched,
    }))
}

/// `GET /api/v1/logs/summary`
pub async fn logs_summary(
    State(s): State<Arc<Store>>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogSummary>> {
    let filter = params.to_filter(&s.default_filter.read())?;
    let since_cursor = match &params.since_cursor {
        Some(raw) => Some(
            Cursor::decode(raw).ok_or_else(|| QuernError::validation(format!("bad cursor: {raw}")))?,
        ),
        None => None,
    };
    let summary =
        summarize_logs(&s.ring, filter, since_cursor, params.window_s.map(|w| w * 1000));
    Ok(Json(summary))
}

/// `GET /api/v1/logs/sources` — adapter statuses.
pub async fn logs_sources(State(s): State<Arc<Store>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "sources": s.registry.statuses() }))
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub applied: bool,
}

/// `POST /api/v1/logs/filter` — set the server-side default filter.
pub async fn logs_set_filter(
    State(s): State<Arc<Store>>,
    Json(params): Json<LogParams>,
) -> Result<Json<FilterResponse>> {
    let filter = params.to_filter(&LogFilter::default())?;
    *s.default_filter.write() = filter;
    Ok(Json(FilterResponse { applied: true }))
}
