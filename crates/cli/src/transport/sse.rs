// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent events for real-time log delivery: one `log` event per
//! entry, a `heartbeat` every five seconds, and a final `error` event when
//! a subscriber lags too far behind to keep.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use tokio::sync::broadcast;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::transport::http::LogParams;
use crate::transport::state::Store;

const HEARTBEAT: Duration = Duration::from_secs(5);

/// `GET /api/v1/logs/stream`
pub async fn logs_stream(
    State(s): State<Arc<Store>>,
    Query(params): Query<LogParams>,
) -> Result<Sse<ReceiverStream<std::result::Result<Event, Infallible>>>> {
    let filter = params.to_filter(&s.default_filter.read())?;
    let mut entries = s.ring.subscribe();
    let shutdown = s.lifecycle.shutdown.clone();

    let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Event, Infallible>>(256);
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await; // immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tx.closed() => break, // client disconnected
                _ = heartbeat.tick() => {
                    let data = serde_json::json!({ "ts": crate::model::epoch_ms() });
                    let event = Event::default().event("heartbeat").data(data.to_string());
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
                entry = entries.recv() => match entry {
                    Ok(entry) => {
                        if !filter.matches(&entry) {
                            continue;
                        }
                        let Ok(json) = serde_json::to_string(&entry) else { continue };
                        let event = Event::default().event("log").data(json);
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Producers are never blocked on a slow reader; the
                        // reader is told and dropped instead.
                        let data = serde_json::json!({ "error": "subscriber lagged", "missed": n });
                        let _ = tx.send(Ok(Event::default().event("error").data(data.to_string()))).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)))
}
