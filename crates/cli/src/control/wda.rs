// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebDriverAgent control for physical devices: build/install via
//! xcodebuild, a long-lived test-runner child, and a thin HTTP client for
//! the UI endpoints the controller needs.
//!
//! WDA being absent is a capability gap, not a server failure — operations
//! against a device without a running driver return `Degraded`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::model::UiElement;
use crate::runner::{StreamingChild, ToolRunner};

const WDA_PORT: u16 = 8100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WdaState {
    Stopped,
    Running,
    Crashed,
}

pub struct WdaControl {
    runner: Arc<dyn ToolRunner>,
    http: reqwest::Client,
    child: tokio::sync::Mutex<Option<StreamingChild>>,
    state: Mutex<WdaState>,
    session: Mutex<Option<String>>,
    /// Path to a WebDriverAgent.xcodeproj checkout, if configured.
    project: Mutex<Option<String>>,
}

impl WdaControl {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Arc<Self> {
        Arc::new(Self {
            runner,
            http: reqwest::Client::new(),
            child: tokio::sync::Mutex::new(None),
            state: Mutex::new(WdaState::Stopped),
            session: Mutex::new(None),
            project: Mutex::new(None),
        })
    }

    pub fn status(&self) -> WdaState {
        *self.state.lock()
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{WDA_PORT}")
    }

    /// Build WebDriverAgent for testing against a device.
    pub async fn setup(&self, udid: &str, project_path: &str) -> Result<()> {
        *self.project.lock() = Some(project_path.to_owned());
        let destination = format!("id={udid}");
        let args: Vec<String> = [
            "-project",
            project_path,
            "-scheme",
            "WebDriverAgentRunner",
            "-destination",
            destination.as_str(),
            "build-for-testing",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
        self.runner.run("xcodebuild", Tool::Wda, &args).await.map(drop)
    }

    /// Start the driver as a long-lived test run.
    pub async fn start(&self, udid: &str) -> Result<()> {
        let project = self.project.lock().clone().ok_or_else(|| {
            QuernError::tool(
                ErrorKind::Degraded,
                Tool::Wda,
                "WebDriverAgent project not configured; run wda/setup first",
            )
        })?;
        let destination = format!("id={udid}");
        let child = StreamingChild::spawn(
            "xcodebuild",
            Tool::Wda,
            &[
                "-project",
                &project,
                "-scheme",
                "WebDriverAgentRunner",
                "-destination",
                &destination,
                "test-without-building",
            ],
        )?;
        *self.child.lock().await = Some(child);
        *self.state.lock() = WdaState::Running;
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            child.terminate(Duration::from_secs(5)).await;
        }
        *self.state.lock() = WdaState::Stopped;
        *self.session.lock() = None;
    }

    fn require_running(&self) -> Result<()> {
        if self.status() == WdaState::Running {
            Ok(())
        } else {
            Err(QuernError::tool(
                ErrorKind::Degraded,
                Tool::Wda,
                "WebDriverAgent is not running; start it with device/wda/start",
            ))
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url());
        let response = self.http.post(&url).json(&body).send().await.map_err(wda_io)?;
        response.json().await.map_err(wda_io)
    }

    async fn ensure_session(&self) -> Result<String> {
        if let Some(session) = self.session.lock().clone() {
            return Ok(session);
        }
        let value =
            self.post("/session", json!({"capabilities": {"alwaysMatch": {}}})).await?;
        let session = extract_session_id(&value).ok_or_else(|| {
            QuernError::tool(ErrorKind::Degraded, Tool::Wda, "driver returned no session id")
        })?;
        *self.session.lock() = Some(session.clone());
        Ok(session)
    }

    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.require_running()?;
        let url = format!("{}/screenshot", self.base_url());
        let value: Value =
            self.http.get(&url).send().await.map_err(wda_io)?.json().await.map_err(wda_io)?;
        let b64 = value
            .get("value")
            .and_then(|v| v.as_str())
            .ok_or_else(|| QuernError::tool(ErrorKind::Degraded, Tool::Wda, "no screenshot data"))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| QuernError::tool(ErrorKind::Internal, Tool::Wda, e.to_string()))
    }

    pub async fn source(&self) -> Result<Vec<UiElement>> {
        self.require_running()?;
        let url = format!("{}/source?format=json", self.base_url());
        let value: Value =
            self.http.get(&url).send().await.map_err(wda_io)?.json().await.map_err(wda_io)?;
        Ok(parse_wda_source(value.get("value").unwrap_or(&Value::Null)))
    }

    pub async fn tap(&self, x: f64, y: f64) -> Result<()> {
        self.require_running()?;
        let session = self.ensure_session().await?;
        self.post(&format!("/session/{session}/wda/tap"), json!({"x": x, "y": y}))
            .await
            .map(drop)
    }

    pub async fn swipe(&self, x0: f64, y0: f64, x1: f64, y1: f64, duration_s: f64) -> Result<()> {
        self.require_running()?;
        let session = self.ensure_session().await?;
        self.post(
            &format!("/session/{session}/wda/dragfromtoforduration"),
            json!({"fromX": x0, "fromY": y0, "toX": x1, "toY": y1, "duration": duration_s}),
        )
        .await
        .map(drop)
    }

    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.require_running()?;
        let session = self.ensure_session().await?;
        let keys: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        self.post(&format!("/session/{session}/wda/keys"), json!({"value": keys}))
            .await
            .map(drop)
    }

    pub async fn press_button(&self, button: &str) -> Result<()> {
        self.require_running()?;
        let session = self.ensure_session().await?;
        self.post(&format!("/session/{session}/wda/pressButton"), json!({"name": button}))
            .await
            .map(drop)
    }
}

/// Session id from a create-session response; the driver wraps it in a
/// `value` envelope on newer builds and bare on older ones.
fn extract_session_id(value: &Value) -> Option<String> {
    value
        .pointer("/value/sessionId")
        .or_else(|| value.get("sessionId"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

fn wda_io(err: reqwest::Error) -> QuernError {
    QuernError::tool(ErrorKind::Degraded, Tool::Wda, format!("driver unreachable: {err}"))
}

/// Convert WDA's recursive source tree into our element shape.
fn parse_wda_source(value: &Value) -> Vec<UiElement> {
    fn convert(node: &Value) -> Option<UiElement> {
        let rect = node.get("rect")?;
        let get = |k: &str| rect.get(k).and_then(|v| v.as_f64()).unwrap_or(0.0);
        Some(UiElement {
            element_type: node.get("type").and_then(|v| v.as_str()).unwrap_or("Other").to_owned(),
            label: node.get("label").and_then(|v| v.as_str()).map(str::to_owned),
            identifier: node.get("name").and_then(|v| v.as_str()).map(str::to_owned),
            value: node.get("value").and_then(|v| v.as_str()).map(str::to_owned),
            frame: crate::model::UiFrame {
                x: get("x"),
                y: get("y"),
                width: get("width"),
                height: get("height"),
            },
            enabled: node.get("isEnabled").and_then(|v| v.as_str()) != Some("0"),
            visible: node.get("isVisible").and_then(|v| v.as_str()) != Some("0"),
            traits: Vec::new(),
            role_description: None,
            children: node
                .get("children")
                .and_then(|v| v.as_array())
                .map(|kids| kids.iter().filter_map(convert).collect())
                .unwrap_or_default(),
        })
    }
    convert(value).map(|root| vec![root]).unwrap_or_default()
}

#[cfg(test)]
#[path = "wda_tests.rs"]
mod tests;
