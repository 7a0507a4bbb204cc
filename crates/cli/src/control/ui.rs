// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulator UI automation through the idb companion: describe, tap, swipe,
//! key, and text input.

use std::sync::Arc;

use crate::control::tree::{self, TAP_DURATION_S};
use crate::error::{Result, Tool};
use crate::model::UiElement;
use crate::runner::ToolRunner;

#[derive(Clone)]
pub struct IdbUi {
    runner: Arc<dyn ToolRunner>,
}

impl IdbUi {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    async fn idb(&self, parts: &[&str]) -> Result<String> {
        let argv: Vec<String> = parts.iter().map(|s| (*s).to_owned()).collect();
        Ok(self.runner.run("idb", Tool::Idb, &argv).await?.stdout)
    }

    /// Full accessibility dump, flat.
    pub async fn describe_all(&self, udid: &str) -> Result<Vec<UiElement>> {
        let raw = self.idb(&["ui", "describe-all", "--udid", udid, "--json"]).await?;
        Ok(tree::parse_describe_output(&raw))
    }

    /// The element at a point, if the daemon reports one.
    pub async fn describe_point(&self, udid: &str, x: f64, y: f64) -> Result<Option<UiElement>> {
        let (xs, ys) = (fmt_coord(x), fmt_coord(y));
        let raw =
            self.idb(&["ui", "describe-point", "--udid", udid, "--json", &xs, &ys]).await?;
        Ok(tree::parse_describe_output(&raw).into_iter().next())
    }

    /// Tap with the 50 ms duration floor.
    pub async fn tap(&self, udid: &str, x: f64, y: f64) -> Result<()> {
        let (xs, ys) = (fmt_coord(x), fmt_coord(y));
        let duration = format!("{TAP_DURATION_S}");
        self.idb(&["ui", "tap", "--udid", udid, "--duration", &duration, &xs, &ys])
            .await
            .map(drop)
    }

    pub async fn swipe(
        &self,
        udid: &str,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        duration_s: f64,
    ) -> Result<()> {
        let coords = [fmt_coord(x0), fmt_coord(y0), fmt_coord(x1), fmt_coord(y1)];
        let duration = format!("{duration_s}");
        self.idb(&[
            "ui", "swipe", "--udid", udid, "--duration", &duration, &coords[0], &coords[1],
            &coords[2], &coords[3],
        ])
        .await
        .map(drop)
    }

    pub async fn text(&self, udid: &str, text: &str) -> Result<()> {
        self.idb(&["ui", "text", "--udid", udid, text]).await.map(drop)
    }

    /// Send a HID keycode, optionally with a modifier held.
    pub async fn key(&self, udid: &str, keycode: u32, modifier: Option<&str>) -> Result<()> {
        let code = keycode.to_string();
        match modifier {
            Some(modifier) => {
                self.idb(&["ui", "key", "--udid", udid, "--modifier", modifier, &code])
                    .await
                    .map(drop)
            }
            None => self.idb(&["ui", "key", "--udid", udid, &code]).await.map(drop),
        }
    }

    /// Select-all then delete.
    pub async fn clear_text(&self, udid: &str) -> Result<()> {
        const KEY_A: u32 = 4;
        const KEY_DELETE: u32 = 42;
        self.key(udid, KEY_A, Some("cmd")).await?;
        self.key(udid, KEY_DELETE, None).await
    }

    /// Hardware button by name (HOME, LOCK, SIRI, ...).
    pub async fn press_button(&self, udid: &str, button: &str) -> Result<()> {
        let upper = button.to_uppercase();
        self.idb(&["ui", "button", "--udid", udid, &upper]).await.map(drop)
    }
}

fn fmt_coord(v: f64) -> String {
    if (v - v.round()).abs() < f64::EPSILON {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.1}")
    }
}

#[cfg(test)]
#[path = "ui_tests.rs"]
mod tests;
