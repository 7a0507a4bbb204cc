// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Curated screen digests: a token-efficient description of what is on
//! screen, and the numbered-element legend used by annotated screenshots.

use serde::Serialize;

use crate::control::tree::get_tap_point;
use crate::model::UiElement;

/// Types an agent is likely to interact with, in priority order.
const INTERACTIVE_TYPES: &[&str] =
    &["Button", "TextField", "SecureTextField", "Switch", "CheckBox", "Cell", "Link", "SearchField"];

#[derive(Debug, Clone, Serialize)]
pub struct ScreenElement {
    pub index: usize,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub tap_x: f64,
    pub tap_y: f64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenSummary {
    pub text: String,
    pub elements: Vec<ScreenElement>,
    pub total_elements: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Vec<UiElement>>,
}

fn is_interactive(element: &UiElement) -> bool {
    INTERACTIVE_TYPES.iter().any(|t| element.element_type.eq_ignore_ascii_case(t))
}

fn describe(element: &UiElement) -> String {
    let name = element
        .label
        .as_deref()
        .or(element.identifier.as_deref())
        .or(element.value.as_deref())
        .unwrap_or("");
    if name.is_empty() {
        element.element_type.clone()
    } else {
        format!("{} \u{201c}{name}\u{201d}", element.element_type)
    }
}

/// Build a curated digest from a flat element list.
///
/// Interactive elements come first; static text and decorations fill the
/// remainder of the budget.
pub fn summarize_screen(
    flat: &[UiElement],
    max_elements: usize,
    hierarchy: Option<Vec<UiElement>>,
) -> ScreenSummary {
    let visible: Vec<&UiElement> =
        flat.iter().filter(|e| e.visible && e.frame.width > 0.0 && e.frame.height > 0.0).collect();

    let mut ordered: Vec<&UiElement> = Vec::with_capacity(visible.len());
    ordered.extend(visible.iter().copied().filter(|e| is_interactive(e)));
    ordered.extend(visible.iter().copied().filter(|e| !is_interactive(e)));

    let truncated = ordered.len() > max_elements;
    let elements: Vec<ScreenElement> = ordered
        .iter()
        .take(max_elements)
        .enumerate()
        .map(|(index, element)| {
            let (tap_x, tap_y) = get_tap_point(element);
            ScreenElement {
                index,
                element_type: element.element_type.clone(),
                label: element.label.clone(),
                identifier: element.identifier.clone(),
                value: element.value.clone(),
                tap_x,
                tap_y,
                enabled: element.enabled,
            }
        })
        .collect();

    let interactive_count = visible.iter().filter(|e| is_interactive(e)).count();
    let mut text = format!(
        "{} element(s) on screen, {} interactive.",
        visible.len(),
        interactive_count
    );
    let highlights: Vec<String> = ordered
        .iter()
        .take(5)
        .filter(|e| is_interactive(e))
        .map(|e| describe(e))
        .collect();
    if !highlights.is_empty() {
        text.push_str(&format!(" Notable: {}.", highlights.join(", ")));
    }

    ScreenSummary { text, elements, total_elements: visible.len(), truncated, hierarchy }
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
