// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accessibility-tree parsing and tap-point synthesis.
//!
//! The describe tool emits one JSON object per element (an array in JSON
//! mode, indented lines in text mode). Indentation is not formally
//! specified, so hierarchy recovery is tolerant of tab/space mixing and
//! degrades to a flat list when the structure is inconsistent.

use serde_json::Value;

use crate::model::{UiElement, UiFrame};

/// Tap duration floor: zero-duration taps are silently ignored by some
/// controls, 50 ms is the minimum that lands reliably.
pub const TAP_DURATION_S: f64 = 0.05;

/// Knob offset for switch-like elements: 85% of the frame width.
const SWITCH_KNOB_RATIO: f64 = 0.85;

/// Parse an `AXFrame` string of the form `{{x, y}, {w, h}}`.
pub fn parse_frame(raw: &str) -> Option<UiFrame> {
    let nums: Vec<f64> = raw
        .split(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if nums.len() != 4 {
        return None;
    }
    Some(UiFrame { x: nums[0], y: nums[1], width: nums[2], height: nums[3] })
}

fn frame_from_value(value: &Value) -> UiFrame {
    if let Some(raw) = value.get("AXFrame").and_then(|v| v.as_str()) {
        if let Some(frame) = parse_frame(raw) {
            return frame;
        }
    }
    // Some describe variants emit a structured frame.
    if let Some(frame) = value.get("frame") {
        let get = |k: &str| frame.get(k).and_then(|v| v.as_f64()).unwrap_or(0.0);
        return UiFrame { x: get("x"), y: get("y"), width: get("width"), height: get("height") };
    }
    UiFrame::default()
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value.and_then(|v| v.as_str()).filter(|s| !s.is_empty() && *s != "(null)").map(str::to_owned)
}

/// Parse one element object from the describe tool.
pub fn parse_element(value: &Value) -> UiElement {
    UiElement {
        element_type: non_empty(value.get("type"))
            .or_else(|| non_empty(value.get("AXType")))
            .unwrap_or_else(|| "Other".to_owned()),
        label: non_empty(value.get("AXLabel")).or_else(|| non_empty(value.get("label"))),
        identifier: non_empty(value.get("AXUniqueId")).or_else(|| non_empty(value.get("identifier"))),
        value: non_empty(value.get("AXValue")).or_else(|| non_empty(value.get("value"))),
        frame: frame_from_value(value),
        enabled: value.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
        visible: value.get("visible").and_then(|v| v.as_bool()).unwrap_or(true),
        traits: value
            .get("traits")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_owned)).collect())
            .unwrap_or_default(),
        role_description: non_empty(value.get("role_description")),
        children: Vec::new(),
    }
}

/// Parse the describe tool's JSON output (an array, or one object per line)
/// into a flat element list.
pub fn parse_describe_output(raw: &str) -> Vec<UiElement> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items.iter().map(parse_element).collect();
    }
    raw.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .map(|v| parse_element(&v))
        .collect()
}

/// Recover a hierarchy from an indented text rendering. Tabs count as four
/// columns; any inconsistency degrades to a flat list.
pub fn parse_indented_tree(raw: &str) -> Vec<UiElement> {
    fn indent_width(line: &str) -> usize {
        let mut width = 0;
        for c in line.chars() {
            match c {
                ' ' => width += 1,
                '\t' => width += 4,
                _ => break,
            }
        }
        width
    }

    let mut roots: Vec<UiElement> = Vec::new();
    // Stack of (indent, path index into the root list and child chains).
    let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let element = match serde_json::from_str::<Value>(line.trim()) {
            Ok(v) => parse_element(&v),
            Err(_) => return parse_describe_output(raw),
        };
        let indent = indent_width(line);

        while let Some((top_indent, _)) = stack.last() {
            if *top_indent >= indent {
                stack.pop();
            } else {
                break;
            }
        }

        let path = match stack.last() {
            None => {
                roots.push(element);
                vec![roots.len() - 1]
            }
            Some((_, parent_path)) => {
                let mut node: &mut UiElement = match roots.get_mut(parent_path[0]) {
                    Some(n) => n,
                    None => return parse_describe_output(raw),
                };
                for &idx in &parent_path[1..] {
                    node = match node.children.get_mut(idx) {
                        Some(n) => n,
                        None => return parse_describe_output(raw),
                    };
                }
                node.children.push(element);
                let mut path = parent_path.clone();
                path.push(node.children.len() - 1);
                path
            }
        };
        stack.push((indent, path));
    }
    roots
}

/// Flatten a hierarchy for matching.
pub fn flatten(elements: &[UiElement]) -> Vec<UiElement> {
    let mut flat = Vec::new();
    fn walk(elements: &[UiElement], out: &mut Vec<UiElement>) {
        for element in elements {
            let mut leaf = element.clone();
            leaf.children = Vec::new();
            out.push(leaf);
            walk(&element.children, out);
        }
    }
    walk(elements, &mut flat);
    flat
}

/// Match criteria for `tap_element` and `wait_for_element`.
#[derive(Debug, Clone, Default)]
pub struct ElementQuery {
    pub label: Option<String>,
    pub identifier: Option<String>,
    pub element_type: Option<String>,
}

impl ElementQuery {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.identifier.is_none() && self.element_type.is_none()
    }

    pub fn matches(&self, element: &UiElement) -> bool {
        if let Some(ref label) = self.label {
            let hit = element
                .label
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&label.to_lowercase()));
            if !hit {
                return false;
            }
        }
        if let Some(ref identifier) = self.identifier {
            if element.identifier.as_deref() != Some(identifier.as_str()) {
                return false;
            }
        }
        if let Some(ref ty) = self.element_type {
            if !element.element_type.eq_ignore_ascii_case(ty) {
                return false;
            }
        }
        true
    }
}

/// Find elements matching the query in a flat list.
pub fn find_elements(flat: &[UiElement], query: &ElementQuery) -> Vec<UiElement> {
    flat.iter().filter(|e| query.matches(e)).cloned().collect()
}

/// Compute where to tap an element. Switch-like controls are tapped at 85%
/// of the frame width so the tap lands on the knob, not the label.
pub fn get_tap_point(element: &UiElement) -> (f64, f64) {
    let frame = &element.frame;
    if element.is_switch_like() {
        (frame.x + frame.width * SWITCH_KNOB_RATIO, frame.y + frame.height / 2.0)
    } else {
        frame.center()
    }
}

/// Whether two frames are close enough to be "the same place" for the
/// pre-tap stability check.
pub fn frames_equivalent(a: &UiFrame, b: &UiFrame) -> bool {
    const TOLERANCE: f64 = 2.0;
    (a.x - b.x).abs() <= TOLERANCE
        && (a.y - b.y).abs() <= TOLERANCE
        && (a.width - b.width).abs() <= TOLERANCE
        && (a.height - b.height).abs() <= TOLERANCE
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
