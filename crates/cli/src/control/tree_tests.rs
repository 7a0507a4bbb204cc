// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_ax_frame_string() {
    let frame = match parse_frame("{{16, 151}, {370, 52}}") {
        Some(f) => f,
        None => return assert!(false, "frame must parse"),
    };
    assert_eq!(frame.x, 16.0);
    assert_eq!(frame.y, 151.0);
    assert_eq!(frame.width, 370.0);
    assert_eq!(frame.height, 52.0);

    assert!(parse_frame("{{1, 2}, {3}}").is_none());
    assert!(parse_frame("garbage").is_none());
}

#[test]
fn parses_describe_array() {
    let raw = r#"[
        {"type":"Button","AXLabel":"Log In","AXUniqueId":"login-button","AXFrame":"{{10, 20}, {100, 44}}","enabled":true},
        {"type":"TextField","AXLabel":"Email","AXFrame":"{{10, 80}, {300, 40}}"}
    ]"#;
    let elements = parse_describe_output(raw);
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].element_type, "Button");
    assert_eq!(elements[0].identifier.as_deref(), Some("login-button"));
    assert_eq!(elements[1].label.as_deref(), Some("Email"));
}

#[test]
fn null_placeholder_labels_are_dropped() {
    let raw = r#"[{"type":"Other","AXLabel":"(null)","AXFrame":"{{0,0},{10,10}}"}]"#;
    let elements = parse_describe_output(raw);
    assert!(elements[0].label.is_none());
}

#[test]
fn switch_tap_point_offsets_to_knob() {
    let toggle = UiElement {
        element_type: "CheckBox".to_owned(),
        role_description: Some("switch".to_owned()),
        frame: UiFrame { x: 16.0, y: 151.0, width: 370.0, height: 52.0 },
        ..UiElement::default()
    };
    let (x, y) = get_tap_point(&toggle);
    assert!((x - 330.5).abs() < 0.01, "x = {x}");
    assert_eq!(y, 177.0);
}

#[test]
fn plain_element_taps_center() {
    let button = UiElement {
        element_type: "Button".to_owned(),
        frame: UiFrame { x: 0.0, y: 0.0, width: 100.0, height: 50.0 },
        ..UiElement::default()
    };
    assert_eq!(get_tap_point(&button), (50.0, 25.0));
}

#[test]
fn element_query_matching() {
    let button = UiElement {
        element_type: "Button".to_owned(),
        label: Some("Log In".to_owned()),
        identifier: Some("login-button".to_owned()),
        ..UiElement::default()
    };

    let by_label = ElementQuery { label: Some("log in".to_owned()), ..ElementQuery::default() };
    assert!(by_label.matches(&button));

    let by_id =
        ElementQuery { identifier: Some("login-button".to_owned()), ..ElementQuery::default() };
    assert!(by_id.matches(&button));

    let wrong_type = ElementQuery {
        label: Some("log in".to_owned()),
        element_type: Some("Switch".to_owned()),
        ..ElementQuery::default()
    };
    assert!(!wrong_type.matches(&button));
}

#[test]
fn indented_tree_recovers_hierarchy() {
    let raw = "\
{\"type\":\"Window\",\"AXFrame\":\"{{0,0},{400,800}}\"}\n\
\t{\"type\":\"Button\",\"AXLabel\":\"A\",\"AXFrame\":\"{{0,0},{100,50}}\"}\n\
  {\"type\":\"Button\",\"AXLabel\":\"B\",\"AXFrame\":\"{{0,60},{100,50}}\"}\n";
    // Tab and two-space indents mix; both land as children of the window.
    let roots = parse_indented_tree(raw);
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].children.len(), 2);
    assert_eq!(roots[0].children[0].label.as_deref(), Some("A"));
    assert_eq!(roots[0].children[1].label.as_deref(), Some("B"));
}

#[test]
fn unparseable_tree_degrades_to_flat() {
    let raw = "\
{\"type\":\"Window\"}\n\
  not json at all\n";
    let elements = parse_indented_tree(raw);
    // Degraded: the whole input re-parsed flat, JSON lines only.
    assert_eq!(elements.len(), 1);
    assert!(elements[0].children.is_empty());
}

#[test]
fn flatten_walks_children() {
    let raw = "\
{\"type\":\"Window\"}\n\
  {\"type\":\"Button\",\"AXLabel\":\"A\"}\n\
    {\"type\":\"Image\"}\n";
    let roots = parse_indented_tree(raw);
    let flat = flatten(&roots);
    assert_eq!(flat.len(), 3);
    assert!(flat.iter().all(|e| e.children.is_empty()));
}

#[test]
fn frame_equivalence_tolerance() {
    let a = UiFrame { x: 10.0, y: 10.0, width: 100.0, height: 40.0 };
    let b = UiFrame { x: 11.5, y: 9.0, width: 100.0, height: 41.0 };
    let c = UiFrame { x: 20.0, y: 10.0, width: 100.0, height: 40.0 };
    assert!(frames_equivalent(&a, &b));
    assert!(!frames_equivalent(&a, &c));
}
