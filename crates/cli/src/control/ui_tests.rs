// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::test_support::ScriptedRunner;

fn ui(runner: &Arc<ScriptedRunner>) -> IdbUi {
    IdbUi::new(Arc::clone(runner) as Arc<dyn ToolRunner>)
}

#[test]
fn coordinates_format_compactly() {
    assert_eq!(fmt_coord(50.0), "50");
    assert_eq!(fmt_coord(330.5), "330.5");
    assert_eq!(fmt_coord(12.34), "12.3");
    assert_eq!(fmt_coord(0.0), "0");
}

#[tokio::test]
async fn tap_carries_the_duration_floor() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    ui(&runner).tap("SIM-1", 330.5, 177.0).await?;
    assert_eq!(
        runner.recorded(),
        ["idb ui tap --udid SIM-1 --duration 0.05 330.5 177"]
    );
    Ok(())
}

#[tokio::test]
async fn swipe_passes_coordinates_and_duration() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    ui(&runner).swipe("SIM-1", 100.0, 400.0, 100.0, 100.0, 0.3).await?;
    assert_eq!(
        runner.recorded(),
        ["idb ui swipe --udid SIM-1 --duration 0.3 100 400 100 100"]
    );
    Ok(())
}

#[tokio::test]
async fn describe_all_parses_elements() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    runner.respond(
        "describe-all",
        r#"[{"type":"Button","AXLabel":"Log In","AXFrame":"{{10, 20}, {100, 44}}"}]"#,
    );
    let elements = ui(&runner).describe_all("SIM-1").await?;
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].label.as_deref(), Some("Log In"));
    Ok(())
}

#[tokio::test]
async fn describe_point_returns_first_element() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    runner.respond(
        "describe-point",
        r#"[{"type":"Switch","AXUniqueId":"wifi-toggle","AXFrame":"{{16, 151}, {370, 52}}"}]"#,
    );
    let hit = ui(&runner).describe_point("SIM-1", 330.0, 177.0).await?;
    assert_eq!(hit.and_then(|e| e.identifier), Some("wifi-toggle".to_owned()));

    let runner = ScriptedRunner::new();
    runner.respond("describe-point", "[]");
    assert!(ui(&runner).describe_point("SIM-1", 1.0, 1.0).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn clear_text_selects_all_then_deletes() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    ui(&runner).clear_text("SIM-1").await?;
    assert_eq!(
        runner.recorded(),
        [
            "idb ui key --udid SIM-1 --modifier cmd 4",
            "idb ui key --udid SIM-1 42",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn press_button_uppercases_the_name() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    ui(&runner).press_button("SIM-1", "home").await?;
    assert_eq!(runner.recorded(), ["idb ui button --udid SIM-1 HOME"]);
    Ok(())
}

#[tokio::test]
async fn text_passes_through_verbatim() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    ui(&runner).text("SIM-1", "hello world").await?;
    assert_eq!(runner.recorded(), ["idb ui text --udid SIM-1 hello world"]);
    Ok(())
}
