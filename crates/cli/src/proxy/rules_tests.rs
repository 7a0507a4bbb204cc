// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn intercept_ids_are_unique() {
    let store = RuleStore::default();
    let a = store.add_intercept("~d a.com".to_owned(), InterceptPhase::Request);
    let b = store.add_intercept("~d b.com".to_owned(), InterceptPhase::Response);
    assert_ne!(a.rule_id, b.rule_id);
    assert_eq!(store.intercepts().len(), 2);
}

#[test]
fn clear_one_or_all_intercepts() {
    let store = RuleStore::default();
    let a = store.add_intercept("~d a.com".to_owned(), InterceptPhase::Request);
    store.add_intercept("~d b.com".to_owned(), InterceptPhase::Request);

    assert_eq!(store.clear_intercepts(Some(&a.rule_id)), vec![a.rule_id.clone()]);
    assert!(store.clear_intercepts(Some("missing")).is_empty());
    assert_eq!(store.clear_intercepts(None).len(), 1);
    assert!(store.intercepts().is_empty());
}

#[test]
fn duplicate_mock_pattern_conflicts() {
    let store = RuleStore::default();
    let first = store.add_mock("~u /v1/login".to_owned(), 401, IndexMap::new(), "{}".to_owned());
    assert!(first.is_ok());
    let second = store.add_mock("~u /v1/login".to_owned(), 200, IndexMap::new(), "{}".to_owned());
    let err = match second {
        Err(e) => e,
        Ok(_) => return assert!(false, "duplicate pattern must conflict"),
    };
    assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
}

#[test]
fn update_mock_is_partial() -> anyhow::Result<()> {
    let store = RuleStore::default();
    let rule = store
        .add_mock("~u /v1/user".to_owned(), 200, IndexMap::new(), "{}".to_owned())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let updated = store
        .update_mock(&rule.rule_id, None, Some(503), None, None)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(updated.status_code, 503);
    assert_eq!(updated.pattern, "~u /v1/user");
    Ok(())
}

#[test]
fn echoes_for_originated_rules_are_ignored() {
    let store = RuleStore::default();
    let rule = store.add_intercept("~d a.com".to_owned(), InterceptPhase::Request);

    // The historical race: an echo arriving after an update must not blank
    // the mirror. Originated rules report "ignored".
    assert!(store.on_rule_echo(&rule.rule_id));
    assert_eq!(store.intercepts().len(), 1, "mirror untouched by echo");

    assert!(!store.on_rule_echo("someone-elses-rule"));
}
