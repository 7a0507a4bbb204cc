// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::FlowStatus;

#[test]
fn parses_flow_event() {
    let line = r#"{"type":"flow","id":"6a2f64ae-21b7-4a3d-9cb8-111122223333","timestamp":"2026-02-07T22:23:01Z","status":"complete","request":{"method":"GET","url":"https://api.example.com/v1/user","host":"api.example.com","path":"/v1/user","headers":{"Accept":["*/*"]},"body_size":0,"body_truncated":false},"response":{"status_code":200,"headers":{},"body_size":12,"body_truncated":false}}"#;
    let event = match parse_event(line) {
        Some(e) => e,
        None => return assert!(false, "flow event must parse"),
    };
    match event {
        InterceptorEvent::Flow { flow } => {
            assert_eq!(flow.status, FlowStatus::Complete);
            assert_eq!(flow.request.host, "api.example.com");
            assert_eq!(flow.response.as_ref().map(|r| r.status_code), Some(200));
        }
        InterceptorEvent::Status(_) => assert!(false, "expected flow"),
    }
}

#[test]
fn parses_status_events() {
    let held = r#"{"type":"status","event":"held","flow_id":"6a2f64ae-21b7-4a3d-9cb8-111122223333","phase":"request"}"#;
    match parse_event(held) {
        Some(InterceptorEvent::Status(StatusEvent::Held { phase, .. })) => {
            assert_eq!(phase, InterceptPhase::Request);
        }
        other => assert!(false, "unexpected: {other:?}"),
    }

    let echo = r#"{"type":"status","event":"rule_echo","rule_id":"rule-3"}"#;
    match parse_event(echo) {
        Some(InterceptorEvent::Status(StatusEvent::RuleEcho { rule_id })) => {
            assert_eq!(rule_id, "rule-3");
        }
        other => assert!(false, "unexpected: {other:?}"),
    }
}

#[test]
fn non_json_chatter_is_ignored() {
    assert!(parse_event("Proxy server listening at http://*:9101").is_none());
    assert!(parse_event("").is_none());
}

#[test]
fn commands_encode_with_tag() -> anyhow::Result<()> {
    let cmd = InterceptorCommand::SetIntercept {
        rule_id: "rule-1".to_owned(),
        pattern: "~d api.example.com & ~m POST".to_owned(),
        phase: InterceptPhase::Request,
    };
    let line = cmd.encode().ok_or_else(|| anyhow::anyhow!("encode failed"))?;
    let value: serde_json::Value = serde_json::from_str(&line)?;
    assert_eq!(value["command"], "set_intercept");
    assert_eq!(value["phase"], "request");
    assert!(!line.contains('\n'));
    Ok(())
}

#[test]
fn release_omits_empty_modifications() -> anyhow::Result<()> {
    let cmd = InterceptorCommand::Release {
        flow_id: uuid::Uuid::new_v4(),
        modifications: None,
    };
    let line = cmd.encode().ok_or_else(|| anyhow::anyhow!("encode failed"))?;
    assert!(!line.contains("modifications"));
    Ok(())
}

#[test]
fn body_at_threshold_is_not_truncated() {
    let body = vec![b'a'; INLINE_BODY_LIMIT];
    let (text, size, truncated, full, encoding) = encode_body(&body);
    assert_eq!(size, INLINE_BODY_LIMIT as u64);
    assert!(!truncated);
    assert!(full.is_none());
    assert_eq!(encoding, crate::model::BodyEncoding::Utf8);
    assert_eq!(text.len(), INLINE_BODY_LIMIT);
}

#[test]
fn body_over_threshold_is_truncated() {
    let body = vec![b'a'; INLINE_BODY_LIMIT + 1];
    let (text, size, truncated, full, _) = encode_body(&body);
    assert_eq!(size, (INLINE_BODY_LIMIT + 1) as u64);
    assert!(truncated);
    assert_eq!(full, Some((INLINE_BODY_LIMIT + 1) as u64));
    assert_eq!(text.len(), INLINE_BODY_LIMIT);
}

#[test]
fn binary_bodies_go_base64() {
    let body = [0u8, 159, 146, 150];
    let (_, _, _, _, encoding) = encode_body(&body);
    assert_eq!(encoding, crate::model::BodyEncoding::Base64);
}
