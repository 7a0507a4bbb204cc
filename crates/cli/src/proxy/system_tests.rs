// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::ScriptedRunner;

const GETWEBPROXY_OFF: &str = "Enabled: No\nServer:\nPort: 0\nAuthenticated Proxy Enabled: 0\n";
const GETWEBPROXY_ON: &str = "Enabled: Yes\nServer: 10.0.0.5\nPort: 8080\nAuthenticated Proxy Enabled: 0\n";

#[test]
fn parses_disabled_setting() {
    let setting = parse_proxy_setting(GETWEBPROXY_OFF);
    assert!(!setting.enabled);
    assert!(setting.server.is_none());
    assert!(setting.port.is_none());
}

#[test]
fn parses_enabled_setting() {
    let setting = parse_proxy_setting(GETWEBPROXY_ON);
    assert!(setting.enabled);
    assert_eq!(setting.server.as_deref(), Some("10.0.0.5"));
    assert_eq!(setting.port, Some(8080));
}

#[test]
fn picks_first_enabled_service() {
    let raw = "An asterisk (*) denotes that a network service is disabled.\n\
*Thunderbolt Bridge\n\
Wi-Fi\n\
USB 10/100/1000 LAN\n";
    assert_eq!(pick_active_service(raw).as_deref(), Some("Wi-Fi"));
}

#[tokio::test]
async fn snapshot_configure_restore_round_trip() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    runner.respond("-getwebproxy Wi-Fi", GETWEBPROXY_OFF);
    runner.respond("-getsecurewebproxy Wi-Fi", GETWEBPROXY_OFF);
    let system = SystemProxy::new(runner.clone());

    let snapshot = system.snapshot("Wi-Fi").await?;
    assert!(!snapshot.http.enabled);

    system.configure("Wi-Fi", "127.0.0.1", 9101).await?;
    system.restore(&snapshot).await?;

    let recorded = runner.recorded();
    // Configure pointed both proxies at the interceptor...
    assert!(recorded.iter().any(|c| c.contains("-setwebproxy Wi-Fi 127.0.0.1 9101")));
    assert!(recorded.iter().any(|c| c.contains("-setsecurewebproxy Wi-Fi 127.0.0.1 9101")));
    // ...and restore turned the disabled state back off.
    assert!(recorded.iter().any(|c| c.contains("-setwebproxystate Wi-Fi off")));
    assert!(recorded.iter().any(|c| c.contains("-setsecurewebproxystate Wi-Fi off")));
    Ok(())
}

#[tokio::test]
async fn restore_reinstates_enabled_snapshot() -> anyhow::Result<()> {
    let runner = ScriptedRunner::new();
    runner.respond("-getwebproxy Wi-Fi", GETWEBPROXY_ON);
    runner.respond("-getsecurewebproxy Wi-Fi", GETWEBPROXY_OFF);
    let system = SystemProxy::new(runner.clone());

    let snapshot = system.snapshot("Wi-Fi").await?;
    system.restore(&snapshot).await?;

    let recorded = runner.recorded();
    assert!(recorded.iter().any(|c| c.contains("-setwebproxy Wi-Fi 10.0.0.5 8080")));
    assert!(recorded.iter().any(|c| c.contains("-setwebproxystate Wi-Fi on")));
    Ok(())
}

#[test]
fn diff_names_changed_fields() {
    let snapshot = SystemProxySnapshot {
        interface: "Wi-Fi".to_owned(),
        http: parse_proxy_setting(GETWEBPROXY_OFF),
        https: parse_proxy_setting(GETWEBPROXY_OFF),
    };
    let mut current = snapshot.clone();
    current.http = parse_proxy_setting(GETWEBPROXY_ON);
    assert_eq!(diff_fields(&current, &snapshot), ["http"]);
}

#[test]
fn snapshot_serializes_for_state_file() -> anyhow::Result<()> {
    let snapshot = SystemProxySnapshot {
        interface: "Wi-Fi".to_owned(),
        http: parse_proxy_setting(GETWEBPROXY_ON),
        https: parse_proxy_setting(GETWEBPROXY_OFF),
    };
    let json = serde_json::to_string(&snapshot)?;
    let back: SystemProxySnapshot = serde_json::from_str(&json)?;
    assert_eq!(back, snapshot);
    Ok(())
}
