// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(args: &[&str]) -> Config {
    let mut argv = vec!["quern"];
    argv.extend_from_slice(args);
    match Config::try_parse_from(argv) {
        Ok(config) => config,
        Err(e) => {
            unreachable!("config must parse: {e}")
        }
    }
}

#[test]
fn defaults() {
    let config = parse(&[]);
    assert_eq!(config.port, 9100);
    assert!(config.proxy_port.is_none());
    assert!(!config.no_proxy);
    assert!(!config.foreground);
    assert!(config.validate().is_ok());
}

#[test]
fn proxy_port_must_differ() {
    let config = parse(&["--port", "9100", "--proxy-port", "9100"]);
    assert!(config.validate().is_err());

    let config = parse(&["--port", "9100", "--proxy-port", "9101"]);
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_log_format_rejected() {
    let config = parse(&["--log-format", "xml"]);
    assert!(config.validate().is_err());
}

#[test]
fn home_override_moves_all_paths() {
    let config = parse(&["--home", "/tmp/quern-test"]);
    assert_eq!(config.state_path(), PathBuf::from("/tmp/quern-test/state.json"));
    assert_eq!(config.pool_path(), PathBuf::from("/tmp/quern-test/device-pool.json"));
    assert_eq!(config.api_key_path(), PathBuf::from("/tmp/quern-test/api-key"));
    assert_eq!(config.log_path(), PathBuf::from("/tmp/quern-test/quern.log"));
}

#[test]
fn verbose_wins_log_level() {
    let config = parse(&["--verbose", "--log-level", "warn"]);
    assert_eq!(config.effective_log_level(), "debug");

    let config = parse(&["--log-level", "warn"]);
    assert_eq!(config.effective_log_level(), "warn");
}
