// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const DEVICE_LIST: &str = r#"{
  "result": {
    "devices": [
      {
        "identifier": "DDDD-1111",
        "hardwareProperties": {"udid": "DDDD-1111"},
        "deviceProperties": {"name": "Ayla's iPhone", "osVersionNumber": "18.1"},
        "connectionProperties": {"tunnelState": "connected"}
      },
      {
        "identifier": "EEEE-2222",
        "hardwareProperties": {"udid": "EEEE-2222"},
        "deviceProperties": {"name": "Test iPad", "osVersionNumber": "17.6"},
        "connectionProperties": {"tunnelState": "unavailable"}
      }
    ]
  }
}"#;

#[test]
fn parses_connected_and_unreachable_devices() {
    let devices = parse_device_list(DEVICE_LIST);
    assert_eq!(devices.len(), 2);

    assert_eq!(devices[0].udid, "DDDD-1111");
    assert_eq!(devices[0].os_version, "iOS 18.1");
    assert_eq!(devices[0].device_type, DeviceType::Device);
    assert_eq!(devices[0].state, DeviceState::Booted);
    assert!(devices[0].is_available);

    assert_eq!(devices[1].state, DeviceState::Shutdown);
    assert!(!devices[1].is_available);
}

#[test]
fn malformed_output_is_an_empty_list() {
    assert!(parse_device_list("not json").is_empty());
    assert!(parse_device_list("{}").is_empty());
}
