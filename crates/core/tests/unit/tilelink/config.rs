//! Configuration reader tests.

use rvtb_core::common::SimError;
use rvtb_core::tilelink::config::parse_config;
use rvtb_core::tilelink::protocol::TlProtocol;

const SAMPLE: &str = "\
# Testbench topology
hosts:
  - Protocol: TL-C      # coherent host
    DataWidth: 64
    FirstID: 0
    LastID: 3
    MaxSize: 5
    Fifo: 0
  - Protocol: TL-UL
    DataWidth: 64
    FirstID: 4
    LastID: 4
    Fifo: 1

devices:
  - Protocol: TL-UH
    DataWidth: 64
    FirstID: 0
    LastID: 1
    CanDeny: 0
    AddressBase: 0 268435456
    AddressMask: 268435455 268435455
    AddressTarget: 0 1
";

#[test]
fn parses_hosts_and_devices() {
    let config = parse_config(SAMPLE).unwrap();

    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.devices.len(), 1);

    let host0 = &config.hosts[0];
    assert_eq!(host0.protocol, TlProtocol::C);
    assert_eq!(host0.data_width, 64);
    assert_eq!(host0.first_id, 0);
    assert_eq!(host0.last_id, 3);
    assert_eq!(host0.max_size, 5);
    assert!(!host0.fifo);

    let host1 = &config.hosts[1];
    assert_eq!(host1.protocol, TlProtocol::Ul);
    assert!(host1.fifo);
}

#[test]
fn parses_routing_tuples() {
    let config = parse_config(SAMPLE).unwrap();
    let device = &config.devices[0];

    assert_eq!(device.bases, vec![0, 0x1000_0000]);
    assert_eq!(device.masks, vec![0x0FFF_FFFF, 0x0FFF_FFFF]);
    assert_eq!(device.targets, vec![0, 1]);
    assert!(!device.can_deny);
}

#[test]
fn can_deny_defaults_to_allowed() {
    let config = parse_config("devices:\n  - Protocol: TL-UL\n").unwrap();
    assert!(config.devices[0].can_deny);
}

#[test]
fn accepts_comments_and_blank_lines() {
    let text = "\
# leading comment

hosts:
  # a comment between entries
  - Protocol: TL-UH   # trailing comment

  - Protocol: TL-UL
";
    let config = parse_config(text).unwrap();
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.hosts[0].protocol, TlProtocol::Uh);
}

#[test]
fn hex_values_are_accepted() {
    let text = "devices:\n  - AddressBase: 0x10000000\n";
    let config = parse_config(text).unwrap();
    assert_eq!(config.devices[0].bases, vec![0x1000_0000]);
}

#[test]
fn unknown_protocol_is_fatal() {
    let result = parse_config("hosts:\n  - Protocol: AXI4\n");
    assert!(matches!(result, Err(SimError::UnknownProtocol(_))));
}

#[test]
fn malformed_line_is_fatal() {
    let result = parse_config("hosts:\n  - Protocol TL-C\n");
    assert!(matches!(result, Err(SimError::Config(_))));
}

#[test]
fn unknown_keys_are_ignored() {
    let config = parse_config("hosts:\n  - Protocol: TL-UL\n    Colour: 7\n").unwrap();
    assert_eq!(config.hosts.len(), 1);
}

#[test]
fn endpoint_outside_a_section_is_fatal() {
    let result = parse_config("- Protocol: TL-UL\n");
    assert!(matches!(result, Err(SimError::Config(_))));
}
