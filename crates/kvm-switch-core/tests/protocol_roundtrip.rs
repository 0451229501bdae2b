//! Integration tests for the kvm-switch-core codecs.
//!
//! These tests drive the public API the way the switch firmware and a NIC
//! would see it: every encoded command must parse back to the port it was
//! built from, and every magic packet must match the standard layout.

use kvm_switch_core::{
    encode_command, encode_magic_packet, encode_port, parse_command, CommandParseError,
    MacAddress, MagicPacketError, PortNumber, Target, TargetId,
};
use serde::Deserialize;

#[test]
fn test_every_port_survives_firmware_roundtrip() {
    for port in PortNumber::all() {
        let command = encode_port(port);
        assert_eq!(parse_command(&command), Ok(port), "port {port} via {command:?}");
    }
}

#[test]
fn test_encoded_commands_are_five_ascii_bytes() {
    for port in PortNumber::all() {
        let command = encode_port(port);
        assert_eq!(command.len(), 5);
        assert!(command.is_ascii());
        assert!(command.starts_with('X'));
        assert!(command.ends_with(",1$"));
    }
}

#[test]
fn test_target_without_override_roundtrips_to_its_port() {
    let target = Target::new(TargetId::generate(), "Rack 3", PortNumber::new(10).unwrap());
    let command = encode_command(&target);
    assert_eq!(command, "XA,1$");
    assert_eq!(parse_command(&command), Ok(target.port_number()));
}

#[test]
fn test_override_is_opaque_to_the_firmware_parser() {
    let target = Target::new(TargetId::generate(), "Legacy", PortNumber::new(2).unwrap())
        .with_command_override("SW 2\r");
    assert!(matches!(
        parse_command(&encode_command(&target)),
        Err(CommandParseError::MissingPrefix(_))
    ));
}

#[test]
fn test_magic_packet_for_every_accepted_notation_is_identical() {
    let expected = encode_magic_packet("AA:BB:CC:DD:EE:FF").unwrap();
    for notation in ["aa-bb-cc-dd-ee-ff", "AABBCCDDEEFF", "aa:bb-cc:dd-ee:ff"] {
        assert_eq!(encode_magic_packet(notation).unwrap(), expected, "{notation}");
    }
}

#[test]
fn test_magic_packet_layout_matches_parsed_address() {
    let mac = MacAddress::parse("DE:AD:BE:EF:00:01").unwrap();
    let packet = mac.magic_packet();

    assert_eq!(&packet[..6], &[0xFF; 6]);
    for chunk in packet[6..].chunks_exact(6) {
        assert_eq!(chunk, &mac.octets());
    }
}

#[test]
fn test_rejected_mac_reports_the_input() {
    assert_eq!(
        encode_magic_packet("not-a-mac"),
        Err(MagicPacketError::InvalidAddress("not-a-mac".to_string()))
    );
}

#[derive(Debug, Deserialize)]
struct PortEntry {
    port: PortNumber,
}

#[test]
fn test_port_number_deserialization_enforces_range() {
    let ok: PortEntry = toml::from_str("port = 10").unwrap();
    assert_eq!(ok.port.get(), 10);

    assert!(toml::from_str::<PortEntry>("port = 0").is_err());
    assert!(toml::from_str::<PortEntry>("port = 11").is_err());
}
