//! Targets: the computers wired to the ports of the KVM switch.
//!
//! A [`Target`] is identified by an opaque [`TargetId`] that never changes
//! after creation.  Everything else (label, port, addresses, command
//! override) can be edited by the operator; edits produce a new `Target`
//! value carrying the same id.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::magic_packet::MacAddress;

/// A port number outside the range supported by the switch.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("port number {0} is outside the supported range {min}..={max}", min = PortNumber::MIN, max = PortNumber::MAX)]
pub struct PortNumberError(pub u8);

/// A physical port on the KVM switch, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PortNumber(u8);

impl PortNumber {
    /// Lowest port on the switch.
    pub const MIN: u8 = 1;
    /// Highest port on the switch.
    pub const MAX: u8 = 10;

    /// Validates and wraps a port number.
    ///
    /// # Errors
    ///
    /// Returns [`PortNumberError`] when `n` is outside `1..=10`.
    pub fn new(n: u8) -> Result<Self, PortNumberError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(PortNumberError(n))
        }
    }

    /// Returns the raw port number.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Iterates over every port of the switch in ascending order.
    pub fn all() -> impl Iterator<Item = PortNumber> {
        (Self::MIN..=Self::MAX).map(PortNumber)
    }
}

impl TryFrom<u8> for PortNumber {
    type Error = PortNumberError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortNumber> for u8 {
    fn from(port: PortNumber) -> Self {
        port.0
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, immutable identity of a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Wraps an existing identifier (e.g. one loaded from the config file).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A computer attached to one port of the KVM switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    id: TargetId,
    label: String,
    port_number: PortNumber,
    host_address: Option<String>,
    hardware_address: Option<MacAddress>,
    command_override: Option<String>,
}

impl Target {
    /// Creates a target with no addresses and no command override.
    pub fn new(id: TargetId, label: impl Into<String>, port_number: PortNumber) -> Self {
        Self {
            id,
            label: label.into(),
            port_number,
            host_address: None,
            hardware_address: None,
            command_override: None,
        }
    }

    /// Sets the host name or IP used for liveness probing.
    ///
    /// Blank values clear the address, making the target unprobable.
    pub fn with_host_address(mut self, host: impl Into<String>) -> Self {
        self.host_address = non_blank(host.into());
        self
    }

    /// Sets the NIC address used for Wake-on-LAN.
    pub fn with_hardware_address(mut self, mac: MacAddress) -> Self {
        self.hardware_address = Some(mac);
        self
    }

    /// Sets a verbatim command sent instead of the default `X<code>,1$`.
    ///
    /// Blank values clear the override; anything else is kept byte for byte.
    pub fn with_command_override(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        self.command_override = if command.trim().is_empty() {
            None
        } else {
            Some(command)
        };
        self
    }

    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn port_number(&self) -> PortNumber {
        self.port_number
    }

    pub fn host_address(&self) -> Option<&str> {
        self.host_address.as_deref()
    }

    pub fn hardware_address(&self) -> Option<MacAddress> {
        self.hardware_address
    }

    pub fn command_override(&self) -> Option<&str> {
        self.command_override.as_deref()
    }

    /// `true` when the target can be probed for liveness.
    pub fn is_probeable(&self) -> bool {
        self.host_address.is_some()
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_number_accepts_full_range() {
        for n in 1..=10 {
            assert_eq!(PortNumber::new(n).unwrap().get(), n);
        }
    }

    #[test]
    fn test_port_number_rejects_zero_and_eleven() {
        assert_eq!(PortNumber::new(0), Err(PortNumberError(0)));
        assert_eq!(PortNumber::new(11), Err(PortNumberError(11)));
    }

    #[test]
    fn test_port_number_all_yields_ten_ascending_ports() {
        let ports: Vec<u8> = PortNumber::all().map(PortNumber::get).collect();
        assert_eq!(ports, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_port_number_error_message_names_range() {
        assert_eq!(
            PortNumberError(12).to_string(),
            "port number 12 is outside the supported range 1..=10"
        );
    }

    #[test]
    fn test_target_id_generate_is_unique() {
        assert_ne!(TargetId::generate(), TargetId::generate());
    }

    #[test]
    fn test_target_new_has_no_optional_fields() {
        // Arrange / Act
        let target = Target::new(TargetId::new("t"), "Desk", PortNumber::new(2).unwrap());

        // Assert
        assert_eq!(target.id().as_str(), "t");
        assert_eq!(target.label(), "Desk");
        assert_eq!(target.port_number().get(), 2);
        assert!(target.host_address().is_none());
        assert!(target.hardware_address().is_none());
        assert!(target.command_override().is_none());
        assert!(!target.is_probeable());
    }

    #[test]
    fn test_blank_host_address_is_treated_as_absent() {
        let target = Target::new(TargetId::new("t"), "Desk", PortNumber::new(2).unwrap())
            .with_host_address("   ");
        assert!(!target.is_probeable());
    }

    #[test]
    fn test_host_address_is_trimmed() {
        let target = Target::new(TargetId::new("t"), "Desk", PortNumber::new(2).unwrap())
            .with_host_address(" desk.lan ");
        assert_eq!(target.host_address(), Some("desk.lan"));
        assert!(target.is_probeable());
    }

    #[test]
    fn test_command_override_is_kept_verbatim() {
        let target = Target::new(TargetId::new("t"), "Desk", PortNumber::new(2).unwrap())
            .with_command_override(" X2,1$ ");
        assert_eq!(target.command_override(), Some(" X2,1$ "));
    }

    #[test]
    fn test_blank_command_override_is_treated_as_absent() {
        let target = Target::new(TargetId::new("t"), "Desk", PortNumber::new(2).unwrap())
            .with_command_override("");
        assert!(target.command_override().is_none());
    }
}
