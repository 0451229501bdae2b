//! # kvm-switch-core
//!
//! Shared library for KVM-Switch containing the two wire codecs, the target
//! model, and the pure rotation rules used by the switching orchestrator.
//!
//! This crate has zero dependencies on OS APIs, sockets, serial ports, or an
//! async runtime.  Everything here can be unit-tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! KVM-Switch drives a hardware KVM switch (one keyboard, monitor and mouse
//! shared between several computers) over a serial link.  Each computer is a
//! *target* wired to one numbered port of the switch.  The orchestrator can
//! rotate the console between targets on a timer, skipping targets that look
//! powered off, and can wake sleeping targets with Wake-on-LAN.
//!
//! This crate (`kvm-switch-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – The two fixed wire formats: the 102-byte Wake-on-LAN
//!   magic packet and the `X<code>,1$` serial command understood by the
//!   switch firmware.
//!
//! - **`domain`** – Targets, their tri-state presence, the rotation
//!   configuration, and the round-robin selection rule over the currently
//!   eligible targets.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kvm_switch_core::Target` instead of `kvm_switch_core::domain::target::Target`.
pub use domain::presence::{Presence, PresenceState};
pub use domain::rotation::{
    eligible_ports, select_next_port, EligibilityPolicy, IntervalOutOfRange, RotationConfig,
    ROTATION_POLICY,
};
pub use domain::target::{PortNumber, PortNumberError, Target, TargetId};
pub use protocol::magic_packet::{encode_magic_packet, MacAddress, MagicPacket, MagicPacketError};
pub use protocol::switch_command::{encode_command, encode_port, parse_command, CommandParseError};
