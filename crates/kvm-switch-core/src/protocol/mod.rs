//! Wire formats fixed by external firmware.
//!
//! - **`magic_packet`** – the industry-standard Wake-on-LAN payload.
//! - **`switch_command`** – the ASCII port-select command of the KVM switch,
//!   plus the firmware-side parser used to verify it.

pub mod magic_packet;
pub mod switch_command;

pub use magic_packet::{encode_magic_packet, MacAddress, MagicPacket, MagicPacketError};
pub use switch_command::{encode_command, encode_port, parse_command, CommandParseError};
