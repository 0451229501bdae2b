//! Transport adapters: how switch commands reach the KVM switch.
//!
//! # Sub-modules
//!
//! - **`device`** – Writes commands to the serial device node (`/dev/ttyUSB0`,
//!   `COM3`, ...) and reports link state changes on a channel.
//!
//! - **`mock`** – Recording doubles for the transport and the presence probe,
//!   used by tests and for dry runs without hardware.

pub mod device;
pub mod mock;

/// Capacity of the transport event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;
