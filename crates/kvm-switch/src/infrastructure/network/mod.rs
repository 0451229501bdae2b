//! Network infrastructure for the switch orchestrator.
//!
//! # Sub-modules
//!
//! - **`wake`** – Sends Wake-on-LAN magic packets as UDP broadcasts so a
//!   sleeping target powers on.
//!
//! - **`liveness`** – Decides whether a target is powered on by attempting TCP
//!   connections to a few well-known service ports.  ICMP is not used because
//!   it needs raw-socket privileges and is often firewalled.

pub mod liveness;
pub mod wake;
