//! Infrastructure layer for the switch orchestrator.
//!
//! Contains OS-facing adapters: network probes and Wake-on-LAN, the serial
//! device transport, file-system storage, the rotation tick driver, and the
//! command bridge for front ends.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `kvm_switch_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod network;
pub mod rotation_loop;
pub mod storage;
pub mod transport;
pub mod ui_bridge;
