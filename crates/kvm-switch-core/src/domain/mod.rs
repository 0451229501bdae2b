//! Domain entities for KVM-Switch.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code contains the core business
//! rules, has **no** imports from OS APIs, network libraries, or UI
//! frameworks, and can be tested on any platform without external setup.
//!
//! Here the rules are: what a target is, what its presence means for
//! rotation, and which target the rotation picks next.

/// Targets wired to the KVM switch ports.
pub mod target;

/// Tri-state liveness of targets.
pub mod presence;

/// Rotation configuration and the round-robin selection rule.
pub mod rotation;
