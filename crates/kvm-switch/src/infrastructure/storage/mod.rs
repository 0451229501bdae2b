//! Storage infrastructure: configuration file persistence.
//!
//! This module provides a thin adapter between the application and the
//! file system.  The `config` sub-module handles:
//!
//! - Reading the TOML configuration file (targets, rotation settings, serial
//!   link parameters, probe and wake settings).
//! - Writing changes back to disk when the operator edits targets or
//!   rotation settings.
//! - Providing sensible defaults when the file does not exist yet (first run).

pub mod config;
