//! Application layer use cases for the switch orchestrator.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules) and the infrastructure (OS/network/storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "every N
//!   seconds, switch to the next machine that is powered on").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the serial link and the network probe can be swapped in tests.
//! - **Contain no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`rotate_targets`** – The rotation state machine.  Owns the schedule
//!   cursor, refreshes presence, and sends the switch command for the next
//!   eligible target.  Also handles manual switches and transport events.
//!
//! - **`manage_targets`** – The validated, ordered list of configured
//!   targets (add, edit, remove, reorder).

pub mod manage_targets;
pub mod rotate_targets;
