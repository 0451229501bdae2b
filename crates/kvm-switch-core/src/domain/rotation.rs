//! Rotation rules: the configuration of the timed rotation and the pure
//! selection of the next target.
//!
//! # Round-robin over the eligible subset (for beginners)
//!
//! Every rotation cycle starts by working out which targets are *eligible*:
//! targets that cannot be probed (no host address) plus targets that answered
//! the most recent probe.  The next target is the eligible one with the
//! smallest port number strictly greater than the active port, wrapping
//! around to the smallest eligible port.  Because eligibility is recomputed
//! every cycle, the visiting order changes as machines go online and offline:
//!
//! ```text
//! eligible = {1, 3, 7}   active = 3   →  next = 7
//! eligible = {1, 3, 7}   active = 7   →  next = 1   (wrap-around)
//! eligible = {1, 7}      active = 3   →  next = 1   (active no longer eligible)
//! eligible = {}          active = 3   →  no switch this cycle
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::domain::presence::{Presence, PresenceState};
use crate::domain::target::{PortNumber, Target};

/// Shortest supported rotation interval.
pub const MIN_INTERVAL_SECS: u32 = 5;

/// Longest supported rotation interval.
pub const MAX_INTERVAL_SECS: u32 = 300;

/// Interval used when none is configured.
pub const DEFAULT_INTERVAL_SECS: u32 = 30;

/// A rotation interval outside `5..=300` seconds.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rotation interval {0}s is outside the supported range {MIN_INTERVAL_SECS}..={MAX_INTERVAL_SECS}s")]
pub struct IntervalOutOfRange(pub u32);

/// User-facing rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Whether the operator wants the rotation running.
    pub enabled: bool,
    interval_seconds: u32,
}

impl RotationConfig {
    /// Creates a config, validating the interval.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalOutOfRange`] when `interval_seconds` is outside `5..=300`.
    pub fn new(enabled: bool, interval_seconds: u32) -> Result<Self, IntervalOutOfRange> {
        validate_interval(interval_seconds)?;
        Ok(Self {
            enabled,
            interval_seconds,
        })
    }

    /// Creates a config, clamping the interval into `5..=300`.
    pub fn clamped(enabled: bool, interval_seconds: u32) -> Self {
        Self {
            enabled,
            interval_seconds: interval_seconds.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS),
        }
    }

    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    /// Changes the interval.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalOutOfRange`] and leaves the config unchanged when
    /// `interval_seconds` is outside `5..=300`.
    pub fn set_interval(&mut self, interval_seconds: u32) -> Result<(), IntervalOutOfRange> {
        validate_interval(interval_seconds)?;
        self.interval_seconds = interval_seconds;
        Ok(())
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: DEFAULT_INTERVAL_SECS,
        }
    }
}

fn validate_interval(secs: u32) -> Result<(), IntervalOutOfRange> {
    if (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(IntervalOutOfRange(secs))
    }
}

/// Which presence values make a target eligible for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityPolicy {
    /// Unprobable targets are eligible alongside probed-online ones.
    UnknownEligible,
    /// Only targets that answered the last probe are eligible.
    OnlineOnly,
}

impl EligibilityPolicy {
    /// `true` if a target with `presence` may be selected.
    pub fn admits(self, presence: Presence) -> bool {
        match self {
            EligibilityPolicy::UnknownEligible => presence != Presence::Offline,
            EligibilityPolicy::OnlineOnly => presence == Presence::Online,
        }
    }
}

/// The policy used by the rotation scheduler.
///
/// When nothing is eligible the cycle is skipped; offline targets are never
/// used as a fallback.
pub const ROTATION_POLICY: EligibilityPolicy = EligibilityPolicy::UnknownEligible;

/// Returns the eligible ports, ascending and without duplicates.
pub fn eligible_ports(
    targets: &[Target],
    presence: &PresenceState,
    policy: EligibilityPolicy,
) -> Vec<PortNumber> {
    let mut ports: Vec<PortNumber> = targets
        .iter()
        .filter(|t| {
            let admitted = policy.admits(presence.presence_of(t));
            if !admitted {
                trace!(target_id = %t.id(), port = %t.port_number(), "target not eligible");
            }
            admitted
        })
        .map(Target::port_number)
        .collect();
    ports.sort_unstable();
    ports.dedup();
    ports
}

/// Picks the port that follows `current` among `eligible`.
///
/// Returns the smallest eligible port strictly greater than `current`,
/// wrapping to the smallest eligible port.  When `current` is `None` or is
/// not itself eligible, the smallest eligible port is returned.  Returns
/// `None` only when `eligible` is empty.
pub fn select_next_port(eligible: &[PortNumber], current: Option<PortNumber>) -> Option<PortNumber> {
    let smallest = eligible.iter().copied().min()?;

    let Some(current) = current.filter(|c| eligible.contains(c)) else {
        return Some(smallest);
    };

    let next = eligible.iter().copied().filter(|p| *p > current).min();
    Some(next.unwrap_or(smallest))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
