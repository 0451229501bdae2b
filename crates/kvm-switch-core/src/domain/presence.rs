//! Presence: whether a target is believed to be powered on.
//!
//! Presence is a tri-state rather than a boolean because a target without a
//! host address cannot be probed at all.  Such a target is `Unknown`, which
//! is different from `Offline` (probed and found unreachable).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::target::{Target, TargetId};

/// Liveness of a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// The most recent probe reached an open service port.
    Online,
    /// The most recent probe found no open candidate port.
    Offline,
    /// No host address is configured, so the target cannot be probed.
    Unknown,
}

impl Presence {
    /// Converts a probe result into a presence value.
    pub fn from_probe(online: bool) -> Self {
        if online {
            Presence::Online
        } else {
            Presence::Offline
        }
    }
}

/// Snapshot of presence for every probed target.
///
/// A snapshot is built in full from one probe batch and then swapped in as a
/// whole, so readers never observe a half-refreshed map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    entries: HashMap<TargetId, Presence>,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the presence of one target.
    pub fn insert(&mut self, id: TargetId, presence: Presence) {
        self.entries.insert(id, presence);
    }

    /// Returns the recorded presence for `id`, if any.
    pub fn get(&self, id: &TargetId) -> Option<Presence> {
        self.entries.get(id).copied()
    }

    /// Resolves the presence of `target`.
    ///
    /// Targets without a host address are always `Unknown`; probed targets
    /// report their last result; targets with an address that have not been
    /// probed yet are also `Unknown`.
    pub fn presence_of(&self, target: &Target) -> Presence {
        if !target.is_probeable() {
            return Presence::Unknown;
        }
        self.get(target.id()).unwrap_or(Presence::Unknown)
    }

    /// Drops entries for targets that are no longer configured.
    pub fn retain_targets(&mut self, targets: &[Target]) {
        self.entries
            .retain(|id, _| targets.iter().any(|t| t.id() == id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetId, &Presence)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(TargetId, Presence)> for PresenceState {
    fn from_iter<I: IntoIterator<Item = (TargetId, Presence)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
