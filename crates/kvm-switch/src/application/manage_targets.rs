//! ManageTargetsUseCase: the validated, ordered list of configured targets.
//!
//! The `TargetRegistry` is the only way targets enter the system, whether
//! they come from the config file at startup or from the operator at
//! runtime.  Every entry point validates the raw input:
//!
//! - the label must not be blank,
//! - the port must exist on the switch (`1..=10`),
//! - no two targets may share a port,
//! - a hardware address, if given, must be in canonical six-pair notation.
//!
//! The registry keeps targets in operator-defined order.  The order has no
//! effect on rotation (which always goes by port number); it is how the list
//! is shown and persisted.

use kvm_switch_core::{
    MacAddress, MagicPacketError, PortNumber, PortNumberError, Target, TargetId,
};
use thiserror::Error;

/// Error type for target registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("target label must not be empty")]
    EmptyLabel,
    #[error(transparent)]
    InvalidPort(#[from] PortNumberError),
    #[error(transparent)]
    InvalidAddress(#[from] MagicPacketError),
    #[error("port {port} is already used by target {existing}")]
    DuplicatePort { port: PortNumber, existing: TargetId },
    #[error("target id {0} already exists")]
    DuplicateId(TargetId),
    #[error("target not found: {0}")]
    UnknownTarget(TargetId),
    /// `reorder` was given ids that are not a permutation of the current ones.
    #[error("reorder must list every target exactly once ({expected} expected, {got} given)")]
    ReorderMismatch { expected: usize, got: usize },
}

/// Unvalidated target fields, as typed by the operator or read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDraft {
    pub label: String,
    pub port_number: u8,
    pub host_address: Option<String>,
    pub hardware_address: Option<String>,
    pub command_override: Option<String>,
}

/// Ordered registry of configured targets.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from persisted entries, keeping their ids and order.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn from_drafts(
        entries: impl IntoIterator<Item = (TargetId, TargetDraft)>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (id, draft) in entries {
            registry.insert(id, draft)?;
        }
        Ok(registry)
    }

    /// Adds a target under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if `draft` fails validation.
    pub fn add(&mut self, draft: TargetDraft) -> Result<Target, RegistryError> {
        self.insert(TargetId::generate(), draft)
    }

    /// Adds a target under an existing id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if `id` is taken, or any
    /// validation error for `draft`.
    pub fn insert(&mut self, id: TargetId, draft: TargetDraft) -> Result<Target, RegistryError> {
        if self.position(&id).is_some() {
            return Err(RegistryError::DuplicateId(id));
        }
        let target = build_target(id, draft)?;
        self.ensure_port_free(target.port_number(), None)?;
        self.targets.push(target.clone());
        Ok(target)
    }

    /// Replaces every editable field of the target `id`.
    ///
    /// The id and the target's position in the list are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTarget`] or a validation error.
    pub fn update(&mut self, id: &TargetId, draft: TargetDraft) -> Result<Target, RegistryError> {
        let index = self
            .position(id)
            .ok_or_else(|| RegistryError::UnknownTarget(id.clone()))?;
        let target = build_target(id.clone(), draft)?;
        self.ensure_port_free(target.port_number(), Some(id))?;
        self.targets[index] = target.clone();
        Ok(target)
    }

    /// Removes the target `id` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTarget`] if no such target exists.
    pub fn remove(&mut self, id: &TargetId) -> Result<Target, RegistryError> {
        let index = self
            .position(id)
            .ok_or_else(|| RegistryError::UnknownTarget(id.clone()))?;
        Ok(self.targets.remove(index))
    }

    /// Reorders the list to match `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ReorderMismatch`] unless `ids` names every
    /// current target exactly once, or [`RegistryError::UnknownTarget`] for
    /// an id that is not registered.  The order is unchanged on error.
    pub fn reorder(&mut self, ids: &[TargetId]) -> Result<(), RegistryError> {
        let mismatch = || RegistryError::ReorderMismatch {
            expected: self.targets.len(),
            got: ids.len(),
        };
        if ids.len() != self.targets.len() {
            return Err(mismatch());
        }

        let mut reordered = Vec::with_capacity(ids.len());
        for id in ids {
            let target = self
                .get(id)
                .ok_or_else(|| RegistryError::UnknownTarget(id.clone()))?;
            if reordered.iter().any(|t: &Target| t.id() == id) {
                return Err(mismatch());
            }
            reordered.push(target.clone());
        }
        self.targets = reordered;
        Ok(())
    }

    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.targets.iter().find(|t| t.id() == id)
    }

    /// Returns the target wired to `port`, if any.
    pub fn by_port(&self, port: PortNumber) -> Option<&Target> {
        self.targets.iter().find(|t| t.port_number() == port)
    }

    /// Returns all targets in display order.
    pub fn all(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn position(&self, id: &TargetId) -> Option<usize> {
        self.targets.iter().position(|t| t.id() == id)
    }

    fn ensure_port_free(
        &self,
        port: PortNumber,
        ignore: Option<&TargetId>,
    ) -> Result<(), RegistryError> {
        match self
            .targets
            .iter()
            .find(|t| t.port_number() == port && Some(t.id()) != ignore)
        {
            Some(existing) => Err(RegistryError::DuplicatePort {
                port,
                existing: existing.id().clone(),
            }),
            None => Ok(()),
        }
    }
}

fn build_target(id: TargetId, draft: TargetDraft) -> Result<Target, RegistryError> {
    let label = draft.label.trim();
    if label.is_empty() {
        return Err(RegistryError::EmptyLabel);
    }
    let port = PortNumber::new(draft.port_number)?;

    let mut target = Target::new(id, label, port);
    if let Some(host) = draft.host_address {
        target = target.with_host_address(host);
    }
    if let Some(mac) = draft.hardware_address.as_deref().map(str::trim) {
        if !mac.is_empty() {
            target = target.with_hardware_address(MacAddress::parse_strict(mac)?);
        }
    }
    if let Some(command) = draft.command_override {
        target = target.with_command_override(command);
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(label: &str, port: u8) -> TargetDraft {
        TargetDraft {
            label: label.to_string(),
            port_number: port,
            ..TargetDraft::default()
        }
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = TargetRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_add_generates_id_and_stores_target() {
        // Arrange
        let mut registry = TargetRegistry::new();

        // Act
        let target = registry.add(draft("Workstation", 3)).unwrap();

        // Assert
        assert!(!target.id().as_str().is_empty());
        assert_eq!(registry.get(target.id()), Some(&target));
        assert_eq!(target.label(), "Workstation");
    }

    #[test]
    fn test_add_rejects_blank_label() {
        let mut registry = TargetRegistry::new();
        assert_eq!(registry.add(draft("   ", 1)), Err(RegistryError::EmptyLabel));
    }

    #[test]
    fn test_add_rejects_port_out_of_range() {
        let mut registry = TargetRegistry::new();
        assert_eq!(
            registry.add(draft("Too far", 11)),
            Err(RegistryError::InvalidPort(PortNumberError(11)))
        );
    }

    #[test]
    fn test_add_rejects_duplicate_port() {
        // Arrange
        let mut registry = TargetRegistry::new();
        let first = registry.add(draft("First", 2)).unwrap();

        // Act
        let result = registry.add(draft("Second", 2));

        // Assert
        assert_eq!(
            result,
            Err(RegistryError::DuplicatePort {
                port: PortNumber::new(2).unwrap(),
                existing: first.id().clone(),
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_validates_hardware_address_strictly() {
        let mut registry = TargetRegistry::new();
        let mut d = draft("NAS", 4);
        d.hardware_address = Some("001122334455".to_string());
        assert!(matches!(
            registry.add(d),
            Err(RegistryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_add_keeps_valid_hardware_address() {
        let mut registry = TargetRegistry::new();
        let mut d = draft("NAS", 4);
        d.hardware_address = Some("00-11-22-33-44-55".to_string());
        let target = registry.add(d).unwrap();
        assert_eq!(
            target.hardware_address().map(|m| m.to_string()),
            Some("00:11:22:33:44:55".to_string())
        );
    }

    #[test]
    fn test_blank_hardware_address_is_treated_as_absent() {
        let mut registry = TargetRegistry::new();
        let mut d = draft("NAS", 4);
        d.hardware_address = Some("  ".to_string());
        assert!(registry.add(d).unwrap().hardware_address().is_none());
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut registry = TargetRegistry::new();
        registry.insert(TargetId::new("x"), draft("A", 1)).unwrap();
        assert_eq!(
            registry.insert(TargetId::new("x"), draft("B", 2)),
            Err(RegistryError::DuplicateId(TargetId::new("x")))
        );
    }

    #[test]
    fn test_update_keeps_id_and_position() {
        // Arrange
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        let b = registry.add(draft("B", 2)).unwrap();

        // Act
        let mut edited = draft("A (renamed)", 5);
        edited.host_address = Some("10.0.0.5".to_string());
        let updated = registry.update(a.id(), edited).unwrap();

        // Assert
        assert_eq!(updated.id(), a.id());
        assert_eq!(registry.all()[0].label(), "A (renamed)");
        assert_eq!(registry.all()[0].port_number().get(), 5);
        assert_eq!(registry.all()[1].id(), b.id());
    }

    #[test]
    fn test_update_may_keep_its_own_port() {
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        assert!(registry.update(a.id(), draft("A2", 1)).is_ok());
    }

    #[test]
    fn test_update_rejects_port_of_another_target() {
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        registry.add(draft("B", 2)).unwrap();
        assert!(matches!(
            registry.update(a.id(), draft("A", 2)),
            Err(RegistryError::DuplicatePort { .. })
        ));
    }

    #[test]
    fn test_update_unknown_target_fails() {
        let mut registry = TargetRegistry::new();
        let id = TargetId::new("ghost");
        assert_eq!(
            registry.update(&id, draft("A", 1)),
            Err(RegistryError::UnknownTarget(id))
        );
    }

    #[test]
    fn test_remove_deletes_target() {
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        let removed = registry.remove(a.id()).unwrap();
        assert_eq!(removed.id(), a.id());
        assert!(registry.get(a.id()).is_none());
    }

    #[test]
    fn test_reorder_applies_permutation() {
        // Arrange
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        let b = registry.add(draft("B", 2)).unwrap();
        let c = registry.add(draft("C", 3)).unwrap();

        // Act
        registry
            .reorder(&[c.id().clone(), a.id().clone(), b.id().clone()])
            .unwrap();

        // Assert
        let labels: Vec<&str> = registry.all().iter().map(Target::label).collect();
        assert_eq!(labels, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_reorder_rejects_missing_or_repeated_ids() {
        let mut registry = TargetRegistry::new();
        let a = registry.add(draft("A", 1)).unwrap();
        registry.add(draft("B", 2)).unwrap();

        assert!(matches!(
            registry.reorder(&[a.id().clone()]),
            Err(RegistryError::ReorderMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(
            registry.reorder(&[a.id().clone(), a.id().clone()]),
            Err(RegistryError::ReorderMismatch { .. })
        ));
        assert_eq!(registry.all()[0].label(), "A");
    }

    #[test]
    fn test_by_port_finds_target() {
        let mut registry = TargetRegistry::new();
        registry.add(draft("A", 7)).unwrap();
        let found = registry.by_port(PortNumber::new(7).unwrap()).unwrap();
        assert_eq!(found.label(), "A");
        assert!(registry.by_port(PortNumber::new(8).unwrap()).is_none());
    }

    #[test]
    fn test_from_drafts_preserves_ids_and_order() {
        let registry = TargetRegistry::from_drafts(vec![
            (TargetId::new("b"), draft("B", 2)),
            (TargetId::new("a"), draft("A", 1)),
        ])
        .unwrap();
        let ids: Vec<&str> = registry.all().iter().map(|t| t.id().as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_from_drafts_rejects_duplicate_ports() {
        let result = TargetRegistry::from_drafts(vec![
            (TargetId::new("a"), draft("A", 1)),
            (TargetId::new("b"), draft("B", 1)),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicatePort { .. })));
    }
}
