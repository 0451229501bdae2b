//! Command bridge: exposes application-layer operations to a UI front-end.
//!
//! Every command is a free `async fn` taking the shared [`AppState`] and
//! returning a [`CommandResult`].  A desktop shell (or the CLI in `main.rs`)
//! calls these functions; the Application and Domain layers never import
//! this module.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Domain types such as [`Target`] keep their fields private and validated.
//! DTOs are plain `Serialize`/`Deserialize` structs that a front-end can
//! build and read as JSON:
//!
//! - [`TargetDto`]: one configured target plus its last known presence.
//! - [`NewTargetDto`]: the editable fields of a target, as typed by the user.
//! - [`ConnectionConfigDto`]: the serial link parameters.
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`, so every
//! response has the same shape: `{ success: bool, data: T | null, error:
//! string | null }`.  The front-end can always read `result.success` without
//! a try/catch around the call.
//!
//! # Persistence
//!
//! Commands that change targets or rotation settings write the whole config
//! back through the [`TomlConfigStore`] before returning.  Locks are always
//! taken in the order registry, scheduler, config.

use std::sync::Arc;

use kvm_switch_core::{Presence, Target, TargetId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::application::{
    manage_targets::{RegistryError, TargetDraft, TargetRegistry},
    rotate_targets::{PresenceProbe, RotationScheduler, RotationSnapshot, SwitchTransport},
};
use crate::infrastructure::{
    network::{liveness::TcpLivenessProbe, wake::WakeTransmitter},
    storage::config::{AppConfig, ConfigError, TargetEntry, TomlConfigStore},
};

// ── Shared application state ──────────────────────────────────────────────────

/// Error raised while assembling [`AppState`] from a loaded config.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid target in configuration: {0}")]
    Registry(#[from] RegistryError),
}

/// State shared by every command.
///
/// The scheduler sits behind its own `Arc` so the rotation loop can hold it
/// too.  Snapshot reads go through a watch receiver and never wait on a
/// running cycle.
pub struct AppState {
    pub scheduler: Arc<Mutex<RotationScheduler>>,
    pub registry: Mutex<TargetRegistry>,
    pub config: Mutex<AppConfig>,
    store: TomlConfigStore,
    wake: WakeTransmitter,
    probe: Arc<dyn PresenceProbe>,
    snapshots: watch::Receiver<RotationSnapshot>,
}

impl AppState {
    /// Builds the state with a TCP liveness probe configured from `[probe]`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if a persisted target or the wake addresses
    /// are invalid.
    pub fn new(
        config: AppConfig,
        store: TomlConfigStore,
        transport: Arc<dyn SwitchTransport>,
    ) -> Result<Arc<Self>, StateError> {
        let probe = Arc::new(TcpLivenessProbe::new(config.probe.to_liveness_config()));
        Self::with_probe(config, store, transport, probe)
    }

    /// Builds the state around an explicit presence probe.
    ///
    /// # Errors
    ///
    /// See [`AppState::new`].
    pub fn with_probe(
        config: AppConfig,
        store: TomlConfigStore,
        transport: Arc<dyn SwitchTransport>,
        probe: Arc<dyn PresenceProbe>,
    ) -> Result<Arc<Self>, StateError> {
        let registry = TargetRegistry::from_drafts(config.targets.iter().map(TargetEntry::to_draft))?;
        let wake = WakeTransmitter::new(config.wake.to_wake_config()?);

        let scheduler = RotationScheduler::new(
            transport,
            Arc::clone(&probe),
            registry.all().to_vec(),
            config.rotation.to_rotation_config(),
        );
        let snapshots = scheduler.subscribe();

        Ok(Arc::new(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            registry: Mutex::new(registry),
            config: Mutex::new(config),
            store,
            wake,
            probe,
            snapshots,
        }))
    }

    /// Returns the most recently published rotation snapshot.
    pub fn snapshot(&self) -> RotationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Pushes the registry to the scheduler and persists targets and
    /// rotation settings.
    async fn commit_targets(&self, registry: &TargetRegistry) -> Result<(), String> {
        let rotation = {
            let mut scheduler = self.scheduler.lock().await;
            scheduler.set_targets(registry.all().to_vec());
            scheduler.config()
        };

        let mut cfg = self.config.lock().await;
        cfg.targets = registry.all().iter().map(TargetEntry::from).collect();
        cfg.rotation = rotation.into();
        self.save(&cfg)
    }

    /// Persists the scheduler's current rotation settings.
    async fn commit_rotation(&self) -> Result<(), String> {
        let rotation = self.scheduler.lock().await.config();
        let mut cfg = self.config.lock().await;
        cfg.rotation = rotation.into();
        self.save(&cfg)
    }

    fn save(&self, cfg: &AppConfig) -> Result<(), String> {
        self.store.save(cfg).map_err(|e| {
            warn!("failed to save config: {e}");
            format!("failed to save config: {e}")
        })
    }
}

// ── Data Transfer Objects (Presentation layer) ────────────────────────────────

/// One configured target as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDto {
    pub id: String,
    pub label: String,
    pub port_number: u8,
    pub host_address: Option<String>,
    pub hardware_address: Option<String>,
    pub command_override: Option<String>,
    /// `"Online"`, `"Offline"` or `"Unknown"`.
    pub presence: String,
}

impl TargetDto {
    fn new(target: &Target, presence: Presence) -> Self {
        Self {
            id: target.id().to_string(),
            label: target.label().to_string(),
            port_number: target.port_number().get(),
            host_address: target.host_address().map(str::to_string),
            hardware_address: target.hardware_address().map(|m| m.to_string()),
            command_override: target.command_override().map(str::to_string),
            presence: format!("{presence:?}"),
        }
    }
}

/// Editable target fields submitted by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTargetDto {
    pub label: String,
    pub port_number: u8,
    #[serde(default)]
    pub host_address: Option<String>,
    #[serde(default)]
    pub hardware_address: Option<String>,
    #[serde(default)]
    pub command_override: Option<String>,
}

impl From<NewTargetDto> for TargetDraft {
    fn from(dto: NewTargetDto) -> Self {
        Self {
            label: dto.label,
            port_number: dto.port_number,
            host_address: dto.host_address,
            hardware_address: dto.hardware_address,
            command_override: dto.command_override,
        }
    }
}

/// Serial link parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfigDto {
    pub port_path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String,
    pub stop_bits: u8,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T: Serialize> From<Result<T, String>> for CommandResult<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(msg) => Self::err(msg),
        }
    }
}

// ── Wake and status ───────────────────────────────────────────────────────────

/// Sends a Wake-on-LAN magic packet to `mac`.
///
/// The data is `true` if the packet left on at least one port.  An invalid
/// address yields `false`, not an error.
pub async fn wake(state: Arc<AppState>, mac: String) -> CommandResult<bool> {
    CommandResult::ok(state.wake.wake(&mac).await)
}

/// Probes `host` once.
pub async fn check_status(state: Arc<AppState>, host: String) -> CommandResult<bool> {
    CommandResult::ok(state.probe.is_online(&host).await)
}

// ── Rotation ──────────────────────────────────────────────────────────────────

/// Enables or disables the timed rotation and persists the choice.
pub async fn set_rotation_enabled(state: Arc<AppState>, enabled: bool) -> CommandResult<()> {
    if let Err(e) = state.scheduler.lock().await.set_enabled(enabled) {
        return CommandResult::err(e.to_string());
    }
    state.commit_rotation().await.into()
}

/// Changes the rotation interval and persists it.
pub async fn set_rotation_interval(state: Arc<AppState>, seconds: u32) -> CommandResult<()> {
    if let Err(e) = state.scheduler.lock().await.set_interval(seconds) {
        return CommandResult::err(e.to_string());
    }
    state.commit_rotation().await.into()
}

/// Returns the latest rotation snapshot without waiting on a running cycle.
///
/// # Example (frontend)
/// ```ts
/// const snap = await invoke<RotationSnapshot>('get_rotation_snapshot');
/// ```
pub async fn get_rotation_snapshot(state: Arc<AppState>) -> CommandResult<RotationSnapshot> {
    CommandResult::ok(state.snapshot())
}

/// Switches the KVM to `port` immediately.  Returns the port switched to.
pub async fn switch_to_port(state: Arc<AppState>, port: u8) -> CommandResult<u8> {
    match state.scheduler.lock().await.switch_to_port(port).await {
        Ok(port) => CommandResult::ok(port.get()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

// ── Targets ───────────────────────────────────────────────────────────────────

/// Returns every configured target in display order.
pub async fn list_targets(state: Arc<AppState>) -> CommandResult<Vec<TargetDto>> {
    let snapshot = state.snapshot();
    let registry = state.registry.lock().await;
    let dtos = registry
        .all()
        .iter()
        .map(|t| {
            let presence = snapshot
                .presence_by_target_id
                .get(t.id())
                .copied()
                .unwrap_or(Presence::Unknown);
            TargetDto::new(t, presence)
        })
        .collect();
    CommandResult::ok(dtos)
}

/// Adds a target and persists the list.
pub async fn add_target(state: Arc<AppState>, target: NewTargetDto) -> CommandResult<TargetDto> {
    let mut registry = state.registry.lock().await;
    let added = match registry.add(target.into()) {
        Ok(t) => t,
        Err(e) => return CommandResult::err(e.to_string()),
    };
    info!(id = %added.id(), port = %added.port_number(), "target added");

    state
        .commit_targets(&registry)
        .await
        .map(|()| TargetDto::new(&added, Presence::Unknown))
        .into()
}

/// Replaces the editable fields of target `id` and persists the list.
pub async fn update_target(
    state: Arc<AppState>,
    id: String,
    target: NewTargetDto,
) -> CommandResult<TargetDto> {
    let mut registry = state.registry.lock().await;
    let updated = match registry.update(&TargetId::new(id), target.into()) {
        Ok(t) => t,
        Err(e) => return CommandResult::err(e.to_string()),
    };

    state
        .commit_targets(&registry)
        .await
        .map(|()| TargetDto::new(&updated, Presence::Unknown))
        .into()
}

/// Removes target `id` and persists the list.
pub async fn remove_target(state: Arc<AppState>, id: String) -> CommandResult<()> {
    let mut registry = state.registry.lock().await;
    if let Err(e) = registry.remove(&TargetId::new(id)) {
        return CommandResult::err(e.to_string());
    }
    state.commit_targets(&registry).await.into()
}

/// Reorders the targets to match `ids` and persists the list.
pub async fn reorder_targets(state: Arc<AppState>, ids: Vec<String>) -> CommandResult<()> {
    let ids: Vec<TargetId> = ids.into_iter().map(TargetId::new).collect();
    let mut registry = state.registry.lock().await;
    if let Err(e) = registry.reorder(&ids) {
        return CommandResult::err(e.to_string());
    }
    state.commit_targets(&registry).await.into()
}

/// Returns the serial link parameters.
pub async fn get_connection_config(state: Arc<AppState>) -> CommandResult<ConnectionConfigDto> {
    let cfg = state.config.lock().await;
    let conn = &cfg.connection;
    CommandResult::ok(ConnectionConfigDto {
        port_path: conn.port_path.clone(),
        baud_rate: conn.baud_rate,
        data_bits: conn.data_bits,
        parity: conn.parity.clone(),
        stop_bits: conn.stop_bits,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
