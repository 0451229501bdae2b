//! RotateTargetsUseCase: the timed, presence-aware rotation across targets.
//!
//! The [`RotationScheduler`] is a single owned state machine.  It is driven
//! from outside by one-second [`RotationScheduler::tick`] calls and by
//! [`TransportEvent`]s, and it reaches the outside world only through two
//! injected traits: [`SwitchTransport`] (bytes to the KVM switch) and
//! [`PresenceProbe`] (is this host powered on?).
//!
//! # State machine
//!
//! ```text
//!            set_enabled(true)            countdown hits 0
//!   Idle  ──────────────────────►  Armed  ─────────────────►  Switching
//!    ▲   ◄──────────────────────    │  ▲                          │
//!    │    set_enabled(false)        │  └──────────────────────────┘
//!    │    Disconnected / LinkError  │        cycle finished
//!    └──────────────────────────────┘
//! ```
//!
//! `Switching` is only observable while a cycle is in flight: the scheduler
//! publishes it before probing and returns to `Armed` once the command has
//! been sent (or the cycle skipped).
//!
//! # Snapshots
//!
//! Every state change publishes a [`RotationSnapshot`] on a
//! `tokio::sync::watch` channel.  Readers such as the UI bridge subscribe to
//! that channel instead of locking the scheduler, so a slow probe batch never
//! blocks a status query.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvm_switch_core::domain::rotation::IntervalOutOfRange;
use kvm_switch_core::{
    eligible_ports, encode_command, encode_port, select_next_port, PortNumber, Presence,
    PresenceState, RotationConfig, Target, TargetId, ROTATION_POLICY,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Upper bound for a single target's probe, covering the per-port connect
/// timeout plus name resolution.
pub const DEFAULT_PROBE_BUDGET: Duration = Duration::from_millis(1_000);

/// Error reported by a [`SwitchTransport`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No link is open.
    #[error("transport is not connected")]
    NotConnected,
    /// The device could not be opened.
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    /// The write did not complete within the deadline.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    /// The write failed.
    #[error("write failed: {0}")]
    Io(String),
}

/// Link state changes reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// The link broke; the message describes why.
    LinkError(String),
}

/// Trait for delivering command bytes to the KVM switch.
///
/// The infrastructure implementation writes to the serial device; test
/// implementations record calls.
#[async_trait]
pub trait SwitchTransport: Send + Sync {
    /// Delivers `bytes` in order, or fails as a whole.
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Trait for asking whether a host is powered on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    /// Returns `true` if `host` answered the probe.  Never fails.
    async fn is_online(&self, host: &str) -> bool;
}

/// Phase of the rotation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RotationPhase {
    Idle,
    Armed,
    Switching,
}

/// Read-only view of the scheduler, published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationSnapshot {
    pub phase: RotationPhase,
    pub enabled: bool,
    pub active_port: Option<PortNumber>,
    pub countdown_seconds: u32,
    pub interval_seconds: u32,
    pub presence_by_target_id: HashMap<TargetId, Presence>,
    pub last_error: Option<String>,
    pub last_command: Option<String>,
}

/// Error type for the rotate-targets use case.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RotationError {
    /// The serial link is not connected.
    #[error("transport is not connected")]
    TransportUnavailable,
    /// Rotation needs at least two targets.
    #[error("rotation needs at least 2 targets, {configured} configured")]
    NotEnoughTargets { configured: usize },
    #[error(transparent)]
    IntervalOutOfRange(#[from] IntervalOutOfRange),
    /// A manual switch named a port the switch does not have.
    #[error("port {0} does not exist on the switch")]
    UnknownPort(u8),
    /// The transport rejected the switch command.
    #[error("failed to send switch command for port {port}: {source}")]
    TransmitFailure {
        port: PortNumber,
        #[source]
        source: TransportError,
    },
}

/// What a single [`RotationScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The scheduler is not armed.
    Idle,
    /// The countdown was decremented and is still running.
    Counting { remaining: u32 },
    /// A cycle ran and switched to `port`.
    Switched(PortNumber),
    /// A cycle ran but no target was eligible.
    Skipped,
}

/// The rotation state machine.
pub struct RotationScheduler {
    transport: Arc<dyn SwitchTransport>,
    probe: Arc<dyn PresenceProbe>,
    targets: Vec<Target>,
    config: RotationConfig,
    phase: RotationPhase,
    countdown: u32,
    cursor: Option<PortNumber>,
    presence: PresenceState,
    transport_connected: bool,
    last_error: Option<String>,
    last_command: Option<String>,
    probe_budget: Duration,
    snapshot_tx: watch::Sender<RotationSnapshot>,
}

impl RotationScheduler {
    /// Creates an idle scheduler with the transport assumed disconnected.
    ///
    /// `config.enabled` is remembered: the scheduler arms as soon as the
    /// transport reports [`TransportEvent::Connected`] and two or more
    /// targets are configured.
    pub fn new(
        transport: Arc<dyn SwitchTransport>,
        probe: Arc<dyn PresenceProbe>,
        targets: Vec<Target>,
        config: RotationConfig,
    ) -> Self {
        let initial = RotationSnapshot {
            phase: RotationPhase::Idle,
            enabled: config.enabled,
            active_port: None,
            countdown_seconds: 0,
            interval_seconds: config.interval_seconds(),
            presence_by_target_id: HashMap::new(),
            last_error: None,
            last_command: None,
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            transport,
            probe,
            targets,
            config,
            phase: RotationPhase::Idle,
            countdown: 0,
            cursor: None,
            presence: PresenceState::new(),
            transport_connected: false,
            last_error: None,
            last_command: None,
            probe_budget: DEFAULT_PROBE_BUDGET,
            snapshot_tx,
        }
    }

    /// Overrides the per-target probe budget.
    pub fn with_probe_budget(mut self, budget: Duration) -> Self {
        self.probe_budget = budget;
        self
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    pub fn config(&self) -> RotationConfig {
        self.config
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn active_port(&self) -> Option<PortNumber> {
        self.cursor
    }

    pub fn is_transport_connected(&self) -> bool {
        self.transport_connected
    }

    /// Builds a snapshot of the current state.
    pub fn snapshot(&self) -> RotationSnapshot {
        RotationSnapshot {
            phase: self.phase,
            enabled: self.config.enabled,
            active_port: self.cursor,
            countdown_seconds: self.countdown,
            interval_seconds: self.config.interval_seconds(),
            presence_by_target_id: self
                .presence
                .iter()
                .map(|(id, presence)| (id.clone(), *presence))
                .collect(),
            last_error: self.last_error.clone(),
            last_command: self.last_command.clone(),
        }
    }

    /// Returns a receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RotationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Enables or disables the rotation.
    ///
    /// # Errors
    ///
    /// Enabling fails with [`RotationError::TransportUnavailable`] or
    /// [`RotationError::NotEnoughTargets`]; the scheduler stays idle.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), RotationError> {
        if !enabled {
            self.config.enabled = false;
            self.disarm();
            info!("rotation disabled");
            self.publish();
            return Ok(());
        }

        self.check_can_arm()?;
        self.config.enabled = true;
        self.arm();
        self.publish();
        Ok(())
    }

    /// Changes the rotation interval.
    ///
    /// When armed, the countdown restarts at the new interval.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::IntervalOutOfRange`] and leaves the state
    /// unchanged when `seconds` is outside `5..=300`.
    pub fn set_interval(&mut self, seconds: u32) -> Result<(), RotationError> {
        self.config.set_interval(seconds)?;
        if self.phase == RotationPhase::Armed {
            self.countdown = seconds;
        }
        debug!(interval_seconds = seconds, "rotation interval changed");
        self.publish();
        Ok(())
    }

    /// Replaces the configured targets.
    ///
    /// Presence for removed targets is discarded.  An armed rotation drops
    /// to idle if fewer than two targets remain.
    pub fn set_targets(&mut self, targets: Vec<Target>) {
        self.targets = targets;
        self.presence.retain_targets(&self.targets);

        if self.phase != RotationPhase::Idle && self.targets.len() < 2 {
            warn!(
                targets = self.targets.len(),
                "not enough targets left, rotation stopped"
            );
            self.config.enabled = false;
            self.disarm();
        }
        self.publish();
    }

    /// Applies a link state change reported by the transport.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("transport connected");
                self.transport_connected = true;
                self.last_error = None;
                if self.config.enabled && self.phase == RotationPhase::Idle {
                    match self.check_can_arm() {
                        Ok(()) => self.arm(),
                        Err(e) => debug!("rotation stays idle after connect: {e}"),
                    }
                }
            }
            TransportEvent::Disconnected => {
                info!("transport disconnected");
                self.drop_link(None);
            }
            TransportEvent::LinkError(message) => {
                warn!("transport link error: {message}");
                self.drop_link(Some(message));
            }
        }
        self.publish();
    }

    /// Advances the countdown by one second, running a cycle when it expires.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::TransmitFailure`] when the cycle's command
    /// could not be sent.  The countdown is reset either way.
    pub async fn tick(&mut self) -> Result<TickOutcome, RotationError> {
        if self.phase != RotationPhase::Armed {
            return Ok(TickOutcome::Idle);
        }

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            self.publish();
            return Ok(TickOutcome::Counting {
                remaining: self.countdown,
            });
        }

        self.run_cycle().await
    }

    /// Switches to `port` immediately, outside the timed rotation.
    ///
    /// Uses the command of the target configured on that port, or the
    /// default command when no target is configured there.  The countdown
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::UnknownPort`],
    /// [`RotationError::TransportUnavailable`] or
    /// [`RotationError::TransmitFailure`].
    pub async fn switch_to_port(&mut self, port: u8) -> Result<PortNumber, RotationError> {
        let port = PortNumber::new(port).map_err(|e| RotationError::UnknownPort(e.0))?;
        if !self.transport_connected {
            return Err(RotationError::TransportUnavailable);
        }

        let result = self.transmit(port).await.map(|()| port);
        self.publish();
        result
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn check_can_arm(&self) -> Result<(), RotationError> {
        if !self.transport_connected {
            return Err(RotationError::TransportUnavailable);
        }
        if self.targets.len() < 2 {
            return Err(RotationError::NotEnoughTargets {
                configured: self.targets.len(),
            });
        }
        Ok(())
    }

    fn arm(&mut self) {
        if self.phase != RotationPhase::Idle {
            return;
        }
        self.phase = RotationPhase::Armed;
        self.countdown = self.config.interval_seconds();
        info!(
            interval_seconds = self.countdown,
            targets = self.targets.len(),
            "rotation armed"
        );
    }

    fn disarm(&mut self) {
        self.phase = RotationPhase::Idle;
        self.countdown = 0;
    }

    /// The switch position is unknown once the link is gone.
    fn drop_link(&mut self, error: Option<String>) {
        self.transport_connected = false;
        self.config.enabled = false;
        self.cursor = None;
        self.disarm();
        if error.is_some() {
            self.last_error = error;
        }
    }

    async fn run_cycle(&mut self) -> Result<TickOutcome, RotationError> {
        self.phase = RotationPhase::Switching;
        self.publish();

        self.presence = self.refresh_presence().await;
        let eligible = eligible_ports(&self.targets, &self.presence, ROTATION_POLICY);

        let result = match select_next_port(&eligible, self.cursor) {
            None => {
                warn!("no eligible targets, switch skipped");
                Ok(TickOutcome::Skipped)
            }
            Some(port) => self.transmit(port).await.map(|()| TickOutcome::Switched(port)),
        };

        self.phase = RotationPhase::Armed;
        self.countdown = self.config.interval_seconds();
        self.publish();
        result
    }

    /// Probes every target with a host address in parallel and returns a
    /// fresh presence snapshot.
    async fn refresh_presence(&self) -> PresenceState {
        let mut probes = JoinSet::new();
        for target in &self.targets {
            let Some(host) = target.host_address() else {
                continue;
            };
            let probe = Arc::clone(&self.probe);
            let id = target.id().clone();
            let host = host.to_string();
            let budget = self.probe_budget;
            probes.spawn(async move {
                let online = tokio::time::timeout(budget, probe.is_online(&host))
                    .await
                    .unwrap_or(false);
                debug!(target_id = %id, %host, online, "probe finished");
                (id, Presence::from_probe(online))
            });
        }

        let mut fresh = PresenceState::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((id, presence)) => fresh.insert(id, presence),
                Err(e) => warn!("probe task failed: {e}"),
            }
        }

        // A probe task that died without answering counts as offline.
        for target in self.targets.iter().filter(|t| t.is_probeable()) {
            if fresh.get(target.id()).is_none() {
                fresh.insert(target.id().clone(), Presence::Offline);
            }
        }
        fresh
    }

    async fn transmit(&mut self, port: PortNumber) -> Result<(), RotationError> {
        let command = match self.targets.iter().find(|t| t.port_number() == port) {
            Some(target) => encode_command(target),
            None => encode_port(port),
        };

        match self.transport.send(command.as_bytes()).await {
            Ok(()) => {
                info!(%port, %command, "switched");
                self.cursor = Some(port);
                self.last_command = Some(command);
                Ok(())
            }
            Err(source) => {
                warn!(%port, "switch command failed: {source}");
                self.last_error = Some(source.to_string());
                Err(RotationError::TransmitFailure { port, source })
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
