//! Serial device transport.
//!
//! The KVM switch is attached through a serial port that the OS exposes as a
//! device node.  This adapter opens that node for writing and pushes command
//! bytes through it.  Line settings (baud rate, parity, ...) are expected to
//! be configured at the OS level (`stty`, Device Manager); the values from the
//! config file are logged on connect so a mismatch is easy to spot.
//!
//! Link state changes are reported as [`TransportEvent`]s on an mpsc channel.
//! A failed or timed-out write is only an error for that one command; the
//! device stays open and the next command is tried normally.  The link counts
//! as lost only when a write fails and the device node is gone (adapter
//! unplugged), in which case the device is closed and `LinkError` emitted.
//!
//! Events are sent with `try_send`: the rotation loop may be busy inside a
//! cycle that is itself waiting on this transport, so blocking here could
//! deadlock.  A full channel drops the event with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use super::EVENT_CHANNEL_CAPACITY;
use crate::application::rotate_targets::{SwitchTransport, TransportError, TransportEvent};
use crate::infrastructure::storage::config::ConnectionConfig;

/// Deadline for writing and flushing one command.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport that writes to a serial device node.
pub struct DeviceTransport {
    settings: ConnectionConfig,
    device: Mutex<Option<File>>,
    events: mpsc::Sender<TransportEvent>,
    write_timeout: Duration,
}

impl DeviceTransport {
    /// Creates a disconnected transport and the receiver for its events.
    pub fn new(settings: ConnectionConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Self {
            settings,
            device: Mutex::new(None),
            events: tx,
            write_timeout: WRITE_TIMEOUT,
        };
        (transport, rx)
    }

    /// Overrides the write deadline.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.settings.port_path)
    }

    pub async fn is_connected(&self) -> bool {
        self.device.lock().await.is_some()
    }

    /// Opens the device and emits [`TransportEvent::Connected`].
    ///
    /// Connecting while already connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] if the device cannot be opened.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut device = self.device.lock().await;
        if device.is_some() {
            return Ok(());
        }

        let path = PathBuf::from(&self.settings.port_path);
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| TransportError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            port = %path.display(),
            baud_rate = self.settings.baud_rate,
            data_bits = self.settings.data_bits,
            parity = %self.settings.parity,
            stop_bits = self.settings.stop_bits,
            "serial device opened"
        );
        *device = Some(file);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    /// Closes the device and emits [`TransportEvent::Disconnected`].
    pub async fn disconnect(&self) {
        if self.device.lock().await.take().is_some() {
            info!(port = %self.settings.port_path, "serial device closed");
            self.emit(TransportEvent::Disconnected);
        }
    }

    fn emit(&self, event: TransportEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("transport event dropped: {e}");
        }
    }

    async fn device_node_gone(&self) -> bool {
        !matches!(tokio::fs::try_exists(self.path()).await, Ok(true))
    }
}

#[async_trait]
impl SwitchTransport for DeviceTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut device = self.device.lock().await;
        let file = device.as_mut().ok_or(TransportError::NotConnected)?;

        let write = async {
            file.write_all(bytes).await?;
            file.flush().await
        };

        let result = tokio::time::timeout(self.write_timeout, write).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                if self.device_node_gone().await {
                    warn!(port = %self.settings.port_path, "serial device removed: {e}");
                    *device = None;
                    self.emit(TransportEvent::LinkError(e.to_string()));
                }
                Err(TransportError::Io(e.to_string()))
            }
            Err(_) => {
                warn!(port = %self.settings.port_path, "write timed out");
                Err(TransportError::Timeout(self.write_timeout))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// A regular file stands in for the device node.
    fn fake_device() -> (ConnectionConfig, PathBuf) {
        let path = std::env::temp_dir().join(format!("kvm_switch_tty_{}", Uuid::new_v4()));
        std::fs::write(&path, b"").unwrap();
        let settings = ConnectionConfig {
            port_path: path.display().to_string(),
            ..ConnectionConfig::default()
        };
        (settings, path)
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let (settings, path) = fake_device();
        let (transport, _rx) = DeviceTransport::new(settings);

        assert_eq!(transport.send(b"X1,1$").await, Err(TransportError::NotConnected));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_connect_emits_connected_event() {
        // Arrange
        let (settings, path) = fake_device();
        let (transport, mut rx) = DeviceTransport::new(settings);

        // Act
        transport.connect().await.unwrap();

        // Assert
        assert!(transport.is_connected().await);
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Connected);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_connect_to_missing_device_fails_without_event() {
        let settings = ConnectionConfig {
            port_path: "/nonexistent/kvm-switch/ttyUSB9".to_string(),
            ..ConnectionConfig::default()
        };
        let (transport, mut rx) = DeviceTransport::new(settings);

        let result = transport.connect().await;

        assert!(matches!(result, Err(TransportError::Open { .. })));
        assert!(rx.try_recv().is_err());
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_writes_command_bytes_in_order() {
        // Arrange
        let (settings, path) = fake_device();
        let (transport, _rx) = DeviceTransport::new(settings);
        transport.connect().await.unwrap();

        // Act
        transport.send(b"X1,1$").await.unwrap();
        transport.send(b"XA,1$").await.unwrap();

        // Assert
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "X1,1$XA,1$");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_disconnect_emits_event_once() {
        let (settings, path) = fake_device();
        let (transport, mut rx) = DeviceTransport::new(settings);
        transport.connect().await.unwrap();
        let _ = rx.try_recv();

        transport.disconnect().await;
        transport.disconnect().await;

        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Disconnected);
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.send(b"X1,1$").await, Err(TransportError::NotConnected));

        std::fs::remove_file(&path).ok();
    }

    #[cfg(target_os = "linux")]
    fn full_device() -> ConnectionConfig {
        ConnectionConfig {
            port_path: "/dev/full".to_string(),
            ..ConnectionConfig::default()
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_write_keeps_device_open_without_link_event() {
        // Arrange: every write to /dev/full fails with ENOSPC.
        let (transport, mut rx) = DeviceTransport::new(full_device());
        transport.connect().await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Connected);

        // Act
        let first = transport.send(b"X1,1$").await;
        let second = transport.send(b"X2,1$").await;

        // Assert
        assert!(matches!(first, Err(TransportError::Io(_))));
        assert!(matches!(second, Err(TransportError::Io(_))));
        assert!(transport.is_connected().await);
        assert!(rx.try_recv().is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_write_leaves_rotation_armed_for_next_cycle() {
        use crate::application::rotate_targets::{
            PresenceProbe, RotationError, RotationPhase, RotationScheduler,
        };
        use crate::infrastructure::transport::mock::StaticPresenceProbe;
        use kvm_switch_core::{PortNumber, RotationConfig, Target, TargetId};
        use std::sync::Arc;

        // Arrange
        let (transport, mut rx) = DeviceTransport::new(full_device());
        let transport = Arc::new(transport);
        let mut scheduler = RotationScheduler::new(
            Arc::clone(&transport) as Arc<dyn SwitchTransport>,
            Arc::new(StaticPresenceProbe::new()) as Arc<dyn PresenceProbe>,
            vec![
                Target::new(TargetId::new("a"), "A", PortNumber::new(1).unwrap()),
                Target::new(TargetId::new("b"), "B", PortNumber::new(2).unwrap()),
            ],
            RotationConfig::new(true, 5).unwrap(),
        );
        transport.connect().await.unwrap();
        while let Ok(event) = rx.try_recv() {
            scheduler.handle_event(event);
        }
        assert_eq!(scheduler.phase(), RotationPhase::Armed);

        // Act
        let mut last = None;
        for _ in 0..5 {
            last = Some(scheduler.tick().await);
        }
        while let Ok(event) = rx.try_recv() {
            scheduler.handle_event(event);
        }

        // Assert
        assert!(matches!(last, Some(Err(RotationError::TransmitFailure { .. }))));
        assert_eq!(scheduler.phase(), RotationPhase::Armed);
        assert!(scheduler.config().enabled);
        assert!(scheduler.is_transport_connected());
        assert_eq!(scheduler.snapshot().countdown_seconds, 5);
    }
}
