//! Wake-on-LAN transmitter.
//!
//! Each call opens a fresh UDP socket, enables broadcast, and sends the same
//! 102-byte magic packet to the broadcast address on every configured port
//! (7 and 9 by default).  The socket is kept open for a short grace period so
//! the OS can flush the datagrams, then dropped.
//!
//! # Why two ports? (for beginners)
//!
//! The magic packet is recognised by its content, not by its port, so any
//! UDP port reaches the NIC.  Port 9 ("discard") is the de-facto standard and
//! port 7 ("echo") is used by some older tools and routers.  Sending to both
//! costs one extra datagram and covers switches that only forward one of
//! them.
//!
//! # Failure model
//!
//! [`WakeTransmitter::try_wake`] reports the reason for a failure as a
//! [`WakeError`].  [`WakeTransmitter::wake`] collapses every failure into
//! `false` and logs it at `warn`; it never panics.  A hard deadline wraps the
//! whole operation so an unresponsive network stack cannot stall the caller.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use kvm_switch_core::{MacAddress, MagicPacket, MagicPacketError};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Destination ports used when none are configured.
pub const DEFAULT_WAKE_PORTS: [u16; 2] = [7, 9];

/// How long the socket stays open after the last send.
const FLUSH_GRACE: Duration = Duration::from_millis(100);

/// Hard deadline for one wake call.
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between retries of a transient send error.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Error type for Wake-on-LAN operations.
#[derive(Debug, Error)]
pub enum WakeError {
    #[error(transparent)]
    InvalidAddress(#[from] MagicPacketError),
    /// The UDP socket could not be bound.
    #[error("failed to bind wake socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The socket refused the broadcast flag.
    #[error("failed to enable broadcast: {0}")]
    Broadcast(#[source] io::Error),
    /// No datagram could be sent on any port.
    #[error("magic packet could not be sent on any of ports {ports:?}")]
    SendFailed { ports: Vec<u16> },
    #[error("wake did not complete within {0:?}")]
    Timeout(Duration),
}

/// Where and how magic packets are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeConfig {
    pub bind_address: IpAddr,
    pub broadcast_address: IpAddr,
    pub ports: Vec<u16>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            ports: DEFAULT_WAKE_PORTS.to_vec(),
        }
    }
}

/// Outcome of a successful wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeReport {
    pub mac: MacAddress,
    /// Ports the packet was sent to.
    pub sent: Vec<u16>,
    /// Ports whose send failed.
    pub failed: Vec<u16>,
}

/// Sends Wake-on-LAN magic packets.
///
/// Holds no socket between calls, so one transmitter can serve concurrent
/// wake requests.
#[derive(Debug, Clone, Default)]
pub struct WakeTransmitter {
    config: WakeConfig,
}

impl WakeTransmitter {
    pub fn new(config: WakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WakeConfig {
        &self.config
    }

    /// Wakes the machine with hardware address `mac`.
    ///
    /// Returns `true` if the packet was sent on at least one port.
    pub async fn wake(&self, mac: &str) -> bool {
        match self.try_wake(mac).await {
            Ok(report) => {
                info!(mac = %report.mac, ports = ?report.sent, "magic packet sent");
                true
            }
            Err(e) => {
                warn!("wake {mac:?} failed: {e}");
                false
            }
        }
    }

    /// Wakes the machine with hardware address `mac`, reporting why on failure.
    ///
    /// # Errors
    ///
    /// Returns [`WakeError::InvalidAddress`] before any I/O when `mac` is not
    /// a MAC address, and the other [`WakeError`] variants for socket
    /// failures or the 1 s deadline.
    pub async fn try_wake(&self, mac: &str) -> Result<WakeReport, WakeError> {
        let mac = MacAddress::parse(mac)?;
        let packet = mac.magic_packet();

        tokio::time::timeout(WAKE_TIMEOUT, self.transmit(mac, &packet))
            .await
            .map_err(|_| WakeError::Timeout(WAKE_TIMEOUT))?
    }

    async fn transmit(&self, mac: MacAddress, packet: &MagicPacket) -> Result<WakeReport, WakeError> {
        let bind_addr = SocketAddr::new(self.config.bind_address, 0);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| WakeError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        socket.set_broadcast(true).map_err(WakeError::Broadcast)?;

        let mut sent = Vec::new();
        let mut failed = Vec::new();
        for &port in &self.config.ports {
            let dest = SocketAddr::new(self.config.broadcast_address, port);
            match send_with_retry(&socket, packet, dest).await {
                Ok(()) => sent.push(port),
                Err(e) => {
                    debug!("magic packet to {dest} failed: {e}");
                    failed.push(port);
                }
            }
        }

        if sent.is_empty() {
            return Err(WakeError::SendFailed { ports: failed });
        }

        tokio::time::sleep(FLUSH_GRACE).await;
        drop(socket);

        Ok(WakeReport { mac, sent, failed })
    }
}

/// Sends one datagram, retrying transient errors until it succeeds or fails
/// for good.  The caller's deadline bounds the retries.
async fn send_with_retry(socket: &UdpSocket, payload: &[u8], dest: SocketAddr) -> io::Result<()> {
    loop {
        match socket.send_to(payload, dest).await {
            Ok(_) => return Ok(()),
            Err(e) if is_transient_error(&e) => {
                debug!("transient send error to {dest}: {e}");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Returns `true` for errors worth retrying.
fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
