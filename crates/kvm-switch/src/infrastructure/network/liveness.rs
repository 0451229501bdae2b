//! TCP-connect liveness probe.
//!
//! A host counts as online when any of a few well-known service ports
//! accepts a TCP connection:
//!
//! | Port | Service                      |
//! |------|------------------------------|
//! | 3389 | Remote desktop               |
//! | 22   | SSH                          |
//! | 80   | HTTP                         |
//! | 445  | SMB file sharing             |
//!
//! Name resolution is bounded by the connect timeout; a resolver that does
//! not answer in time leaves only a literal IP address usable.  Every resolved
//! address is tried on every candidate port, IPv4 first, concurrently and each
//! with its own connect timeout.  The first successful connection wins and
//! the remaining attempts are aborted.  Every network error (refused,
//! unreachable, timed out, unresolvable) is absorbed into `false` and logged
//! at `debug`.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

use crate::application::rotate_targets::PresenceProbe;

/// Ports probed when none are configured.
pub const DEFAULT_PROBE_PORTS: [u16; 4] = [3389, 22, 80, 445];

/// Connect timeout per attempt when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Which ports to try and how long to wait for each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    pub ports: Vec<u16>,
    pub connect_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PROBE_PORTS.to_vec(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Probes hosts by attempting TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpLivenessProbe {
    config: LivenessConfig,
}

impl TcpLivenessProbe {
    pub fn new(config: LivenessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// Returns `true` if any candidate port on `host` accepts a connection.
    ///
    /// A blank `host` returns `false` without touching the network.
    pub async fn is_online(&self, host: &str) -> bool {
        let host = host.trim();
        if host.is_empty() {
            return false;
        }

        let ips = resolve(host, self.config.connect_timeout).await;
        if ips.is_empty() {
            debug!(host, "could not resolve host");
            return false;
        }

        let mut attempts = JoinSet::new();
        for addr in ips
            .iter()
            .flat_map(|&ip| self.config.ports.iter().map(move |&port| SocketAddr::new(ip, port)))
        {
            let connect_timeout = self.config.connect_timeout;
            attempts.spawn(async move {
                match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_stream)) => true,
                    Ok(Err(e)) => {
                        debug!("connect to {addr} failed: {e}");
                        false
                    }
                    Err(_) => {
                        debug!("connect to {addr} timed out");
                        false
                    }
                }
            });
        }

        while let Some(joined) = attempts.join_next().await {
            if let Ok(true) = joined {
                debug!(host, "host is online");
                // Dropping the set aborts the attempts still in flight.
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl PresenceProbe for TcpLivenessProbe {
    async fn is_online(&self, host: &str) -> bool {
        TcpLivenessProbe::is_online(self, host).await
    }
}

/// Resolves `host` within `deadline`, falling back to a literal IP.
async fn resolve(host: &str, deadline: Duration) -> Vec<IpAddr> {
    resolve_with(host, deadline, tokio::net::lookup_host((host, 0))).await
}

/// Runs `lookup` under `deadline` and returns the distinct addresses it
/// yields, IPv4 before IPv6.
async fn resolve_with<I>(
    host: &str,
    deadline: Duration,
    lookup: impl Future<Output = io::Result<I>>,
) -> Vec<IpAddr>
where
    I: Iterator<Item = SocketAddr>,
{
    let mut ips: Vec<IpAddr> = Vec::new();
    match tokio::time::timeout(deadline, lookup).await {
        Ok(Ok(addrs)) => {
            for ip in addrs.map(|a| a.ip()) {
                if !ips.contains(&ip) {
                    ips.push(ip);
                }
            }
        }
        Ok(Err(e)) => debug!(host, "name resolution failed: {e}"),
        Err(_) => debug!(host, "name resolution timed out"),
    }

    if ips.is_empty() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            ips.push(ip);
        }
    }
    ips.sort_by_key(IpAddr::is_ipv6);
    ips
}

// ── Tests ─────────────────────────────────────────────────────────────────────
