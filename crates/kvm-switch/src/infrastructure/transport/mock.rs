//! In-memory doubles for the switch transport and the presence probe.
//!
//! Used by the integration tests and by the `--dry-run` mode of the binary,
//! where no serial device is attached.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::rotate_targets::{PresenceProbe, SwitchTransport, TransportError};

/// A [`SwitchTransport`] that records every command instead of sending it.
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    /// Makes subsequent sends fail with [`TransportError::Io`].
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("lock poisoned") = failing;
    }

    /// Commands sent so far, oldest first.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("lock poisoned").len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwitchTransport for MockTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if *self.failing.lock().expect("lock poisoned") {
            return Err(TransportError::Io("simulated write failure".to_string()));
        }
        self.sent
            .lock()
            .expect("lock poisoned")
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }
}

/// A [`PresenceProbe`] answering from a fixed set of online hosts.
pub struct StaticPresenceProbe {
    online: Mutex<HashSet<String>>,
    probed: Mutex<Vec<String>>,
}

impl StaticPresenceProbe {
    pub fn new() -> Self {
        Self {
            online: Mutex::new(HashSet::new()),
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a probe that reports each of `hosts` as online.
    pub fn with_online<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Self {
        let probe = Self::new();
        for host in hosts {
            probe.set_online(host, true);
        }
        probe
    }

    pub fn set_online(&self, host: &str, online: bool) {
        let mut set = self.online.lock().expect("lock poisoned");
        if online {
            set.insert(host.to_string());
        } else {
            set.remove(host);
        }
    }

    /// Hosts probed so far, in call order.
    pub fn probed_hosts(&self) -> Vec<String> {
        self.probed.lock().expect("lock poisoned").clone()
    }
}

impl Default for StaticPresenceProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceProbe for StaticPresenceProbe {
    async fn is_online(&self, host: &str) -> bool {
        self.probed
            .lock()
            .expect("lock poisoned")
            .push(host.to_string());
        self.online.lock().expect("lock poisoned").contains(host)
    }
}
