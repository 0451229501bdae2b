//! Wake-on-LAN magic packet codec.
//!
//! Wire format:
//! ```text
//! [0xFF x 6][MAC x 16]
//! ```
//! Total size: 102 bytes.  The MAC is the 6 raw octets of the target NIC.
//!
//! # What is a magic packet? (for beginners)
//!
//! A network card with Wake-on-LAN enabled keeps listening while the machine
//! is asleep or powered off.  It ignores everything except a frame that
//! contains a *synchronisation stream* of six `0xFF` bytes followed by its own
//! MAC address repeated sixteen times.  When such a frame arrives, the card
//! signals the motherboard to power on.  The payload is usually carried in a
//! UDP broadcast datagram so it reaches the card without any IP configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Length of the synchronisation stream at the start of the packet.
pub const SYNC_STREAM_LEN: usize = 6;

/// How many times the MAC is repeated after the synchronisation stream.
pub const MAC_REPETITIONS: usize = 16;

/// Number of octets in an IEEE 802 MAC address.
pub const MAC_LEN: usize = 6;

/// Total magic packet size in bytes.
pub const MAGIC_PACKET_LEN: usize = SYNC_STREAM_LEN + MAC_LEN * MAC_REPETITIONS;

/// A fully encoded magic packet.
pub type MagicPacket = [u8; MAGIC_PACKET_LEN];

/// Errors that can occur while parsing a MAC address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MagicPacketError {
    /// The input is not a 12-hex-digit MAC address.
    #[error("invalid MAC address {0:?}: expected 12 hexadecimal digits")]
    InvalidAddress(String),
}

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    /// Wraps raw octets.
    pub const fn new(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets.
    pub const fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    /// Parses a MAC address leniently.
    ///
    /// All `:` and `-` characters are removed; what remains must be exactly
    /// 12 hexadecimal digits (either case).  `aa:bb-ccddee:ff` is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MagicPacketError::InvalidAddress`] for any other shape.
    pub fn parse(input: &str) -> Result<Self, MagicPacketError> {
        let digits: String = input.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != MAC_LEN * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MagicPacketError::InvalidAddress(input.to_string()));
        }
        Self::from_hex_digits(&digits).ok_or_else(|| MagicPacketError::InvalidAddress(input.to_string()))
    }

    /// Parses a MAC address in canonical notation only.
    ///
    /// Accepts six two-digit hex pairs joined by a single, consistent
    /// separator (`:` or `-`), e.g. `AA:BB:CC:DD:EE:FF` or `aa-bb-cc-dd-ee-ff`.
    /// This is the form accepted when targets are configured.
    ///
    /// # Errors
    ///
    /// Returns [`MagicPacketError::InvalidAddress`] for any other shape.
    pub fn parse_strict(input: &str) -> Result<Self, MagicPacketError> {
        let invalid = || MagicPacketError::InvalidAddress(input.to_string());

        let separator = match (input.contains(':'), input.contains('-')) {
            (true, false) => ':',
            (false, true) => '-',
            _ => return Err(invalid()),
        };

        let pairs: Vec<&str> = input.split(separator).collect();
        if pairs.len() != MAC_LEN
            || pairs
                .iter()
                .any(|p| p.len() != 2 || !p.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        Self::from_hex_digits(&pairs.concat()).ok_or_else(invalid)
    }

    /// Encodes the magic packet for this address.
    pub fn magic_packet(&self) -> MagicPacket {
        let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
        for chunk in packet[SYNC_STREAM_LEN..].chunks_exact_mut(MAC_LEN) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }

    /// Converts 12 ASCII hex digits into octets.
    fn from_hex_digits(digits: &str) -> Option<Self> {
        let mut octets = [0u8; MAC_LEN];
        for (i, octet) in octets.iter_mut().enumerate() {
            let pair = digits.get(i * 2..i * 2 + 2)?;
            *octet = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(octets))
    }
}

impl FromStr for MacAddress {
    type Err = MagicPacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Encodes the magic packet for a MAC address string.
///
/// # Errors
///
/// Returns [`MagicPacketError::InvalidAddress`] if `mac` is not 12 hex
/// digits once `:`/`-` separators are removed.
///
/// # Examples
///
/// ```rust
/// use kvm_switch_core::protocol::encode_magic_packet;
///
/// let packet = encode_magic_packet("01:23:45:67:89:AB").unwrap();
/// assert_eq!(packet.len(), 102);
/// assert_eq!(&packet[..6], &[0xFF; 6]);
/// assert_eq!(&packet[6..12], &[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
/// ```
pub fn encode_magic_packet(mac: &str) -> Result<MagicPacket, MagicPacketError> {
    Ok(MacAddress::parse(mac)?.magic_packet())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
