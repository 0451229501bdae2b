//! Serial command codec for the KVM switch firmware.
//!
//! Wire format (ASCII, no terminator):
//! ```text
//! X<code>,1$
//! ```
//! `<code>` is the decimal digit of the port for ports 1–9 and the letter `A`
//! for port 10.  The trailing `,1$` is constant.  The format is a fixed
//! property of the switch firmware; the only escape hatch is a per-target
//! command override, which is sent verbatim.

use thiserror::Error;

use crate::domain::target::{PortNumber, Target};

/// First byte of every port-select command.
pub const COMMAND_PREFIX: char = 'X';

/// Constant tail of every port-select command.
pub const COMMAND_SUFFIX: &str = ",1$";

/// Code used for every port above 9.
const HIGH_PORT_CODE: char = 'A';

/// Errors produced by the firmware-side command parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandParseError {
    /// The command does not start with `X`.
    #[error("command does not start with '{COMMAND_PREFIX}': {0:?}")]
    MissingPrefix(String),
    /// The command does not end with `,1$`.
    #[error("command does not end with '{COMMAND_SUFFIX}': {0:?}")]
    MissingSuffix(String),
    /// The port code between prefix and suffix is not recognised.
    #[error("unknown port code {0:?}")]
    UnknownCode(String),
}

/// Returns the single-character firmware code for `port`.
pub fn port_code(port: PortNumber) -> char {
    match port.get() {
        n @ 1..=9 => char::from(b'0' + n),
        _ => HIGH_PORT_CODE,
    }
}

/// Encodes the default port-select command for `port`.
///
/// # Examples
///
/// ```rust
/// use kvm_switch_core::{encode_port, PortNumber};
///
/// assert_eq!(encode_port(PortNumber::new(1).unwrap()), "X1,1$");
/// assert_eq!(encode_port(PortNumber::new(10).unwrap()), "XA,1$");
/// ```
pub fn encode_port(port: PortNumber) -> String {
    format!("{COMMAND_PREFIX}{}{COMMAND_SUFFIX}", port_code(port))
}

/// Encodes the command that selects `target`.
///
/// A configured command override wins over the default encoding.
pub fn encode_command(target: &Target) -> String {
    match target.command_override() {
        Some(command) => command.to_string(),
        None => encode_port(target.port_number()),
    }
}

/// Parses a port-select command the way the switch firmware does.
///
/// # Errors
///
/// Returns a [`CommandParseError`] when the framing or the port code is not
/// recognised.
pub fn parse_command(command: &str) -> Result<PortNumber, CommandParseError> {
    let body = command
        .strip_prefix(COMMAND_PREFIX)
        .ok_or_else(|| CommandParseError::MissingPrefix(command.to_string()))?;
    let code = body
        .strip_suffix(COMMAND_SUFFIX)
        .ok_or_else(|| CommandParseError::MissingSuffix(command.to_string()))?;

    let mut chars = code.chars();
    let port = match (chars.next(), chars.next()) {
        (Some(c @ '1'..='9'), None) => c as u8 - b'0',
        (Some(HIGH_PORT_CODE), None) => PortNumber::MAX,
        _ => return Err(CommandParseError::UnknownCode(code.to_string())),
    };

    PortNumber::new(port).map_err(|_| CommandParseError::UnknownCode(code.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
