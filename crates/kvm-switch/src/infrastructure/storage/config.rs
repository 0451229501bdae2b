//! TOML-based configuration persistence for the switch orchestrator.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KvmSwitch\config.toml`
//! - Linux:    `~/.config/kvmswitch/config.toml`
//! - macOS:    `~/Library/Application Support/KvmSwitch/config.toml`
//!
//! A different file can be used by constructing [`TomlConfigStore::new`]
//! with an explicit path (the CLI's `--config` flag does this).
//!
//! # What is TOML? (for beginners)
//!
//! TOML (Tom's Obvious Minimal Language) is a configuration file format designed
//! to be easy to read and write.  It looks similar to INI files but with more
//! data types.  Example:
//!
//! ```toml
//! [connection]
//! port_path = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [rotation]
//! enabled = true
//! interval_seconds = 30
//!
//! [[targets]]
//! id = "0b6f..."
//! label = "Build server"
//! port_number = 2
//! host_address = "10.0.0.12"
//! hardware_address = "00:1A:2B:3C:4D:5E"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  This allows
//! the app to work correctly on first run (before a config file exists) and
//! when upgrading from an older config file that is missing newer fields.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kvm_switch_core::domain::rotation::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use kvm_switch_core::{RotationConfig, Target, TargetId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::application::manage_targets::TargetDraft;
use crate::infrastructure::network::liveness::{LivenessConfig, DEFAULT_PROBE_PORTS};
use crate::infrastructure::network::wake::{WakeConfig, DEFAULT_WAKE_PORTS};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address in the `[wake]` section is not an IP address.
    #[error("invalid {field} {value:?} in [wake]")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub rotation: RotationSection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub wake: WakeSection,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

/// General application behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSection {
    /// Schema version string – bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether `run` opens the serial device at startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

/// Serial link parameters.
///
/// Only `port_path` is used to open the device; the line settings are
/// carried for the transport and expected to be applied at the OS level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_port_path")]
    pub port_path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// `"none"`, `"even"` or `"odd"`.
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

/// Persisted rotation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u32,
}

/// Liveness probe settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSection {
    #[serde(default = "default_probe_ports")]
    pub ports: Vec<u16>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Wake-on-LAN settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WakeSection {
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_wake_ports")]
    pub ports: Vec<u16>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Persisted record of a configured target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetEntry {
    pub id: String,
    pub label: String,
    pub port_number: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_override: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_port_path() -> String {
    if cfg!(target_os = "windows") {
        "COM1".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_stop_bits() -> u8 {
    1
}
fn default_interval_seconds() -> u32 {
    RotationConfig::default().interval_seconds()
}
fn default_probe_ports() -> Vec<u16> {
    DEFAULT_PROBE_PORTS.to_vec()
}
fn default_connect_timeout_ms() -> u64 {
    500
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_wake_ports() -> Vec<u16> {
    DEFAULT_WAKE_PORTS.to_vec()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            auto_connect: default_true(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_path: default_port_path(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_interval_seconds(),
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            ports: default_probe_ports(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for WakeSection {
    fn default() -> Self {
        Self {
            broadcast_address: default_broadcast_address(),
            ports: default_wake_ports(),
            bind_address: default_bind_address(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl RotationSection {
    /// Converts to the domain type, clamping the interval into range.
    pub fn to_rotation_config(self) -> RotationConfig {
        RotationConfig::clamped(self.enabled, self.interval_seconds)
    }
}

impl From<RotationConfig> for RotationSection {
    fn from(cfg: RotationConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            interval_seconds: cfg.interval_seconds(),
        }
    }
}

impl ProbeSection {
    pub fn to_liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            ports: self.ports.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

impl WakeSection {
    /// Parses the configured addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if either address is not an IP.
    pub fn to_wake_config(&self) -> Result<WakeConfig, ConfigError> {
        let parse = |field: &'static str, value: &str| {
            value
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidAddress {
                    field,
                    value: value.to_string(),
                })
        };
        Ok(WakeConfig {
            bind_address: parse("bind_address", &self.bind_address)?,
            broadcast_address: parse("broadcast_address", &self.broadcast_address)?,
            ports: self.ports.clone(),
        })
    }
}

impl TargetEntry {
    /// Splits the entry into its id and the fields the registry validates.
    pub fn to_draft(&self) -> (TargetId, TargetDraft) {
        (
            TargetId::new(self.id.clone()),
            TargetDraft {
                label: self.label.clone(),
                port_number: self.port_number,
                host_address: self.host_address.clone(),
                hardware_address: self.hardware_address.clone(),
                command_override: self.command_override.clone(),
            },
        )
    }
}

impl From<&Target> for TargetEntry {
    fn from(t: &Target) -> Self {
        Self {
            id: t.id().to_string(),
            label: t.label().to_string(),
            port_number: t.port_number().get(),
            host_address: t.host_address().map(str::to_string),
            hardware_address: t.hardware_address().map(|m| m.to_string()),
            command_override: t.command_override().map(str::to_string),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads and saves [`AppConfig`] at a fixed file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store backed by the platform config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory
    /// cannot be determined.
    pub fn at_default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(config_file_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config, returning defaults if the file does not exist yet.
    ///
    /// A rotation interval outside `5..=300` is clamped into range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not found",
    /// and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut cfg = match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str::<AppConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppConfig::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let requested = cfg.rotation.interval_seconds;
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&requested) {
            cfg.rotation = cfg.rotation.to_rotation_config().into();
            warn!(
                requested,
                clamped = cfg.rotation.interval_seconds,
                "rotation interval out of range, clamped"
            );
        }
        Ok(cfg)
    }

    /// Persists `config`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system failures or
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the platform config directory including the `KvmSwitch` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KvmSwitch"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kvmswitch"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KvmSwitch")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
