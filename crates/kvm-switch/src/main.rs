//! `kvm-switch` entry point.
//!
//! Loads the configuration, initialises logging and dispatches to one of the
//! subcommands.  `run` wires every infrastructure service together:
//!
//! ```text
//! main()
//!  └─ TomlConfigStore::load()
//!  └─ run
//!       ├─ DeviceTransport       (serial device, or MockTransport with --dry-run)
//!       ├─ AppState::new()       (registry, scheduler, wake, probe)
//!       └─ run_rotation_loop     (Tokio task, stopped on Ctrl-C)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvm_switch::application::manage_targets::TargetRegistry;
use kvm_switch::application::rotate_targets::{SwitchTransport, TransportEvent};
use kvm_switch::infrastructure::network::liveness::TcpLivenessProbe;
use kvm_switch::infrastructure::network::wake::WakeTransmitter;
use kvm_switch::infrastructure::rotation_loop::run_rotation_loop;
use kvm_switch::infrastructure::storage::config::{AppConfig, TargetEntry, TomlConfigStore};
use kvm_switch::infrastructure::transport::device::DeviceTransport;
use kvm_switch::infrastructure::transport::mock::MockTransport;
use kvm_switch::infrastructure::transport::EVENT_CHANNEL_CAPACITY;
use kvm_switch::infrastructure::ui_bridge::{self, AppState};
use kvm_switch_core::{encode_command, encode_port, PortNumber};

#[derive(Parser)]
#[command(name = "kvm-switch")]
#[command(author, version, about = "Presence-aware KVM switch orchestrator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "KVM_SWITCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (e.g. "debug" or "kvm_switch=trace"); overrides the config
    #[arg(long, global = true, env = "KVM_SWITCH_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the switch and rotate between targets until Ctrl-C
    Run {
        /// Log commands instead of writing them to the serial device
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a Wake-on-LAN magic packet
    Wake {
        /// Hardware address, e.g. 00:1A:2B:3C:4D:5E
        mac: String,
    },
    /// Check whether a host answers on any probe port
    Status { host: String },
    /// Switch the KVM to a port once
    Switch { port: u8 },
    /// List configured targets
    Targets,
    /// Print the command string sent for a port
    Encode { port: u8 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => TomlConfigStore::new(path),
        None => TomlConfigStore::at_default_location().context("failed to locate config file")?,
    };
    let config = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;

    init_logging(cli.log_level.as_deref(), &config.app.log_level);
    info!(config = %store.path().display(), "kvm-switch starting");

    match cli.command {
        Commands::Run { dry_run } => run(config, store, dry_run).await,
        Commands::Wake { mac } => wake(&config, &mac).await,
        Commands::Status { host } => status(&config, &host).await,
        Commands::Switch { port } => switch(config, store, port).await,
        Commands::Targets => list_targets(&config),
        Commands::Encode { port } => encode(&config, port),
    }
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn init_logging(flag: Option<&str>, configured: &str) {
    let filter = flag
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: AppConfig, store: TomlConfigStore, dry_run: bool) -> Result<()> {
    let auto_connect = config.app.auto_connect;

    let (transport, events, device) = if dry_run {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        // The in-memory transport is always "connected".
        let _ = tx.try_send(TransportEvent::Connected);
        info!("dry run: commands are logged, not sent");
        (Arc::new(MockTransport::new()) as Arc<dyn SwitchTransport>, rx, None)
    } else {
        let (device, rx) = DeviceTransport::new(config.connection.clone());
        let device = Arc::new(device);
        (Arc::clone(&device) as Arc<dyn SwitchTransport>, rx, Some(device))
    };

    let state = AppState::new(config, store, transport).context("invalid configuration")?;

    let cancel = CancellationToken::new();
    let rotation = tokio::spawn(run_rotation_loop(
        Arc::clone(&state.scheduler),
        events,
        cancel.clone(),
    ));

    if let Some(device) = &device {
        if auto_connect {
            if let Err(e) = device.connect().await {
                warn!("could not open switch: {e}");
            }
        } else {
            info!("auto_connect is off, rotation stays idle until the switch is connected");
        }
    }

    info!("kvm-switch ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    cancel.cancel();
    if let Err(e) = rotation.await {
        warn!("rotation loop ended abnormally: {e}");
    }
    if let Some(device) = device {
        device.disconnect().await;
    }

    info!("kvm-switch stopped");
    Ok(())
}

async fn wake(config: &AppConfig, mac: &str) -> Result<()> {
    let wake_config = config.wake.to_wake_config().context("invalid [wake] section")?;
    let report = WakeTransmitter::new(wake_config)
        .try_wake(mac)
        .await
        .with_context(|| format!("failed to wake {mac}"))?;

    println!("magic packet for {} sent on ports {:?}", report.mac, report.sent);
    if !report.failed.is_empty() {
        println!("failed on ports {:?}", report.failed);
    }
    Ok(())
}

async fn status(config: &AppConfig, host: &str) -> Result<()> {
    let probe = TcpLivenessProbe::new(config.probe.to_liveness_config());
    let online = probe.is_online(host).await;
    println!("{host}: {}", if online { "online" } else { "offline" });
    Ok(())
}

async fn switch(config: AppConfig, store: TomlConfigStore, port: u8) -> Result<()> {
    let (device, mut events) = DeviceTransport::new(config.connection.clone());
    let device = Arc::new(device);
    device
        .connect()
        .await
        .with_context(|| format!("failed to open {}", device.path().display()))?;

    let state = AppState::new(config, store, Arc::clone(&device) as Arc<dyn SwitchTransport>)
        .context("invalid configuration")?;
    {
        let mut scheduler = state.scheduler.lock().await;
        while let Ok(event) = events.try_recv() {
            scheduler.handle_event(event);
        }
    }

    let result = ui_bridge::switch_to_port(Arc::clone(&state), port).await;
    device.disconnect().await;

    match (result.data, result.error) {
        (Some(port), _) => {
            println!("switched to port {port}");
            Ok(())
        }
        (None, error) => bail!(error.unwrap_or_else(|| "switch failed".to_string())),
    }
}

fn list_targets(config: &AppConfig) -> Result<()> {
    let registry = TargetRegistry::from_drafts(config.targets.iter().map(TargetEntry::to_draft))
        .context("invalid target in configuration")?;

    if registry.is_empty() {
        println!("no targets configured");
        return Ok(());
    }
    for t in registry.all() {
        println!(
            "{:>2}  {:<24} host={:<16} mac={}  [{}]",
            t.port_number(),
            t.label(),
            t.host_address().unwrap_or("-"),
            t.hardware_address().map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
            t.id(),
        );
    }
    Ok(())
}

fn encode(config: &AppConfig, port: u8) -> Result<()> {
    let port = PortNumber::new(port).context("invalid port")?;
    let registry = TargetRegistry::from_drafts(config.targets.iter().map(TargetEntry::to_draft))
        .context("invalid target in configuration")?;

    let command = match registry.by_port(port) {
        Some(target) => encode_command(target),
        None => encode_port(port),
    };
    println!("{command}");
    Ok(())
}
