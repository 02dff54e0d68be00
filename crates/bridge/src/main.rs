//! accessory-bridged
//!
//! Host daemon bridging USB accessory-mode devices to local applications.
//! Applications connect over a Unix socket and drive the accessory through a
//! small method-call surface; the daemon owns the single accessory session
//! and the permission flow.

mod accessory;
mod bridge;
mod config;
mod permission;
mod server;
mod session;
mod worker;

use accessory::{AccessoryManager, HostAccessoryManager};
use anyhow::{Context, Result};
use clap::Parser;
use common::{BridgeCommand, BridgeHandle, create_bridge, setup_logging};
use server::HostServer;
use tokio::signal;
use tracing::{error, info};
use worker::spawn_worker;

#[derive(Parser, Debug)]
#[command(name = "accessory-bridged")]
#[command(
    author,
    version,
    about = "USB accessory bridge daemon - expose accessory-mode devices to local apps"
)]
#[command(long_about = "
Bridges USB accessory-mode (AOA) devices to local applications over a Unix
socket. Applications issue method calls (connect, read, write, permission
checks) and the daemon manages the single accessory session.

EXAMPLES:
    # Run with default config
    accessory-bridged

    # Run with custom config
    accessory-bridged --config /path/to/bridge.toml

    # List accessory-mode devices without starting the daemon
    accessory-bridged --list-accessories

    # Run with debug logging
    accessory-bridged --log-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/accessory-bridge/bridge.toml
    3. /etc/accessory-bridge/bridge.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Unix socket to listen on (overrides config)
    #[arg(short, long, value_name = "PATH")]
    socket: Option<std::path::PathBuf>,

    /// List accessory-mode devices and exit
    #[arg(long)]
    list_accessories: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::BridgeConfig::default();
        let path = config::BridgeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        config::BridgeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::BridgeConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("accessory-bridged v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_accessories {
        return list_accessories_mode();
    }

    // Channel bridge plus dedicated worker thread for blocking accessory I/O
    let (handle, worker) = create_bridge();
    let manager = HostAccessoryManager::new(worker.event_tx.clone())
        .context("Failed to initialize USB context")?;
    let worker_handle = spawn_worker(worker, Box::new(manager), config.permission_timeout());

    let socket_path = args.socket.unwrap_or_else(|| config.socket_path());
    let server = HostServer::bind(&socket_path, handle.clone())
        .context("Failed to bind bridge socket")?;

    info!("Press Ctrl+C to shutdown");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {:#}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Cleanup: tear down the accessory worker thread
    info!("Shutting down accessory worker...");
    if let Err(e) = shutdown_worker(handle).await {
        error!("Error shutting down accessory worker: {:#}", e);
    }
    if let Err(e) = worker_handle.join() {
        error!("Accessory worker thread panicked: {:?}", e);
    }

    if let Err(e) = std::fs::remove_file(&socket_path) {
        error!("Failed to remove socket file: {}", e);
    }

    Ok(())
}

/// List accessory-mode devices and exit
fn list_accessories_mode() -> Result<()> {
    info!("Listing accessory-mode devices...");

    // The enumeration does not need the event channel; give the manager a
    // dummy one
    let (event_tx, _event_rx) = async_channel::bounded(1);
    let mut manager =
        HostAccessoryManager::new(event_tx).context("Failed to initialize USB context")?;

    let accessories = manager.accessories();
    if accessories.is_empty() {
        println!("No accessory-mode devices found.");
    } else {
        println!("Found {} accessory-mode device(s):\n", accessories.len());
        for (index, accessory) in accessories.iter().enumerate() {
            println!(
                "  [{}] {:04x}:{:04x} - {} {}",
                index,
                accessory.vendor_id,
                accessory.product_id,
                accessory
                    .manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                accessory.product.as_deref().unwrap_or("Unknown Product")
            );
            if let Some(serial) = &accessory.serial_number {
                println!("      Serial: {}", serial);
            }
            println!();
        }
    }

    Ok(())
}

async fn shutdown_worker(handle: BridgeHandle) -> common::Result<()> {
    handle.send_command(BridgeCommand::Shutdown).await
}
