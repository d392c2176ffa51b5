//! lnfleet Orchestrator Daemon
//!
//! The orchestrator runs on the local machine, manages the node fleet and
//! serves the CLI over a localhost IPC socket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_core::config::{self, FleetConfig};
use fleet_orchestrator::ipc::IpcServer;
use fleet_orchestrator::FleetCoordinator;

#[derive(Parser)]
#[command(name = "lnfleet-orchestrator")]
#[command(about = "lnfleet orchestrator daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IPC port (overrides config)
    #[arg(short = 'p', long)]
    ipc_port: Option<u16>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("lnfleet orchestrator starting...");

    // Load configuration
    let mut config: FleetConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                FleetConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            FleetConfig::default()
        }
    };

    if let Some(port) = args.ipc_port {
        config.ipc_port = port;
    }
    let ipc_address = config.ipc_address();

    tracing::info!(
        data_dir = %config.data_dir.display(),
        snapshot_dir = %config.snapshot_dir.display(),
        binary = %config.node.binary.display(),
        "Fleet configuration loaded"
    );

    let coordinator = Arc::new(
        FleetCoordinator::with_rest(config).context("Failed to initialize fleet coordinator")?,
    );

    // Cancelled by signals or by a fleet stop request
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let stop_requested = coordinator.shutdown_token();
    let cancel_on_stop = cancel.clone();
    tokio::spawn(async move {
        stop_requested.cancelled().await;
        tracing::info!("Fleet stop requested, initiating shutdown...");
        cancel_on_stop.cancel();
    });

    let server = IpcServer::new(ipc_address, Arc::clone(&coordinator))
        .with_shutdown_token(cancel.clone());

    let result = server.run().await;

    coordinator.teardown().await;
    result?;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
