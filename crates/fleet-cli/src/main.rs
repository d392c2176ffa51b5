//! lnfleet CLI
//!
//! Single binary for all lnfleet operations:
//! - Orchestrator (daemon that runs the node fleet)
//! - Fleet lifecycle (start, load, save, stop)
//! - Node and channel commands forwarded to individual nodes

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_core::config::{self, FleetConfig};
use fleet_core::ipc::FleetRequest;
use lnfleet::commands::{self, PeerAction};
use lnfleet::ipc::{FleetClient, DEFAULT_IPC_PORT};
use lnfleet::output::{print_info, print_success, print_warning};

#[derive(Parser)]
#[command(name = "lnfleet")]
#[command(author, version, about = "Lightning node fleet orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Orchestrator IPC port
    #[arg(short = 'p', long, global = true, env = "LNFLEET_IPC_PORT")]
    ipc_port: Option<u16>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator daemon
    Serve {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Start a fresh fleet of nodes
    Start {
        /// Number of nodes to start
        count: usize,
    },

    /// Restore a saved simulation
    Load {
        /// Simulation name
        sim: String,
    },

    /// Save the running fleet as a simulation
    Save {
        /// Simulation name
        sim: String,
    },

    /// Stop every node and shut the orchestrator down
    Stop,

    /// Show orchestrator status
    Status,

    /// List fleet instances
    List,

    /// Show the fleet manifest (endpoints and credentials per node)
    Manifest {
        /// Print the JSON written to sim.json
        #[arg(long)]
        json: bool,
    },

    /// Show a node's identity
    Identity { instance: String },

    /// List a node's peers
    Peers { instance: String },

    /// Show a node's on-chain balance
    WalletBalance { instance: String },

    /// Show a node's channel balance
    ChannelBalance { instance: String },

    /// List channels as reported by a node
    NodeChannels { instance: String },

    /// Get a fresh receive address from a node
    Address { instance: String },

    /// Show the address peers use to reach a node
    ListenAddress { instance: String },

    /// Connect a node to a peer
    ConnectPeer {
        instance: String,
        /// Peer public key, hex
        pubkey: String,
        /// Peer address (host:port)
        address: String,
    },

    /// Disconnect a node from a peer
    DisconnectPeer {
        instance: String,
        /// Peer public key, hex
        pubkey: String,
        /// Peer address (host:port)
        #[arg(default_value = "")]
        address: String,
    },

    /// Open a managed channel from a node to a peer
    OpenChannel {
        instance: String,
        /// Peer public key, hex
        pubkey: String,
        /// Channel capacity in satoshis
        amount: i64,
        /// Caller-chosen channel id
        #[arg(long = "id")]
        channel_id: i64,
        /// Amount pushed to the peer on open
        #[arg(long, default_value_t = 0)]
        push: i64,
    },

    /// Close a managed channel
    CloseChannel {
        /// Channel id given when it was opened
        channel_id: i64,
    },

    /// List managed channels
    Channels {
        /// Print the raw listing
        #[arg(long)]
        raw: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            show_quick_status(cli.ipc_port).await;
            return Ok(());
        }
    };

    let port = cli.ipc_port.unwrap_or(DEFAULT_IPC_PORT);
    let mut client = FleetClient::with_address(format!("127.0.0.1:{}", port));

    match command {
        Commands::Serve { foreground } => {
            run_orchestrator(foreground, cli.ipc_port, cli.config.as_ref(), cli.verbose).await?;
        }

        Commands::Start { count } => commands::start_command(&mut client, count).await?,
        Commands::Load { sim } => commands::load_command(&mut client, &sim).await?,
        Commands::Save { sim } => commands::save_command(&mut client, &sim).await?,
        Commands::Stop => commands::stop_command(&mut client).await?,
        Commands::Status => commands::status_command(&mut client).await?,
        Commands::List => commands::list_command(&mut client).await?,
        Commands::Manifest { json } => commands::manifest_command(&mut client, json).await?,

        Commands::Identity { instance } => {
            let request = FleetRequest::GetIdentity {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::Peers { instance } => {
            let request = FleetRequest::ListPeers {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::WalletBalance { instance } => {
            let request = FleetRequest::WalletBalance {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::ChannelBalance { instance } => {
            let request = FleetRequest::ChannelBalance {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::NodeChannels { instance } => {
            let request = FleetRequest::ListChannels {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::Address { instance } => {
            let request = FleetRequest::GetReceiveAddress {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }
        Commands::ListenAddress { instance } => {
            let request = FleetRequest::GetListenAddress {
                instance_id: instance,
            };
            commands::node_query_command(&mut client, request).await?;
        }

        Commands::ConnectPeer {
            instance,
            pubkey,
            address,
        } => {
            commands::peer_command(&mut client, PeerAction::Connect, &instance, &pubkey, &address)
                .await?;
        }
        Commands::DisconnectPeer {
            instance,
            pubkey,
            address,
        } => {
            commands::peer_command(
                &mut client,
                PeerAction::Disconnect,
                &instance,
                &pubkey,
                &address,
            )
            .await?;
        }

        Commands::OpenChannel {
            instance,
            pubkey,
            amount,
            channel_id,
            push,
        } => {
            commands::open_channel_command(&mut client, &instance, &pubkey, amount, push, channel_id)
                .await?;
        }
        Commands::CloseChannel { channel_id } => {
            commands::close_channel_command(&mut client, channel_id).await?;
        }
        Commands::Channels { raw } => commands::managed_channels_command(&mut client, raw).await?,

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key)?,
            ConfigAction::Set { key, value } => {
                commands::config_set(cli.config.as_ref(), &key, &value)?
            }
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Path => {
                let path = cli
                    .config
                    .clone()
                    .unwrap_or_else(config::default_config_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

/// Print a short status line when no command was given
async fn show_quick_status(ipc_port: Option<u16>) {
    let port = ipc_port.unwrap_or(DEFAULT_IPC_PORT);
    let mut client = FleetClient::with_address(format!("127.0.0.1:{}", port));

    match client.status().await {
        Ok(status) => {
            print_success(&format!(
                "Orchestrator running: {} instances, {} connected, {} managed channels",
                status.instance_count, status.connected_count, status.channel_count
            ));
        }
        Err(_) => {
            print_warning("Orchestrator is not running");
            print_info("Start it with: lnfleet serve");
        }
    }
}

// ============================================================================
// Orchestrator Implementation
// ============================================================================

async fn run_orchestrator(
    foreground: bool,
    ipc_port: Option<u16>,
    config_path: Option<&PathBuf>,
    verbose: u8,
) -> Result<()> {
    use fleet_orchestrator::ipc::IpcServer;
    use fleet_orchestrator::FleetCoordinator;

    if !foreground {
        // Daemonize by re-spawning ourselves
        let exe = std::env::current_exe()?;
        let mut cmd = std::process::Command::new(exe);
        cmd.arg("serve").arg("--foreground");
        if let Some(port) = ipc_port {
            cmd.arg("--ipc-port").arg(port.to_string());
        }
        if let Some(path) = config_path {
            cmd.arg("--config").arg(path);
        }
        for _ in 0..verbose {
            cmd.arg("--verbose");
        }

        let child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        print_success(&format!("Orchestrator started (PID: {})", child.id()));
        return Ok(());
    }

    // Foreground mode - run the orchestrator directly
    tracing::info!("lnfleet orchestrator starting...");

    let mut config: FleetConfig = if let Some(config_path) = config_path {
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

    if let Some(port) = ipc_port {
        config.ipc_port = port;
    }
    let ipc_address = config.ipc_address();

    let coordinator = Arc::new(
        FleetCoordinator::with_rest(config).context("Failed to initialize fleet coordinator")?,
    );

    let cancel = CancellationToken::new();
    let stop_requested = coordinator.shutdown_token();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = stop_requested.cancelled() => {
                tracing::info!("Fleet stop requested, initiating shutdown...");
            }
        }
        cancel_clone.cancel();
    });

    let server =
        IpcServer::new(ipc_address, Arc::clone(&coordinator)).with_shutdown_token(cancel.clone());
    let result = server.run().await;

    coordinator.teardown().await;
    result?;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}
