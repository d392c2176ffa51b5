//! IPC server implementation
//!
//! Listens on localhost TCP for requests from the CLI.
//! Uses TCP on 127.0.0.1 so the CLI and external traffic generators can reach
//! it the same way on every platform.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use fleet_core::ipc::{ErrorInfo, FleetRequest, FleetResponse};
use fleet_core::{ChannelId, ErrorKind, FleetError};

use crate::coordinator::FleetCoordinator;

/// IPC server for CLI communication
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    /// Fleet lifecycle and gateway
    coordinator: Arc<FleetCoordinator>,
    /// Cancellation token for shutdown
    shutdown_token: Option<CancellationToken>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, coordinator: Arc<FleetCoordinator>) -> Self {
        Self {
            address,
            coordinator,
            shutdown_token: None,
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", self.address))?;

        self.serve(listener).await
    }

    /// Serve clients on an already bound listener until the shutdown token
    /// is cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .context("Failed to read IPC listener address")?;
        tracing::info!("IPC server listening on {}", local);

        let shutdown = self.shutdown_token.clone().unwrap_or_default();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // Only accept connections from localhost
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }

                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, coordinator).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }

        Ok(())
    }
}

async fn handle_client(stream: TcpStream, coordinator: Arc<FleetCoordinator>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<FleetRequest>(trimmed) {
            Ok(request) => handle_request(request, &coordinator).await,
            Err(e) => FleetResponse::Error(ErrorInfo::new(
                ErrorKind::InvalidArgument,
                format!("Invalid request: {}", e),
            )),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
    }

    Ok(())
}

/// Execute one request against the fleet.
///
/// Operations without a payload answer with an outcome; everything else
/// answers with its payload or an error.
pub async fn handle_request(request: FleetRequest, coordinator: &FleetCoordinator) -> FleetResponse {
    let gateway = coordinator.gateway();

    match request {
        FleetRequest::StartNodes { count } => {
            tracing::info!(count, "Start requested via IPC");
            summary_outcome(coordinator.start_nodes(count).await)
        }

        FleetRequest::Load { sim } => {
            tracing::info!(%sim, "Load requested via IPC");
            summary_outcome(coordinator.load(&sim).await)
        }

        FleetRequest::Save { sim } => {
            tracing::info!(%sim, "Save requested via IPC");
            FleetResponse::outcome(coordinator.save(&sim).await.map(|_| ()))
        }

        FleetRequest::GetIdentity { instance_id } => json_value(gateway.identity(&instance_id).await),
        FleetRequest::ListPeers { instance_id } => json_value(gateway.list_peers(&instance_id).await),
        FleetRequest::WalletBalance { instance_id } => {
            json_value(gateway.wallet_balance(&instance_id).await)
        }
        FleetRequest::ChannelBalance { instance_id } => {
            json_value(gateway.channel_balance(&instance_id).await)
        }
        FleetRequest::ListChannels { instance_id } => {
            json_value(gateway.list_channels(&instance_id).await)
        }

        FleetRequest::OpenChannel {
            instance_id,
            peer_pubkey,
            amount,
            push_amount,
            channel_id,
        } => FleetResponse::outcome(
            gateway
                .open_channel(
                    &instance_id,
                    &peer_pubkey,
                    amount,
                    push_amount,
                    ChannelId(channel_id),
                )
                .await,
        ),

        FleetRequest::CloseChannel { channel_id } => {
            FleetResponse::outcome(gateway.close_channel(ChannelId(channel_id)).await)
        }

        FleetRequest::ConnectPeer {
            instance_id,
            peer_pubkey,
            address,
        } => FleetResponse::outcome(
            gateway
                .connect_peer(&instance_id, &peer_pubkey, &address)
                .await,
        ),

        FleetRequest::DisconnectPeer {
            instance_id,
            peer_pubkey,
            address: _,
        } => FleetResponse::outcome(gateway.disconnect_peer(&instance_id, &peer_pubkey).await),

        FleetRequest::GetReceiveAddress { instance_id } => {
            text_value(gateway.receive_address(&instance_id).await)
        }

        FleetRequest::GetListenAddress { instance_id } => {
            text_value(gateway.listen_address(&instance_id))
        }

        FleetRequest::ListManagedChannels => FleetResponse::Channels {
            listing: gateway.managed_channels(),
        },

        FleetRequest::StopFleet => {
            tracing::info!("Fleet stop requested via IPC");
            coordinator.stop_fleet().await;
            FleetResponse::outcome(Ok(()))
        }

        FleetRequest::GetManifest => FleetResponse::Manifest(coordinator.manifest().await),
        FleetRequest::GetStatus => FleetResponse::Status(coordinator.status().await),
        FleetRequest::ListInstances => FleetResponse::Instances {
            instances: coordinator.instances().await,
        },
        FleetRequest::Ping => FleetResponse::Pong,
    }
}

fn summary_outcome(result: Result<fleet_core::ipc::StartSummary, FleetError>) -> FleetResponse {
    match result {
        Ok(summary) => FleetResponse::Outcome {
            success: true,
            error: None,
            summary: Some(summary),
        },
        Err(e) => FleetResponse::outcome(Err(e)),
    }
}

fn json_value<T: Serialize>(result: Result<T, FleetError>) -> FleetResponse {
    match result {
        Ok(value) => match serde_json::to_string(&value) {
            Ok(value) => FleetResponse::Value { value },
            Err(e) => FleetResponse::Error(ErrorInfo::new(ErrorKind::Rpc, e.to_string())),
        },
        Err(e) => FleetResponse::error(&e),
    }
}

fn text_value(result: Result<String, FleetError>) -> FleetResponse {
    match result {
        Ok(value) => FleetResponse::Value { value },
        Err(e) => FleetResponse::error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockConnector;
    use fleet_core::config::FleetConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> FleetCoordinator {
        let mut config = FleetConfig {
            data_dir: dir.path().join("fleet"),
            snapshot_dir: dir.path().join("sims"),
            ..FleetConfig::default()
        };
        config.node.binary = "sleep".into();
        config.node.args = vec!["30".to_string()];
        config.launch.batch_pause = Duration::ZERO;
        config.launch.stop_grace = Duration::from_millis(100);
        config.connect.settle_delay = Duration::ZERO;
        FleetCoordinator::new(config, Arc::new(MockConnector::new())).unwrap()
    }

    #[tokio::test]
    async fn test_unconnected_instance_is_typed_error() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);

        let response = handle_request(
            FleetRequest::GetIdentity {
                instance_id: "blast-0000".to_string(),
            },
            &coordinator,
        )
        .await;

        match response {
            FleetResponse::Error(info) => {
                assert_eq!(info.kind, ErrorKind::NotConnected);
                assert!(info.message.contains("blast-0000"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_unknown_channel_outcome() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);

        let response =
            handle_request(FleetRequest::CloseChannel { channel_id: 3 }, &coordinator).await;
        match response {
            FleetResponse::Outcome {
                success: false,
                error: Some(info),
                ..
            } => assert_eq!(info.kind, ErrorKind::NotFound),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_then_query() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir);

        let response = handle_request(FleetRequest::StartNodes { count: 2 }, &coordinator).await;
        match response {
            FleetResponse::Outcome {
                success: true,
                summary: Some(summary),
                ..
            } => assert_eq!(summary.connected, 2),
            other => panic!("unexpected response: {:?}", other),
        }

        let response = handle_request(
            FleetRequest::GetListenAddress {
                instance_id: "blast-0001".to_string(),
            },
            &coordinator,
        )
        .await;
        assert!(matches!(response, FleetResponse::Value { value } if value.starts_with("localhost:")));

        let response = handle_request(
            FleetRequest::GetIdentity {
                instance_id: "blast-0000".to_string(),
            },
            &coordinator,
        )
        .await;
        match response {
            FleetResponse::Value { value } => {
                let json: serde_json::Value = serde_json::from_str(&value).unwrap();
                assert_eq!(json["alias"], "blast-0000");
            }
            other => panic!("unexpected response: {:?}", other),
        }

        coordinator.teardown().await;
    }
}
