//! IPC integration tests
//!
//! Tests the IPC server over a real loopback socket.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use fleet_core::ipc::{FleetRequest, FleetResponse};
use fleet_core::{ErrorKind, InstanceState};
use fleet_orchestrator::ipc::IpcServer;
use fleet_orchestrator::FleetCoordinator;

use common::{mock_coordinator, sleep_fleet_config};

/// IPC test client wrapper
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address)
            .await
            .expect("Failed to connect to IPC server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    async fn send_line(&mut self, line: &str) -> FleetResponse {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("Failed to write request");
        self.writer.write_all(b"\n").await.expect("Failed to write newline");
        self.writer.flush().await.expect("Failed to flush");

        let mut response_line = String::new();
        timeout(
            Duration::from_secs(10),
            self.reader.read_line(&mut response_line),
        )
        .await
        .expect("Timeout waiting for response")
        .expect("Failed to read response");

        if response_line.is_empty() {
            panic!("Server sent empty response (connection closed?)");
        }

        serde_json::from_str(&response_line).expect("Failed to parse response")
    }

    async fn send_request(&mut self, request: FleetRequest) -> FleetResponse {
        let request_json = serde_json::to_string(&request).expect("Failed to serialize request");
        self.send_line(&request_json).await
    }
}

/// Serve `coordinator` on an ephemeral loopback port
async fn spawn_server(coordinator: Arc<FleetCoordinator>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = IpcServer::new(address.to_string(), Arc::clone(&coordinator))
        .with_shutdown_token(coordinator.shutdown_token());
    let handle = tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (address, handle)
}

#[tokio::test]
async fn test_ipc_ping_pong() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _) = mock_coordinator(sleep_fleet_config(dir.path(), "fleet"));
    let (address, server_handle) = spawn_server(coordinator).await;

    let mut client = TestClient::connect(address).await;
    let response = client.send_request(FleetRequest::Ping).await;
    assert!(matches!(response, FleetResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_get_status_empty() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _) = mock_coordinator(sleep_fleet_config(dir.path(), "fleet"));
    let (address, server_handle) = spawn_server(coordinator).await;

    let mut client = TestClient::connect(address).await;
    match client.send_request(FleetRequest::GetStatus).await {
        FleetResponse::Status(status) => {
            assert!(status.running);
            assert_eq!(status.instance_count, 0);
            assert_eq!(status.connected_count, 0);
            assert_eq!(status.channel_count, 0);
        }
        other => panic!("Expected Status response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_invalid_request() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _) = mock_coordinator(sleep_fleet_config(dir.path(), "fleet"));
    let (address, server_handle) = spawn_server(coordinator).await;

    let mut client = TestClient::connect(address).await;
    match client.send_line(r#"{"type":"launch_rockets"}"#).await {
        FleetResponse::Error(info) => {
            assert_eq!(info.kind, ErrorKind::InvalidArgument);
            assert!(info.message.starts_with("Invalid request"));
        }
        other => panic!("Expected Error response, got {:?}", other),
    }

    // The connection stays usable after a bad line
    let response = client.send_request(FleetRequest::Ping).await;
    assert!(matches!(response, FleetResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_unconnected_instance() {
    let dir = TempDir::new().unwrap();
    let (coordinator, connector) = mock_coordinator(sleep_fleet_config(dir.path(), "fleet"));
    let (address, server_handle) = spawn_server(coordinator).await;

    let mut client = TestClient::connect(address).await;
    let response = client
        .send_request(FleetRequest::WalletBalance {
            instance_id: "blast-0042".to_string(),
        })
        .await;

    match response {
        FleetResponse::Error(info) => assert_eq!(info.kind, ErrorKind::NotConnected),
        other => panic!("Expected Error response, got {:?}", other),
    }
    assert!(connector.nodes.is_empty());

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_fleet_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _) = mock_coordinator(sleep_fleet_config(dir.path(), "fleet"));
    let (address, server_handle) = spawn_server(Arc::clone(&coordinator)).await;

    let mut client = TestClient::connect(address).await;

    match client.send_request(FleetRequest::StartNodes { count: 2 }).await {
        FleetResponse::Outcome {
            success: true,
            summary: Some(summary),
            ..
        } => {
            assert_eq!(summary.requested, 2);
            assert_eq!(summary.connected, 2);
        }
        other => panic!("Expected Outcome response, got {:?}", other),
    }

    match client.send_request(FleetRequest::ListInstances).await {
        FleetResponse::Instances { instances } => {
            assert_eq!(instances.len(), 2);
            assert_eq!(instances[0].id, "blast-0000");
            assert_eq!(instances[1].state, InstanceState::Connected);
        }
        other => panic!("Expected Instances response, got {:?}", other),
    }

    match client.send_request(FleetRequest::GetManifest).await {
        FleetResponse::Manifest(manifest) => {
            let node = manifest.find("blast-0001").unwrap();
            assert!(node.address.starts_with("localhost:"));
        }
        other => panic!("Expected Manifest response, got {:?}", other),
    }

    match client.send_request(FleetRequest::StartNodes { count: 1 }).await {
        FleetResponse::Outcome {
            success: false,
            error: Some(info),
            ..
        } => assert_eq!(info.kind, ErrorKind::FleetActive),
        other => panic!("Expected failed Outcome, got {:?}", other),
    }

    match client.send_request(FleetRequest::ListManagedChannels).await {
        FleetResponse::Channels { listing } => assert_eq!(listing, ""),
        other => panic!("Expected Channels response, got {:?}", other),
    }

    match client.send_request(FleetRequest::StopFleet).await {
        FleetResponse::Outcome { success, .. } => assert!(success),
        other => panic!("Expected Outcome response, got {:?}", other),
    }

    // Stopping the fleet shuts the server down
    timeout(Duration::from_secs(5), server_handle)
        .await
        .expect("Server did not shut down")
        .unwrap();

    coordinator.teardown().await;
}
