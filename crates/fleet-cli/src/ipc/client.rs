//! IPC client for communicating with the orchestrator
//!
//! Uses TCP on localhost. Every request gets exactly one response line.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use fleet_core::ipc::{
    default_ipc_address, FleetRequest, FleetResponse, FleetStatus, InstanceInfo, StartSummary,
};
use fleet_core::manifest::FleetManifest;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Client for communicating with the orchestrator daemon
pub struct FleetClient {
    address: String,
    connection: Option<Connection>,
}

impl FleetClient {
    /// Create a new client with default address
    pub fn new() -> Self {
        Self::with_address(default_ipc_address())
    }

    /// Create a new client with custom address
    pub fn with_address(address: String) -> Self {
        Self {
            address,
            connection: None,
        }
    }

    /// Get the address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect to the orchestrator if not already connected
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to orchestrator at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to orchestrator at {}. Is it running?",
                self.address
            )
        })?;

        let (reader, writer) = stream.into_split();
        self.connection = Some(Connection {
            reader: BufReader::new(reader),
            writer,
        });
        Ok(())
    }

    /// Check if the orchestrator is running
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send_request(FleetRequest::Ping).await {
            Ok(FleetResponse::Pong) => Ok(true),
            _ => Ok(false),
        }
    }

    /// Get orchestrator status
    pub async fn status(&mut self) -> Result<FleetStatus> {
        match self.send_request(FleetRequest::GetStatus).await? {
            FleetResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// List fleet instances
    pub async fn list_instances(&mut self) -> Result<Vec<InstanceInfo>> {
        match self.send_request(FleetRequest::ListInstances).await? {
            FleetResponse::Instances { instances } => Ok(instances),
            other => Err(unexpected(other)),
        }
    }

    /// Get the fleet manifest
    pub async fn manifest(&mut self) -> Result<FleetManifest> {
        match self.send_request(FleetRequest::GetManifest).await? {
            FleetResponse::Manifest(manifest) => Ok(manifest),
            other => Err(unexpected(other)),
        }
    }

    /// Start `count` fresh nodes
    pub async fn start_nodes(&mut self, count: usize) -> Result<StartSummary> {
        self.summary(FleetRequest::StartNodes { count }).await
    }

    /// Restore a saved simulation
    pub async fn load(&mut self, sim: &str) -> Result<StartSummary> {
        self.summary(FleetRequest::Load {
            sim: sim.to_string(),
        })
        .await
    }

    /// Save the running fleet
    pub async fn save(&mut self, sim: &str) -> Result<()> {
        self.outcome(FleetRequest::Save {
            sim: sim.to_string(),
        })
        .await
    }

    /// Stop the fleet and shut the orchestrator down
    pub async fn stop_fleet(&mut self) -> Result<()> {
        self.outcome(FleetRequest::StopFleet).await
    }

    /// Forwarded node query; the value is the node's JSON answer
    pub async fn query(&mut self, request: FleetRequest) -> Result<String> {
        match self.send_request(request).await? {
            FleetResponse::Value { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Open a channel; returns once the node accepted the request
    pub async fn open_channel(
        &mut self,
        instance_id: &str,
        peer_pubkey: &str,
        amount: i64,
        push_amount: i64,
        channel_id: i64,
    ) -> Result<()> {
        self.outcome(FleetRequest::OpenChannel {
            instance_id: instance_id.to_string(),
            peer_pubkey: peer_pubkey.to_string(),
            amount,
            push_amount,
            channel_id,
        })
        .await
    }

    /// Close a managed channel
    pub async fn close_channel(&mut self, channel_id: i64) -> Result<()> {
        self.outcome(FleetRequest::CloseChannel { channel_id }).await
    }

    pub async fn connect_peer(&mut self, instance_id: &str, peer_pubkey: &str, address: &str) -> Result<()> {
        self.outcome(FleetRequest::ConnectPeer {
            instance_id: instance_id.to_string(),
            peer_pubkey: peer_pubkey.to_string(),
            address: address.to_string(),
        })
        .await
    }

    pub async fn disconnect_peer(
        &mut self,
        instance_id: &str,
        peer_pubkey: &str,
        address: &str,
    ) -> Result<()> {
        self.outcome(FleetRequest::DisconnectPeer {
            instance_id: instance_id.to_string(),
            peer_pubkey: peer_pubkey.to_string(),
            address: address.to_string(),
        })
        .await
    }

    /// Managed channel listing
    pub async fn managed_channels(&mut self) -> Result<String> {
        match self.send_request(FleetRequest::ListManagedChannels).await? {
            FleetResponse::Channels { listing } => Ok(listing),
            other => Err(unexpected(other)),
        }
    }

    async fn summary(&mut self, request: FleetRequest) -> Result<StartSummary> {
        match self.send_request(request).await? {
            FleetResponse::Outcome {
                success: true,
                summary: Some(summary),
                ..
            } => Ok(summary),
            other => Err(unexpected(other)),
        }
    }

    async fn outcome(&mut self, request: FleetRequest) -> Result<()> {
        match self.send_request(request).await? {
            FleetResponse::Outcome { success: true, .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Send a request and receive response (used by all public methods)
    async fn send_request(&mut self, request: FleetRequest) -> Result<FleetResponse> {
        self.connect().await?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        // Send request as JSON line
        let mut request_json = serde_json::to_string(&request)?;
        request_json.push('\n');
        connection.writer.write_all(request_json.as_bytes()).await?;

        // Read response line
        let mut response_line = String::new();
        let read = connection.reader.read_line(&mut response_line).await?;
        if read == 0 {
            self.connection = None;
            anyhow::bail!("Orchestrator closed the connection");
        }

        let response: FleetResponse = serde_json::from_str(&response_line)
            .with_context(|| format!("Invalid response: {}", response_line.trim()))?;
        Ok(response)
    }
}

impl Default for FleetClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an error or mismatched response into an error
fn unexpected(response: FleetResponse) -> anyhow::Error {
    match response {
        FleetResponse::Error(info) => anyhow::anyhow!("{}", info),
        FleetResponse::Outcome {
            success: false,
            error: Some(info),
            ..
        } => anyhow::anyhow!("{}", info),
        FleetResponse::Outcome { success: false, .. } => anyhow::anyhow!("Operation failed"),
        other => anyhow::anyhow!("Unexpected response: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ipc::ErrorInfo;
    use fleet_core::ErrorKind;
    use tokio::net::TcpListener;

    /// Answer each request line with the next canned response
    async fn canned_server(responses: Vec<FleetResponse>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            for response in responses {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let _: FleetRequest = serde_json::from_str(&line).unwrap();
                let mut json = serde_json::to_string(&response).unwrap();
                json.push('\n');
                writer.write_all(json.as_bytes()).await.unwrap();
            }
        });

        address
    }

    #[tokio::test]
    async fn test_requests_share_one_connection() {
        let address = canned_server(vec![
            FleetResponse::Pong,
            FleetResponse::Channels {
                listing: "7: blast-0000 -> 02aa".to_string(),
            },
        ])
        .await;

        let mut client = FleetClient::with_address(address);
        assert!(client.ping().await.unwrap());
        assert_eq!(
            client.managed_channels().await.unwrap(),
            "7: blast-0000 -> 02aa"
        );
    }

    #[tokio::test]
    async fn test_error_response_becomes_error() {
        let address = canned_server(vec![FleetResponse::Error(ErrorInfo::new(
            ErrorKind::NotConnected,
            "could not find node connection for blast-0003",
        ))])
        .await;

        let mut client = FleetClient::with_address(address);
        let err = client
            .query(FleetRequest::GetIdentity {
                instance_id: "blast-0003".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("blast-0003"));
    }

    #[tokio::test]
    async fn test_failed_outcome_becomes_error() {
        let address = canned_server(vec![FleetResponse::Outcome {
            success: false,
            error: Some(ErrorInfo::new(ErrorKind::FleetActive, "Fleet already has 3 instances; stop it first")),
            summary: None,
        }])
        .await;

        let mut client = FleetClient::with_address(address);
        let err = client.start_nodes(2).await.unwrap_err();
        assert!(err.to_string().contains("fleet active"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut client = FleetClient::with_address(address);
        let err = client.status().await.unwrap_err();
        assert!(err.to_string().contains("Is it running?"));
    }
}
