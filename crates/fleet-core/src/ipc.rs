//! IPC protocol between the CLI and the fleet orchestrator
//!
//! Messages are JSON objects, one per line, over TCP on localhost
//! (127.0.0.1). Every request gets exactly one response.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FleetError};
use crate::manifest::FleetManifest;
use crate::types::InstanceState;

/// Default orchestrator IPC port
pub const DEFAULT_IPC_PORT: u16 = 5050;

/// Default orchestrator IPC address
pub fn default_ipc_address() -> String {
    format!("127.0.0.1:{}", DEFAULT_IPC_PORT)
}

/// IPC request from a client to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetRequest {
    /// Allocate, configure, launch and connect `count` new instances
    StartNodes { count: usize },

    /// Restore a saved simulation and bring its fleet up
    Load { sim: String },

    /// Save the running fleet as a named simulation
    Save { sim: String },

    /// Native identity of one instance
    GetIdentity { instance_id: String },

    /// Peers of one instance
    ListPeers { instance_id: String },

    /// On-chain balance of one instance
    WalletBalance { instance_id: String },

    /// Off-chain balance of one instance
    ChannelBalance { instance_id: String },

    /// Channels as reported by one instance
    ListChannels { instance_id: String },

    /// Open a channel from one instance to a peer
    OpenChannel {
        instance_id: String,
        peer_pubkey: String,
        amount: i64,
        push_amount: i64,
        channel_id: i64,
    },

    /// Cooperatively close a managed channel
    CloseChannel { channel_id: i64 },

    /// Connect one instance to a peer
    ConnectPeer {
        instance_id: String,
        peer_pubkey: String,
        address: String,
    },

    /// Disconnect one instance from a peer
    DisconnectPeer {
        instance_id: String,
        peer_pubkey: String,
        address: String,
    },

    /// Fresh receive address of one instance
    GetReceiveAddress { instance_id: String },

    /// Peer listen address of one instance
    GetListenAddress { instance_id: String },

    /// Managed channel listing
    ListManagedChannels,

    /// Stop every connected instance and signal shutdown
    StopFleet,

    /// Fleet manifest (ids, endpoints, credential paths)
    GetManifest,

    /// Orchestrator status
    GetStatus,

    /// Per-instance summary
    ListInstances,

    /// Ping (for keepalive)
    Ping,
}

/// IPC response from the orchestrator to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetResponse {
    /// Result of a lifecycle operation
    Outcome {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<StartSummary>,
    },

    /// Forwarded call result, as JSON or plain text
    Value { value: String },

    /// Managed channel listing
    Channels { listing: String },

    /// Fleet manifest
    Manifest(FleetManifest),

    /// Orchestrator status
    Status(FleetStatus),

    /// Per-instance summary
    Instances { instances: Vec<InstanceInfo> },

    /// Pong response
    Pong,

    /// Error response
    Error(ErrorInfo),
}

impl FleetResponse {
    /// Lifecycle outcome without a summary
    pub fn outcome(result: Result<(), FleetError>) -> Self {
        match result {
            Ok(()) => FleetResponse::Outcome {
                success: true,
                error: None,
                summary: None,
            },
            Err(e) => FleetResponse::Outcome {
                success: false,
                error: Some(ErrorInfo::from(&e)),
                summary: None,
            },
        }
    }

    /// Error response for a failed non-lifecycle operation
    pub fn error(err: &FleetError) -> Self {
        FleetResponse::Error(ErrorInfo::from(err))
    }
}

/// Typed error carried over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&FleetError> for ErrorInfo {
    fn from(err: &FleetError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// What a fleet start accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSummary {
    /// Instances asked for
    pub requested: usize,
    /// Processes spawned
    pub started: usize,
    /// Control connections established
    pub connected: usize,
}

/// Orchestrator status information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    /// Whether the orchestrator is accepting lifecycle requests
    pub running: bool,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Number of known instances
    pub instance_count: usize,
    /// Number of live control connections
    pub connected_count: usize,
    /// Number of managed channels
    pub channel_count: usize,
    /// Orchestrator version
    pub version: String,
    /// Fleet root directory
    pub data_dir: String,
    /// IPC bind address
    pub ipc_address: String,
}

/// Instance summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Instance alias
    pub id: String,
    /// Lifecycle state
    pub state: InstanceState,
    /// Peer listen address
    pub listen_address: String,
    /// Control endpoint
    pub control_endpoint: String,
    /// Working directory
    pub workdir: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceId;

    #[test]
    fn test_request_serialization() {
        let req = FleetRequest::OpenChannel {
            instance_id: "blast-0000".to_string(),
            peer_pubkey: "02ab".to_string(),
            amount: 100_000,
            push_amount: 0,
            channel_id: 7,
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"open_channel""#));
        assert!(json.contains("peer_pubkey"));

        let decoded: FleetRequest = serde_json::from_str(&json).unwrap();
        match decoded {
            FleetRequest::OpenChannel {
                instance_id,
                channel_id,
                ..
            } => {
                assert_eq!(instance_id, "blast-0000");
                assert_eq!(channel_id, 7);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_unit_request_wire_format() {
        let decoded: FleetRequest =
            serde_json::from_str(r#"{"type":"list_managed_channels"}"#).unwrap();
        assert!(matches!(decoded, FleetRequest::ListManagedChannels));

        let decoded: FleetRequest =
            serde_json::from_str(r#"{"type":"start_nodes","count":3}"#).unwrap();
        assert!(matches!(decoded, FleetRequest::StartNodes { count: 3 }));
    }

    #[test]
    fn test_error_outcome() {
        let resp = FleetResponse::outcome(Err(FleetError::FleetActive(3)));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"outcome""#));
        assert!(json.contains(r#""kind":"fleet_active""#));
        assert!(!json.contains("summary"));

        match serde_json::from_str::<FleetResponse>(&json).unwrap() {
            FleetResponse::Outcome { success, error, .. } => {
                assert!(!success);
                assert_eq!(error.unwrap().kind, ErrorKind::FleetActive);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_error_response_wire_format() {
        let resp = FleetResponse::error(&FleetError::NotConnected(InstanceId::new("blast-0009")));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""kind":"not_connected""#));
        assert!(json.contains("blast-0009"));
    }

    #[test]
    fn test_instances_response_serialization() {
        let resp = FleetResponse::Instances {
            instances: vec![InstanceInfo {
                id: "blast-0000".to_string(),
                state: InstanceState::Connected,
                listen_address: "localhost:9735".to_string(),
                control_endpoint: "localhost:8080".to_string(),
                workdir: "/tmp/lnd0000".to_string(),
            }],
        };

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("listenAddress"));

        match serde_json::from_str::<FleetResponse>(&json).unwrap() {
            FleetResponse::Instances { instances } => {
                assert_eq!(instances.len(), 1);
                assert_eq!(instances[0].state, InstanceState::Connected);
            }
            _ => panic!("Wrong variant"),
        }
    }
}
