//! Core error types for lnfleet

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{ChannelId, InstanceId};

/// Top-level error type for fleet operations
#[derive(Error, Debug)]
pub enum FleetError {
    /// Port allocation or reservation failed
    #[error("Port allocation failed: {0}")]
    Allocation(#[from] PortError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// No live control connection for the requested instance
    #[error("could not find node connection for {0}")]
    NotConnected(InstanceId),

    /// No managed channel with the requested id
    #[error("could not find open channel {0}")]
    ChannelNotFound(ChannelId),

    /// Snapshot error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The node rejected or failed a forwarded call
    #[error("Node {instance} call failed: {source}")]
    Rpc {
        instance: InstanceId,
        #[source]
        source: RpcError,
    },

    /// Node process could not be launched
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Malformed request argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lifecycle operation requires an empty fleet
    #[error("Fleet already has {0} instances; stop it first")]
    FleetActive(usize),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Wrap a native call failure for `instance`
    pub fn rpc(instance: &InstanceId, source: RpcError) -> Self {
        FleetError::Rpc {
            instance: instance.clone(),
            source,
        }
    }

    /// Coarse classification used on the IPC wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::Allocation(_) => ErrorKind::Allocation,
            FleetError::Config(_) => ErrorKind::Config,
            FleetError::Connection(_) => ErrorKind::Connection,
            FleetError::NotConnected(_) => ErrorKind::NotConnected,
            FleetError::ChannelNotFound(_) => ErrorKind::NotFound,
            FleetError::Snapshot(SnapshotError::NotFound(_)) => ErrorKind::NotFound,
            FleetError::Snapshot(_) => ErrorKind::Snapshot,
            FleetError::Rpc { .. } => ErrorKind::Rpc,
            FleetError::Launch(_) => ErrorKind::Io,
            FleetError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FleetError::FleetActive(_) => ErrorKind::FleetActive,
            FleetError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Error classification shared with IPC clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    NotFound,
    Allocation,
    Config,
    Connection,
    Snapshot,
    Rpc,
    InvalidArgument,
    FleetActive,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotConnected => "not connected",
            ErrorKind::NotFound => "not found",
            ErrorKind::Allocation => "allocation",
            ErrorKind::Config => "config",
            ErrorKind::Connection => "connection",
            ErrorKind::Snapshot => "snapshot",
            ErrorKind::Rpc => "rpc",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::FleetActive => "fleet active",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Port allocation errors
#[derive(Error, Debug)]
pub enum PortError {
    /// Probing kept returning ports that are already claimed
    #[error("no free port found after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The OS refused to hand out an ephemeral port
    #[error("failed to probe for a free port: {0}")]
    Probe(#[source] std::io::Error),

    /// A specific port could not be reserved
    #[error("port {port} is unavailable: {source}")]
    Unavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Field present but unusable
    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: String, value: String },

    /// Node configuration could not be read or written
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Control-connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Credential material could not be read
    #[error("Failed to read credentials at {path:?}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TLS setup failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Node never became ready within the connect timeout
    #[error("Timed out connecting to {instance}: {last_error}")]
    Timeout {
        instance: InstanceId,
        last_error: String,
    },

    /// Connection refused or dropped
    #[error("Connection refused: {0}")]
    Refused(String),
}

/// Snapshot persistence errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Archive or channel file missing
    #[error("Snapshot not found: {0}")]
    NotFound(PathBuf),

    /// Archive could not be written or unpacked
    #[error("Archive error at {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive entry would land outside the destination
    #[error("Archive entry escapes destination: {0}")]
    UnsafeEntry(PathBuf),

    /// Channel state could not be (de)serialized
    #[error("Channel state error: {0}")]
    Channels(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Node process launch errors
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The node binary could not be started
    #[error("Failed to spawn {binary:?} for {instance}: {source}")]
    Spawn {
        instance: InstanceId,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The launcher has already been shut down
    #[error("Launcher is shutting down")]
    ShuttingDown,
}

/// Errors returned by a node's control interface
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// Request could not be delivered
    #[error("transport error: {0}")]
    Transport(String),

    /// Node answered with an error status
    #[error("node returned error (code {code:?}): {message}")]
    Status { code: Option<i64>, message: String },

    /// Node answered with something unparseable
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Request rejected before sending
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
