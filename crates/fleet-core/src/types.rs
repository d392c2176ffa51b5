//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable alias of a managed node instance (e.g. `blast-0000`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Create a new instance ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the id of the `index`-th instance of a fleet: `<prefix>-NNNN`
    pub fn numbered(prefix: &str, index: usize) -> Self {
        Self(format!("{}-{}", prefix, pad_index(index)))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Zero-pad an instance index to four digits; wider indices are kept as-is.
pub fn pad_index(index: usize) -> String {
    format!("{:04}", index)
}

/// Caller-supplied correlation key for a channel opened through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// On-chain outpoint that funds a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundingReference {
    /// Funding transaction id, hex encoded in display (big-endian) order
    pub txid: String,
    /// Output index within the funding transaction
    pub output_index: u32,
}

impl FundingReference {
    /// Create a new funding reference
    pub fn new(txid: impl Into<String>, output_index: u32) -> Self {
        Self {
            txid: txid.into(),
            output_index,
        }
    }
}

impl fmt::Display for FundingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.output_index)
    }
}

/// Credential material a node writes for its control interface.
///
/// The orchestrator only passes these paths around; it never generates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// TLS certificate presented by the node's control listener
    pub tls_cert: PathBuf,
    /// Admin macaroon (absent on disk when the node runs without macaroons)
    pub macaroon: PathBuf,
}

/// One managed node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Stable alias, unique within a fleet run
    pub id: InstanceId,
    /// Working directory owned exclusively by this instance
    pub workdir: PathBuf,
    /// Peer-to-peer listen port
    pub listen_port: u16,
    /// Control (REST) port
    pub control_port: u16,
    /// Credential references
    pub credentials: Credentials,
}

impl Instance {
    /// Create an instance whose credentials live at `tls_cert_name` and
    /// `macaroon_path` relative to its working directory.
    pub fn new(
        id: InstanceId,
        workdir: PathBuf,
        listen_port: u16,
        control_port: u16,
        tls_cert_name: &Path,
        macaroon_path: &Path,
    ) -> Self {
        let credentials = Credentials {
            tls_cert: workdir.join(tls_cert_name),
            macaroon: workdir.join(macaroon_path),
        };
        Self {
            id,
            workdir,
            listen_port,
            control_port,
            credentials,
        }
    }

    /// Address other nodes use to reach this node's peer port
    pub fn listen_address(&self) -> String {
        format!("localhost:{}", self.listen_port)
    }

    /// Host:port of the control listener
    pub fn control_endpoint(&self) -> String {
        format!("localhost:{}", self.control_port)
    }

    /// Base URL of the control listener
    pub fn control_url(&self) -> String {
        format!("https://{}", self.control_endpoint())
    }
}

/// Lifecycle state of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Known but not yet launched
    Unstarted,
    /// Process launch in progress
    Starting,
    /// Process launched, no control connection yet
    Running,
    /// Control connection established
    Connected,
    /// Process failed or connection could not be established
    Unreachable,
    /// Fleet-wide stop issued
    Stopped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Unstarted => write!(f, "unstarted"),
            InstanceState::Starting => write!(f, "starting"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Connected => write!(f, "connected"),
            InstanceState::Unreachable => write!(f, "unreachable"),
            InstanceState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_instance_id() {
        assert_eq!(InstanceId::numbered("blast", 0).as_str(), "blast-0000");
        assert_eq!(InstanceId::numbered("blast", 42).as_str(), "blast-0042");
        assert_eq!(InstanceId::numbered("blast", 12345).as_str(), "blast-12345");
    }

    #[test]
    fn test_instance_addresses() {
        let instance = Instance::new(
            InstanceId::new("blast-0001"),
            PathBuf::from("/tmp/fleet/lnd0001"),
            9735,
            8080,
            Path::new("tls.cert"),
            Path::new("data/admin.macaroon"),
        );

        assert_eq!(instance.listen_address(), "localhost:9735");
        assert_eq!(instance.control_endpoint(), "localhost:8080");
        assert_eq!(instance.control_url(), "https://localhost:8080");
        assert_eq!(
            instance.credentials.tls_cert,
            PathBuf::from("/tmp/fleet/lnd0001/tls.cert")
        );
    }

    #[test]
    fn test_funding_reference_display() {
        let funding = FundingReference::new("ab12", 1);
        assert_eq!(funding.to_string(), "ab12:1");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&InstanceId::new("blast-0000")).unwrap();
        assert_eq!(json, r#""blast-0000""#);

        let json = serde_json::to_string(&ChannelId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_instance_state_display() {
        assert_eq!(format!("{}", InstanceState::Connected), "connected");
        assert_eq!(format!("{}", InstanceState::Unreachable), "unreachable");
    }
}
