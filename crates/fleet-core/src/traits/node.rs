//! Node control traits
//!
//! The orchestrator never speaks a node's native protocol directly; it goes
//! through these traits so the transport can be swapped (or mocked in tests).

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ConnectionError, RpcError};
use crate::types::{FundingReference, Instance};

/// Progress reported by a node while a channel open is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStatusUpdate {
    /// Funding transaction broadcast, not yet confirmed
    Pending { funding: FundingReference },
    /// Channel confirmed and usable
    Open { funding: FundingReference },
    /// Node asks for external funding negotiation
    PsbtFund,
}

/// Stream of open-status updates; ends when the node closes it
pub type OpenStatusStream = BoxStream<'static, Result<OpenStatusUpdate, RpcError>>;

/// Arguments of a channel open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChannelParams {
    /// Counterpart's compressed public key (33 bytes)
    pub peer_pubkey: Vec<u8>,
    /// Local funding amount in satoshis
    pub local_amount: i64,
    /// Amount pushed to the counterpart in satoshis
    pub push_amount: i64,
}

/// Live control channel to one node
#[async_trait]
pub trait NodeControl: Send + Sync {
    /// Node identity (alias, public key, chain state)
    async fn get_info(&self) -> Result<Value, RpcError>;

    /// Connected peers
    async fn list_peers(&self) -> Result<Value, RpcError>;

    /// On-chain balance
    async fn wallet_balance(&self) -> Result<Value, RpcError>;

    /// Off-chain balance
    async fn channel_balance(&self) -> Result<Value, RpcError>;

    /// Channels as the node sees them
    async fn list_channels(&self) -> Result<Value, RpcError>;

    /// Start a channel open and return its status stream
    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenStatusStream, RpcError>;

    /// Cooperatively close the channel funded by `funding`
    async fn close_channel(&self, funding: &FundingReference) -> Result<(), RpcError>;

    /// Connect to a peer (`host` is `host:port`)
    async fn connect_peer(&self, pubkey: &str, host: &str) -> Result<(), RpcError>;

    /// Disconnect from a peer
    async fn disconnect_peer(&self, pubkey: &str) -> Result<(), RpcError>;

    /// Fresh taproot receive address
    async fn new_address(&self) -> Result<String, RpcError>;

    /// Ask the node to shut down
    async fn stop(&self) -> Result<(), RpcError>;
}

/// Establishes control channels to instances
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Connect to `instance`, blocking until it answers or the attempt fails
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn NodeControl>, ConnectionError>;
}
