//! Request routing from callers to node connections
//!
//! Every per-instance operation resolves the instance's live connection
//! first. An instance without one yields `NotConnected` and no call is made.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use fleet_core::traits::OpenChannelParams;
use fleet_core::{ChannelId, FleetError, InstanceId};

use crate::channel::{spawn_open_listener, OpenAttempt};
use crate::connection::NodeConnection;
use crate::state::FleetState;

/// Length of a hex-encoded compressed public key
const PUBKEY_HEX_LEN: usize = 66;

/// Outcome of a fleet-wide stop request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub requested: usize,
    pub failed: Vec<InstanceId>,
}

/// Maps control requests onto the right node connection
pub struct FleetGateway {
    state: Arc<FleetState>,
}

impl FleetGateway {
    pub fn new(state: Arc<FleetState>) -> Self {
        Self { state }
    }

    fn connection(&self, id: &str) -> Result<Arc<NodeConnection>, FleetError> {
        self.state.connections.lookup(&InstanceId::new(id))
    }

    /// Node identity
    pub async fn identity(&self, id: &str) -> Result<Value, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .get_info()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    pub async fn list_peers(&self, id: &str) -> Result<Value, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .list_peers()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    pub async fn wallet_balance(&self, id: &str) -> Result<Value, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .wallet_balance()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    pub async fn channel_balance(&self, id: &str) -> Result<Value, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .channel_balance()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    pub async fn list_channels(&self, id: &str) -> Result<Value, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .list_channels()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    /// Ask `id` to open a channel to `peer_pubkey`.
    ///
    /// Returns once the node accepted the request; the record appears in the
    /// channel registry when the node reports the channel open.
    pub async fn open_channel(
        &self,
        id: &str,
        peer_pubkey: &str,
        amount: i64,
        push_amount: i64,
        channel_id: ChannelId,
    ) -> Result<(), FleetError> {
        let conn = self.connection(id)?;
        let pubkey = decode_pubkey(peer_pubkey)?;
        if amount <= 0 {
            return Err(FleetError::InvalidArgument(format!(
                "channel amount must be positive, got {}",
                amount
            )));
        }
        if push_amount < 0 || push_amount > amount {
            return Err(FleetError::InvalidArgument(format!(
                "push amount {} outside 0..={}",
                push_amount, amount
            )));
        }
        if self.state.channels.get(channel_id).is_ok() {
            return Err(FleetError::InvalidArgument(format!(
                "channel id {} is already in use",
                channel_id
            )));
        }

        let updates = conn
            .client
            .open_channel(OpenChannelParams {
                peer_pubkey: pubkey,
                local_amount: amount,
                push_amount,
            })
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))?;

        spawn_open_listener(
            &self.state.listeners,
            Arc::clone(&self.state.channels),
            OpenAttempt {
                channel_id,
                source: conn.id().clone(),
                counterpart: peer_pubkey.to_ascii_lowercase(),
            },
            updates,
            conn.retired.clone(),
        );

        tracing::info!(instance = %conn.id(), channel_id = %channel_id, amount, "Channel open accepted");
        Ok(())
    }

    /// Close a managed channel from the node that opened it
    pub async fn close_channel(&self, channel_id: ChannelId) -> Result<(), FleetError> {
        let record = self.state.channels.get(channel_id)?;
        let conn = self.state.connections.lookup(&record.source)?;

        conn.client
            .close_channel(&record.funding)
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))?;

        self.state.channels.record_close(channel_id)?;
        tracing::info!(instance = %conn.id(), channel_id = %channel_id, funding = %record.funding, "Channel closed");
        Ok(())
    }

    pub async fn connect_peer(
        &self,
        id: &str,
        peer_pubkey: &str,
        address: &str,
    ) -> Result<(), FleetError> {
        let conn = self.connection(id)?;
        decode_pubkey(peer_pubkey)?;
        if address.trim().is_empty() {
            return Err(FleetError::InvalidArgument(
                "peer address is empty".to_string(),
            ));
        }

        conn.client
            .connect_peer(peer_pubkey, address)
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))?;
        tracing::debug!(instance = %conn.id(), peer = peer_pubkey, address, "Connected peer");
        Ok(())
    }

    pub async fn disconnect_peer(&self, id: &str, peer_pubkey: &str) -> Result<(), FleetError> {
        let conn = self.connection(id)?;
        decode_pubkey(peer_pubkey)?;

        conn.client
            .disconnect_peer(peer_pubkey)
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))?;
        tracing::debug!(instance = %conn.id(), peer = peer_pubkey, "Disconnected peer");
        Ok(())
    }

    /// Fresh on-chain receive address
    pub async fn receive_address(&self, id: &str) -> Result<String, FleetError> {
        let conn = self.connection(id)?;
        conn.client
            .new_address()
            .await
            .map_err(|e| FleetError::rpc(conn.id(), e))
    }

    /// Address peers use to reach the node
    pub fn listen_address(&self, id: &str) -> Result<String, FleetError> {
        Ok(self.connection(id)?.instance.listen_address())
    }

    /// Listing of channels opened through the gateway
    pub fn managed_channels(&self) -> String {
        self.state.channels.listing()
    }

    /// Best-effort stop of every connected node
    pub async fn stop_all(&self) -> StopReport {
        let connections = self.state.connections.list();
        let requested = connections.len();

        let results = join_all(connections.into_iter().map(|conn| async move {
            let result = conn.client.stop().await;
            (conn, result)
        }))
        .await;

        let mut failed = Vec::new();
        for (conn, result) in results {
            if let Err(e) = result {
                tracing::warn!(instance = %conn.id(), error = %e, "Failed to stop node");
                failed.push(conn.id().clone());
            }
        }

        tracing::info!(requested, failed = failed.len(), "Stop issued to fleet");
        StopReport { requested, failed }
    }
}

/// Decode and check a hex compressed public key
fn decode_pubkey(pubkey: &str) -> Result<Vec<u8>, FleetError> {
    if pubkey.len() != PUBKEY_HEX_LEN {
        return Err(FleetError::InvalidArgument(format!(
            "public key must be {} hex characters, got {}",
            PUBKEY_HEX_LEN,
            pubkey.len()
        )));
    }
    hex::decode(pubkey)
        .map_err(|e| FleetError::InvalidArgument(format!("public key is not hex: {}", e)))
}
