//! In-memory node doubles shared by unit and integration tests.
//!
//! Depends only on `fleet_core` so integration tests can include it by path.

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fleet_core::error::{ConnectionError, RpcError};
use fleet_core::traits::{
    NodeConnector, NodeControl, OpenChannelParams, OpenStatusStream, OpenStatusUpdate,
};
use fleet_core::{FundingReference, Instance, InstanceId};

/// Node double that records every call
pub struct MockNode {
    pub id: InstanceId,
    pub calls: AtomicUsize,
    pub stops: AtomicUsize,
    pub open_updates: Mutex<Vec<Result<OpenStatusUpdate, RpcError>>>,
    pub opened: Mutex<Vec<OpenChannelParams>>,
    pub closed: Mutex<Vec<FundingReference>>,
    pub peers: Mutex<Vec<(String, String)>>,
    pub fail_with: Mutex<Option<RpcError>>,
}

impl MockNode {
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            calls: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            open_updates: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        }
    }

    /// Updates the next open-channel stream will yield
    pub fn set_open_updates(&self, updates: Vec<Result<OpenStatusUpdate, RpcError>>) {
        *self.open_updates.lock().unwrap() = updates;
    }

    /// Make every subsequent call fail with `err`
    pub fn fail_with(&self, err: RpcError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn pubkey(&self) -> String {
        format!("02{:0>64}", hex_id(&self.id))
    }
}

fn hex_id(id: &InstanceId) -> String {
    id.as_str()
        .bytes()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(64)
        .collect()
}

#[async_trait]
impl NodeControl for MockNode {
    async fn get_info(&self) -> Result<Value, RpcError> {
        self.enter()?;
        Ok(json!({ "alias": self.id.as_str(), "identity_pubkey": self.pubkey() }))
    }

    async fn list_peers(&self) -> Result<Value, RpcError> {
        self.enter()?;
        let peers: Vec<Value> = self
            .peers
            .lock()
            .unwrap()
            .iter()
            .map(|(pubkey, address)| json!({ "pub_key": pubkey, "address": address }))
            .collect();
        Ok(json!({ "peers": peers }))
    }

    async fn wallet_balance(&self) -> Result<Value, RpcError> {
        self.enter()?;
        Ok(json!({ "total_balance": "100000000", "confirmed_balance": "100000000" }))
    }

    async fn channel_balance(&self) -> Result<Value, RpcError> {
        self.enter()?;
        Ok(json!({ "local_balance": { "sat": "0" } }))
    }

    async fn list_channels(&self) -> Result<Value, RpcError> {
        self.enter()?;
        Ok(json!({ "channels": [] }))
    }

    async fn open_channel(&self, params: OpenChannelParams) -> Result<OpenStatusStream, RpcError> {
        self.enter()?;
        self.opened.lock().unwrap().push(params);
        let updates = std::mem::take(&mut *self.open_updates.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(updates)))
    }

    async fn close_channel(&self, funding: &FundingReference) -> Result<(), RpcError> {
        self.enter()?;
        self.closed.lock().unwrap().push(funding.clone());
        Ok(())
    }

    async fn connect_peer(&self, pubkey: &str, host: &str) -> Result<(), RpcError> {
        self.enter()?;
        self.peers
            .lock()
            .unwrap()
            .push((pubkey.to_string(), host.to_string()));
        Ok(())
    }

    async fn disconnect_peer(&self, pubkey: &str) -> Result<(), RpcError> {
        self.enter()?;
        self.peers.lock().unwrap().retain(|(p, _)| p != pubkey);
        Ok(())
    }

    async fn new_address(&self) -> Result<String, RpcError> {
        self.enter()?;
        Ok(format!("bcrt1p{}", self.id.as_str().replace('-', "")))
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.enter()?;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector double handing out [`MockNode`]s
#[derive(Default)]
pub struct MockConnector {
    pub nodes: DashMap<InstanceId, Arc<MockNode>>,
    pub refuse: Mutex<HashSet<InstanceId>>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connects to `id` fail
    pub fn refuse(&self, id: &InstanceId) {
        self.refuse.lock().unwrap().insert(id.clone());
    }

    /// The node handed out for `id`, if it was connected
    pub fn node(&self, id: &str) -> Option<Arc<MockNode>> {
        self.nodes
            .get(&InstanceId::new(id))
            .map(|n| Arc::clone(&n))
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn NodeControl>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.lock().unwrap().contains(&instance.id) {
            return Err(ConnectionError::Refused(format!(
                "{} refused",
                instance.control_endpoint()
            )));
        }

        let node = Arc::new(MockNode::new(instance.id.clone()));
        self.nodes.insert(instance.id.clone(), Arc::clone(&node));
        Ok(node)
    }
}
