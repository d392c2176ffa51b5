//! Shared fleet state

use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;

use fleet_core::config::FleetConfig;

use crate::channel::ChannelRegistry;
use crate::connection::ConnectionRegistry;
use crate::instances::InstanceTable;
use crate::ports::PortLedger;

/// Tables shared by the gateway, the coordinator and the IPC server
pub struct FleetState {
    /// Configuration
    pub config: FleetConfig,
    /// Known instances and their lifecycle state
    pub instances: Arc<InstanceTable>,
    /// Live control connections
    pub connections: Arc<ConnectionRegistry>,
    /// Channels opened through the gateway
    pub channels: Arc<ChannelRegistry>,
    /// Ports handed out to instances
    pub ledger: Arc<PortLedger>,
    /// Background open-channel listeners
    pub listeners: TaskTracker,
    /// When the orchestrator started
    pub started_at: Instant,
}

impl FleetState {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            config,
            instances: Arc::new(InstanceTable::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            channels: Arc::new(ChannelRegistry::new()),
            ledger: Arc::new(PortLedger::new()),
            listeners: TaskTracker::new(),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the orchestrator started
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
