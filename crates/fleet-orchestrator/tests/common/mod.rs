//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::{FleetConfig, NodeConfig};
use fleet_orchestrator::FleetCoordinator;

#[path = "../../src/test_support.rs"]
pub mod test_support;

use test_support::MockConnector;

/// Config for a fleet of `sleep` processes under `root` with no pacing
pub fn sleep_fleet_config(root: &Path, fleet_dir: &str) -> FleetConfig {
    let mut config = FleetConfig {
        data_dir: root.join(fleet_dir),
        snapshot_dir: root.join("sims"),
        remove_data_on_exit: true,
        node: NodeConfig {
            binary: "sleep".into(),
            args: vec!["600".to_string()],
            ..NodeConfig::default()
        },
        ..FleetConfig::default()
    };
    config.launch.batch_pause = Duration::ZERO;
    config.launch.stop_grace = Duration::from_millis(200);
    config.connect.settle_delay = Duration::ZERO;
    config
}

/// Coordinator over mock node connections
pub fn mock_coordinator(config: FleetConfig) -> (Arc<FleetCoordinator>, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new());
    let coordinator = FleetCoordinator::new(config, connector.clone())
        .expect("Failed to create coordinator");
    (Arc::new(coordinator), connector)
}
