//! IPC client for communicating with the orchestrator
//!
//! Uses TCP on localhost, one JSON request per line.

mod client;

pub use client::FleetClient;

// Re-export constants and types from fleet_core
pub use fleet_core::ipc::{
    default_ipc_address, ErrorInfo, FleetStatus, InstanceInfo, StartSummary, DEFAULT_IPC_PORT,
};
pub use fleet_core::manifest::FleetManifest;
