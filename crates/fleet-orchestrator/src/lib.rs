//! fleet-orchestrator: Local daemon running a fleet of Lightning nodes
//!
//! The orchestrator allocates ports and working directories, launches node
//! processes, connects to their control interfaces, routes control requests
//! to the right node, and saves or restores whole fleets. It provides the
//! IPC interface for the CLI.

pub mod channel;
pub mod connection;
pub mod coordinator;
pub mod gateway;
pub mod instances;
pub mod ipc;
pub mod node;
pub mod ports;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod test_support;

pub use coordinator::FleetCoordinator;
pub use gateway::FleetGateway;
pub use state::FleetState;
