//! fleet-core: Core abstractions and configuration for lnfleet
//!
//! This crate provides the shared domain types, error taxonomy, configuration
//! structures, IPC protocol and node-control traits used by the orchestrator
//! daemon and the CLI.

pub mod config;
pub mod error;
pub mod ipc;
pub mod manifest;
pub mod traits;
pub mod types;

pub use error::{ErrorKind, FleetError};
pub use types::{ChannelId, FundingReference, Instance, InstanceId, InstanceState};
