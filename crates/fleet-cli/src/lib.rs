//! lnfleet: Command-line interface for the fleet orchestrator
//!
//! Provides the `lnfleet` CLI for running the orchestrator and driving a
//! running fleet over IPC.

pub mod commands;
pub mod ipc;
pub mod output;
