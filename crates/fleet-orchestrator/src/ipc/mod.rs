//! IPC server for CLI communication
//!
//! Provides a localhost TCP server that the CLI uses to drive the running
//! orchestrator daemon.

mod server;

pub use server::{handle_request, IpcServer};
