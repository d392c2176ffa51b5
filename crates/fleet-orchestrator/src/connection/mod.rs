//! Connection management

mod backoff;
mod registry;

pub use backoff::ExponentialBackoff;
pub use registry::{ConnectReport, ConnectionRegistry, NodeConnection};
