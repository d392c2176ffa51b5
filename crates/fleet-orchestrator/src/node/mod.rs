//! Node processes: configuration, launching and control transport

mod launcher;
mod materialize;
mod rest;

pub use launcher::ProcessLauncher;
pub use materialize::{ConfigMaterializer, NodeConfigFile, RestoredNode, DEFAULT_TEMPLATE};
pub use rest::{RestConnector, RestNodeClient};
