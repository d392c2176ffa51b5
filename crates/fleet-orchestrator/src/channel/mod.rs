//! Managed channel tracking

mod listener;
mod registry;

pub use listener::{spawn_open_listener, OpenAttempt};
pub use registry::{ChannelEvent, ChannelRecord, ChannelRegistry, ChannelSnapshot};
