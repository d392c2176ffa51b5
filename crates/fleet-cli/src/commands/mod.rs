//! CLI command implementations

mod channel;
mod config;
mod fleet;
mod node;
mod status;

pub use channel::{close_channel_command, managed_channels_command, open_channel_command};
pub use config::{config_get, config_init, config_set, config_show};
pub use fleet::{load_command, save_command, start_command, stop_command};
pub use node::{node_query_command, peer_command, PeerAction};
pub use status::{list_command, manifest_command, status_command};
