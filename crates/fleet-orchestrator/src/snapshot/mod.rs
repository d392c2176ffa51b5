//! Fleet snapshots: archived fleet root plus channel registry

mod archive;
mod store;

pub use archive::{pack_dir, unpack_into};
pub use store::{SavedSnapshot, SnapshotStore};
