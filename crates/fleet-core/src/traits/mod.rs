//! Core trait definitions

mod node;

pub use node::{
    NodeConnector, NodeControl, OpenChannelParams, OpenStatusStream, OpenStatusUpdate,
};
