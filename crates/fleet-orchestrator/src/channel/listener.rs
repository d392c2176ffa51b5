//! Background consumer of a node's open-channel status stream

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use fleet_core::traits::{OpenStatusStream, OpenStatusUpdate};
use fleet_core::{ChannelId, InstanceId};

use super::ChannelRegistry;

/// What the listener records once the channel opens
#[derive(Debug, Clone)]
pub struct OpenAttempt {
    pub channel_id: ChannelId,
    pub source: InstanceId,
    pub counterpart: String,
}

/// Follow `updates` until the channel opens, the stream ends, or `cancel`
/// fires. Only an `Open` update produces a record.
pub fn spawn_open_listener(
    tracker: &TaskTracker,
    registry: Arc<ChannelRegistry>,
    attempt: OpenAttempt,
    mut updates: OpenStatusStream,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tracker.spawn(async move {
        let id = attempt.channel_id;
        loop {
            let next = tokio::select! {
                update = updates.next() => update,
                _ = cancel.cancelled() => {
                    registry.abandon(id, "connection closed while opening");
                    return;
                }
            };

            match next {
                Some(Ok(OpenStatusUpdate::Pending { funding })) => {
                    tracing::debug!(channel_id = %id, source = %attempt.source, %funding, "Channel pending");
                }
                Some(Ok(OpenStatusUpdate::PsbtFund)) => {
                    tracing::trace!(channel_id = %id, "Ignoring funding negotiation update");
                }
                Some(Ok(OpenStatusUpdate::Open { funding })) => {
                    registry.record_open(id, attempt.source, attempt.counterpart, funding);
                    return;
                }
                Some(Err(e)) => {
                    registry.abandon(id, e.to_string());
                    return;
                }
                None => {
                    registry.abandon(id, "status stream ended before the channel opened");
                    return;
                }
            }
        }
    })
}
