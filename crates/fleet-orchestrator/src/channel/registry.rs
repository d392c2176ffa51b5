//! Registry of channels opened through the gateway

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use fleet_core::{ChannelId, FleetError, FundingReference, InstanceId};

const EVENT_CAPACITY: usize = 256;

/// A channel the orchestrator opened and still considers open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: ChannelId,
    /// Instance that opened the channel
    pub source: InstanceId,
    /// Counterpart public key, hex
    pub counterpart: String,
    pub funding: FundingReference,
}

/// Saved registry contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub channels: Vec<ChannelRecord>,
}

/// Registry change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An open completed and was recorded
    Opened(ChannelRecord),
    /// A close succeeded and the record was removed
    Closed(ChannelId),
    /// An open attempt ended without the channel opening
    Abandoned { channel_id: ChannelId, reason: String },
}

/// Channels keyed by caller-supplied id
pub struct ChannelRegistry {
    channels: DashMap<ChannelId, ChannelRecord>,
    events: broadcast::Sender<ChannelEvent>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            channels: DashMap::new(),
            events,
        }
    }

    /// Receive every subsequent registry change
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Record an opened channel; an existing record with the same id is replaced
    pub fn record_open(
        &self,
        channel_id: ChannelId,
        source: InstanceId,
        counterpart: impl Into<String>,
        funding: FundingReference,
    ) -> ChannelRecord {
        let record = ChannelRecord {
            channel_id,
            source,
            counterpart: counterpart.into(),
            funding,
        };
        if self.channels.insert(channel_id, record.clone()).is_some() {
            tracing::debug!(channel_id = %channel_id, "Replaced channel record");
        }
        tracing::info!(channel_id = %channel_id, source = %record.source, funding = %record.funding, "Channel open recorded");
        let _ = self.events.send(ChannelEvent::Opened(record.clone()));
        record
    }

    /// Remove the record for a closed channel
    pub fn record_close(&self, channel_id: ChannelId) -> Result<ChannelRecord, FleetError> {
        let (_, record) = self
            .channels
            .remove(&channel_id)
            .ok_or(FleetError::ChannelNotFound(channel_id))?;
        tracing::info!(channel_id = %channel_id, "Channel close recorded");
        let _ = self.events.send(ChannelEvent::Closed(channel_id));
        Ok(record)
    }

    /// Report an open attempt that will never produce a record
    pub fn abandon(&self, channel_id: ChannelId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(channel_id = %channel_id, %reason, "Channel open abandoned");
        let _ = self
            .events
            .send(ChannelEvent::Abandoned { channel_id, reason });
    }

    pub fn get(&self, channel_id: ChannelId) -> Result<ChannelRecord, FleetError> {
        self.channels
            .get(&channel_id)
            .map(|r| r.clone())
            .ok_or(FleetError::ChannelNotFound(channel_id))
    }

    /// All records, ordered by channel id
    pub fn list(&self) -> Vec<ChannelRecord> {
        let mut list: Vec<_> = self.channels.iter().map(|r| r.clone()).collect();
        list.sort_by_key(|r| r.channel_id);
        list
    }

    /// `"<id>: <source> -> <counterpart>"` entries joined by `,`
    pub fn listing(&self) -> String {
        self.list()
            .iter()
            .map(|r| format!("{}: {} -> {}", r.channel_id, r.source, r.counterpart))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&self) {
        self.channels.clear();
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            channels: self.list(),
        }
    }

    /// Replace the contents with `snapshot`
    pub fn restore(&self, snapshot: ChannelSnapshot) {
        self.channels.clear();
        for record in snapshot.channels {
            self.channels.insert(record.channel_id, record);
        }
        tracing::debug!(channels = self.channels.len(), "Restored channel registry");
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(registry: &ChannelRegistry, id: i64, source: &str) -> ChannelRecord {
        registry.record_open(
            ChannelId(id),
            InstanceId::new(source),
            format!("02{:064}", id),
            FundingReference::new(format!("{:064x}", id), 0),
        )
    }

    #[test]
    fn test_open_then_close() {
        let registry = ChannelRegistry::new();
        open(&registry, 7, "blast-0000");
        assert_eq!(registry.get(ChannelId(7)).unwrap().source.as_str(), "blast-0000");

        let record = registry.record_close(ChannelId(7)).unwrap();
        assert_eq!(record.channel_id, ChannelId(7));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_unknown_leaves_registry_unchanged() {
        let registry = ChannelRegistry::new();
        open(&registry, 1, "blast-0000");

        let result = registry.record_close(ChannelId(2));
        assert!(matches!(result, Err(FleetError::ChannelNotFound(ChannelId(2)))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_listing_format() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.listing(), "");

        registry.record_open(
            ChannelId(9),
            InstanceId::new("blast-0001"),
            "03bb",
            FundingReference::new("ff", 1),
        );
        registry.record_open(
            ChannelId(3),
            InstanceId::new("blast-0000"),
            "02aa",
            FundingReference::new("ee", 0),
        );

        assert_eq!(
            registry.listing(),
            "3: blast-0000 -> 02aa,9: blast-0001 -> 03bb"
        );
    }

    #[test]
    fn test_snapshot_restore_replaces_contents() {
        let registry = ChannelRegistry::new();
        open(&registry, 1, "blast-0000");
        open(&registry, 2, "blast-0001");
        let snapshot = registry.snapshot();

        let other = ChannelRegistry::new();
        open(&other, 99, "blast-0009");
        other.restore(snapshot.clone());

        assert_eq!(other.snapshot(), snapshot);
        assert!(other.get(ChannelId(99)).is_err());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let registry = ChannelRegistry::new();
        open(&registry, 5, "blast-0000");
        let json = serde_json::to_string(&registry.snapshot()).unwrap();
        assert!(json.starts_with(r#"{"channels":[{"channel_id":5,"source":"blast-0000""#));
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let registry = ChannelRegistry::new();
        let mut events = registry.subscribe();

        open(&registry, 4, "blast-0000");
        registry.record_close(ChannelId(4)).unwrap();
        registry.abandon(ChannelId(5), "stream closed");

        assert!(matches!(events.recv().await.unwrap(), ChannelEvent::Opened(r) if r.channel_id == ChannelId(4)));
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Closed(ChannelId(4)));
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Abandoned { channel_id: ChannelId(5), .. }
        ));
    }
}
