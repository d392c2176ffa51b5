//! Registry of live node control connections

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use fleet_core::error::ConnectionError;
use fleet_core::traits::{NodeConnector, NodeControl};
use fleet_core::{FleetError, Instance, InstanceId};

/// Live control channel to exactly one instance
pub struct NodeConnection {
    /// Instance this connection belongs to
    pub instance: Arc<Instance>,
    /// Control client
    pub client: Arc<dyn NodeControl>,
    /// Cancelled once the handle is replaced or removed
    pub retired: CancellationToken,
    /// When the connection was established
    pub connected_at: Instant,
}

impl NodeConnection {
    pub fn new(instance: Arc<Instance>, client: Arc<dyn NodeControl>) -> Self {
        Self {
            instance,
            client,
            retired: CancellationToken::new(),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.instance.id
    }

    pub fn is_retired(&self) -> bool {
        self.retired.is_cancelled()
    }
}

/// Result of connecting a set of instances
#[derive(Debug, Default)]
pub struct ConnectReport {
    pub connected: Vec<InstanceId>,
    pub failed: Vec<(InstanceId, String)>,
}

/// At most one live connection per instance
pub struct ConnectionRegistry {
    connections: DashMap<InstanceId, Arc<NodeConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Store a connection, retiring whatever handle the instance had before
    pub fn insert(
        &self,
        instance: Arc<Instance>,
        client: Arc<dyn NodeControl>,
    ) -> Arc<NodeConnection> {
        let conn = Arc::new(NodeConnection::new(instance, client));
        if let Some(old) = self
            .connections
            .insert(conn.id().clone(), Arc::clone(&conn))
        {
            tracing::debug!(instance = %old.id(), "Replacing connection");
            old.retired.cancel();
        }
        conn
    }

    /// Live connection for `id`
    pub fn lookup(&self, id: &InstanceId) -> Result<Arc<NodeConnection>, FleetError> {
        self.connections
            .get(id)
            .map(|c| Arc::clone(&c))
            .ok_or_else(|| FleetError::NotConnected(id.clone()))
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.connections.contains_key(id)
    }

    /// Drop and retire the connection for `id`
    pub fn remove(&self, id: &InstanceId) -> Option<Arc<NodeConnection>> {
        let (_, conn) = self.connections.remove(id)?;
        conn.retired.cancel();
        Some(conn)
    }

    /// All connections, ordered by instance id
    pub fn list(&self) -> Vec<Arc<NodeConnection>> {
        let mut list: Vec<_> = self.connections.iter().map(|c| Arc::clone(&c)).collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Retire and drop every connection
    pub fn clear(&self) {
        for conn in self.connections.iter() {
            conn.retired.cancel();
        }
        self.connections.clear();
    }

    /// Connect one instance and store the handle
    pub async fn connect(
        &self,
        instance: Arc<Instance>,
        connector: &dyn NodeConnector,
    ) -> Result<Arc<NodeConnection>, ConnectionError> {
        let client = connector.connect(&instance).await?;
        tracing::info!(instance = %instance.id, endpoint = %instance.control_endpoint(), "Connected to node");
        Ok(self.insert(instance, client))
    }

    /// Connect every instance in parallel. Failures are logged and skipped.
    pub async fn connect_all(
        &self,
        instances: Vec<Arc<Instance>>,
        connector: Arc<dyn NodeConnector>,
    ) -> ConnectReport {
        let mut tasks = JoinSet::new();
        for instance in instances {
            let connector = Arc::clone(&connector);
            tasks.spawn(async move {
                let result = connector.connect(&instance).await;
                (instance, result)
            });
        }

        let mut report = ConnectReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((instance, Ok(client))) => {
                    tracing::info!(instance = %instance.id, "Connected to node");
                    report.connected.push(instance.id.clone());
                    self.insert(instance, client);
                }
                Ok((instance, Err(e))) => {
                    tracing::warn!(instance = %instance.id, error = %e, "Error connecting to node");
                    report.failed.push((instance.id.clone(), e.to_string()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Connect task failed");
                }
            }
        }

        report.connected.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockConnector, MockNode};
    use std::path::{Path, PathBuf};

    fn instance(index: usize) -> Arc<Instance> {
        Arc::new(Instance::new(
            InstanceId::numbered("blast", index),
            PathBuf::from(format!("/fleet/lnd{:04}", index)),
            10000 + index as u16,
            20000 + index as u16,
            Path::new("tls.cert"),
            Path::new("admin.macaroon"),
        ))
    }

    #[test]
    fn test_lookup_missing_is_not_connected() {
        let registry = ConnectionRegistry::new();
        let result = registry.lookup(&InstanceId::new("blast-0000"));
        assert!(matches!(result, Err(FleetError::NotConnected(id)) if id.as_str() == "blast-0000"));
    }

    #[test]
    fn test_insert_retires_previous_handle() {
        let registry = ConnectionRegistry::new();
        let inst = instance(0);

        let first = registry.insert(
            Arc::clone(&inst),
            Arc::new(MockNode::new(inst.id.clone())),
        );
        let second = registry.insert(
            Arc::clone(&inst),
            Arc::new(MockNode::new(inst.id.clone())),
        );

        assert!(first.is_retired());
        assert!(!second.is_retired());
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.lookup(&inst.id).unwrap(), &second));
    }

    #[test]
    fn test_remove_and_clear_retire() {
        let registry = ConnectionRegistry::new();
        let a = registry.insert(instance(0), Arc::new(MockNode::new(InstanceId::new("blast-0000"))));
        let b = registry.insert(instance(1), Arc::new(MockNode::new(InstanceId::new("blast-0001"))));

        let removed = registry.remove(a.id()).unwrap();
        assert!(removed.is_retired());
        assert!(!registry.contains(a.id()));

        registry.clear();
        assert!(b.is_retired());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_connect_all_is_best_effort() {
        let registry = ConnectionRegistry::new();
        let connector = Arc::new(MockConnector::new());
        connector.refuse(&InstanceId::new("blast-0001"));

        let report = registry
            .connect_all((0..3).map(instance).collect(), connector.clone())
            .await;

        assert_eq!(
            report.connected,
            vec![InstanceId::new("blast-0000"), InstanceId::new("blast-0002")]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, InstanceId::new("blast-0001"));
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup(&InstanceId::new("blast-0001")).is_err());

        let ids: Vec<_> = registry.list().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec!["blast-0000", "blast-0002"]);
    }

    #[tokio::test]
    async fn test_connect_single() {
        let registry = ConnectionRegistry::new();
        let connector = MockConnector::new();

        let conn = registry.connect(instance(4), &connector).await.unwrap();
        assert_eq!(conn.id().as_str(), "blast-0004");
        assert!(registry.lookup(conn.id()).is_ok());
    }
}
