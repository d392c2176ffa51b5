//! Instance table and lifecycle state

use dashmap::DashMap;
use std::sync::Arc;

use fleet_core::ipc::InstanceInfo;
use fleet_core::{Instance, InstanceId, InstanceState};

struct InstanceEntry {
    instance: Arc<Instance>,
    state: InstanceState,
}

/// All instances of the current fleet with their lifecycle state
pub struct InstanceTable {
    entries: DashMap<InstanceId, InstanceEntry>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register an instance as `Unstarted`, replacing any previous entry
    pub fn insert(&self, instance: Instance) -> Arc<Instance> {
        let instance = Arc::new(instance);
        self.entries.insert(
            instance.id.clone(),
            InstanceEntry {
                instance: Arc::clone(&instance),
                state: InstanceState::Unstarted,
            },
        );
        instance
    }

    pub fn get(&self, id: &InstanceId) -> Option<Arc<Instance>> {
        self.entries.get(id).map(|e| Arc::clone(&e.instance))
    }

    pub fn state(&self, id: &InstanceId) -> Option<InstanceState> {
        self.entries.get(id).map(|e| e.state)
    }

    /// Move an instance to `state`; false if the instance is unknown
    pub fn set_state(&self, id: &InstanceId, state: InstanceState) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                tracing::trace!(instance = %id, from = %entry.state, to = %state, "State change");
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Record that an instance's process exited on its own.
    ///
    /// Instances already marked `Stopped` stay stopped.
    pub fn mark_exited(&self, id: &InstanceId, stopping: bool) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if entry.state != InstanceState::Stopped {
                entry.state = if stopping {
                    InstanceState::Stopped
                } else {
                    InstanceState::Unreachable
                };
            }
        }
    }

    /// Move every instance to `state`
    pub fn mark_all(&self, state: InstanceState) {
        for mut entry in self.entries.iter_mut() {
            entry.state = state;
        }
    }

    /// All instances, ordered by id
    pub fn instances(&self) -> Vec<Arc<Instance>> {
        let mut instances: Vec<_> = self
            .entries
            .iter()
            .map(|e| Arc::clone(&e.instance))
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    /// Per-instance summary, ordered by id
    pub fn info(&self) -> Vec<InstanceInfo> {
        let mut info: Vec<InstanceInfo> = self
            .entries
            .iter()
            .map(|e| InstanceInfo {
                id: e.instance.id.to_string(),
                state: e.state,
                listen_address: e.instance.listen_address(),
                control_endpoint: e.instance.control_endpoint(),
                workdir: e.instance.workdir.display().to_string(),
            })
            .collect();
        info.sort_by(|a, b| a.id.cmp(&b.id));
        info
    }

    /// Number of instances currently in `state`
    pub fn count_in(&self, state: InstanceState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for InstanceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn instance(index: usize) -> Instance {
        Instance::new(
            InstanceId::numbered("blast", index),
            PathBuf::from(format!("/fleet/lnd{:04}", index)),
            10000 + index as u16,
            20000 + index as u16,
            Path::new("tls.cert"),
            Path::new("admin.macaroon"),
        )
    }

    #[test]
    fn test_insert_starts_unstarted() {
        let table = InstanceTable::new();
        table.insert(instance(0));
        assert_eq!(
            table.state(&InstanceId::new("blast-0000")),
            Some(InstanceState::Unstarted)
        );
    }

    #[test]
    fn test_instances_sorted() {
        let table = InstanceTable::new();
        table.insert(instance(2));
        table.insert(instance(0));
        table.insert(instance(1));

        let ids: Vec<String> = table.instances().iter().map(|i| i.id.to_string()).collect();
        assert_eq!(ids, vec!["blast-0000", "blast-0001", "blast-0002"]);
        assert_eq!(table.info()[2].listen_address, "localhost:10002");
    }

    #[test]
    fn test_mark_exited_respects_stopped() {
        let table = InstanceTable::new();
        let a = table.insert(instance(0));
        let b = table.insert(instance(1));
        table.set_state(&a.id, InstanceState::Connected);
        table.set_state(&b.id, InstanceState::Stopped);

        table.mark_exited(&a.id, false);
        table.mark_exited(&b.id, false);
        assert_eq!(table.state(&a.id), Some(InstanceState::Unreachable));
        assert_eq!(table.state(&b.id), Some(InstanceState::Stopped));
    }

    #[test]
    fn test_mark_all_and_count() {
        let table = InstanceTable::new();
        table.insert(instance(0));
        table.insert(instance(1));
        table.mark_all(InstanceState::Stopped);
        assert_eq!(table.count_in(InstanceState::Stopped), 2);
        assert!(!table.set_state(&InstanceId::new("missing"), InstanceState::Running));
    }
}
