//! Fleet manifest (`sim.json`)
//!
//! Lists every instance with the endpoint and credential paths an external
//! traffic generator needs to talk to it directly.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SnapshotError;
use crate::types::Instance;

/// File name of the manifest inside the fleet root
pub const MANIFEST_FILE: &str = "sim.json";

/// One instance as listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub id: String,
    pub address: String,
    pub macaroon: String,
    pub cert: String,
}

impl From<&Instance> for ManifestNode {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id.to_string(),
            address: instance.control_endpoint(),
            macaroon: instance.credentials.macaroon.display().to_string(),
            cert: instance.credentials.tls_cert.display().to_string(),
        }
    }
}

/// All instances of a fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetManifest {
    pub nodes: Vec<ManifestNode>,
}

impl FleetManifest {
    /// Build a manifest, ordered by instance id
    pub fn from_instances<'a>(instances: impl IntoIterator<Item = &'a Instance>) -> Self {
        let mut nodes: Vec<ManifestNode> = instances.into_iter().map(ManifestNode::from).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Self { nodes }
    }

    pub fn find(&self, id: &str) -> Option<&ManifestNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Write the manifest as pretty JSON
    pub fn write_to(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a manifest written by [`FleetManifest::write_to`]
    pub fn read_from(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceId;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn instance(index: usize, control_port: u16) -> Instance {
        Instance::new(
            InstanceId::numbered("blast", index),
            PathBuf::from(format!("/fleet/lnd{:04}", index)),
            control_port + 1,
            control_port,
            Path::new("tls.cert"),
            Path::new("admin.macaroon"),
        )
    }

    #[test]
    fn test_manifest_sorted_by_id() {
        let a = instance(1, 10010);
        let b = instance(0, 10000);
        let manifest = FleetManifest::from_instances([&a, &b]);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.nodes[0].id, "blast-0000");
        assert_eq!(manifest.nodes[0].address, "localhost:10000");
        assert_eq!(manifest.nodes[0].cert, "/fleet/lnd0000/tls.cert");
    }

    #[test]
    fn test_write_and_read_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let manifest = FleetManifest::from_instances([&instance(0, 10000)]);

        manifest.write_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#""nodes""#));

        let loaded = FleetManifest::read_from(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.find("blast-0000").is_some());
    }

    #[test]
    fn test_read_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let result = FleetManifest::read_from(&dir.path().join(MANIFEST_FILE));
        assert!(matches!(result, Err(SnapshotError::NotFound(_))));
    }
}
