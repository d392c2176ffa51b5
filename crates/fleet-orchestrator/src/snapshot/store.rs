//! Named simulation snapshots on disk

use std::path::{Path, PathBuf};

use fleet_core::error::SnapshotError;
use fleet_core::FleetError;

use super::archive;
use crate::channel::ChannelSnapshot;

/// Where a saved simulation ended up
#[derive(Debug, Clone)]
pub struct SavedSnapshot {
    pub archive: PathBuf,
    pub channels: PathBuf,
    pub files: usize,
}

/// Saves and restores fleets under `<snapshot_dir>/<sim>/<model_name>/`
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    model_name: String,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            model_name: model_name.into(),
        }
    }

    /// Reject simulation names that are not a single plain path component
    pub fn validate_name(sim: &str) -> Result<(), FleetError> {
        let plain = !sim.is_empty()
            && sim != "."
            && sim != ".."
            && !sim.contains(['/', '\\'])
            && !sim.chars().any(char::is_control);
        if plain {
            Ok(())
        } else {
            Err(FleetError::InvalidArgument(format!(
                "invalid simulation name {:?}",
                sim
            )))
        }
    }

    /// Directory holding one simulation's files
    pub fn sim_dir(&self, sim: &str) -> PathBuf {
        self.root.join(sim).join(&self.model_name)
    }

    pub fn archive_path(&self, sim: &str) -> PathBuf {
        self.sim_dir(sim).join(format!("{}.tar.gz", sim))
    }

    pub fn channels_path(&self, sim: &str) -> PathBuf {
        self.sim_dir(sim).join(format!("{}_channels.json", sim))
    }

    pub fn exists(&self, sim: &str) -> bool {
        self.archive_path(sim).is_file() && self.channels_path(sim).is_file()
    }

    /// Archive `fleet_root` and write the channel snapshot beside it.
    ///
    /// Both files are written to temporary siblings first and only renamed
    /// into place once both writes succeeded, so a failed save leaves an
    /// earlier snapshot of the same name intact.
    pub async fn save(
        &self,
        fleet_root: &Path,
        sim: &str,
        channels: &ChannelSnapshot,
    ) -> Result<SavedSnapshot, SnapshotError> {
        let archive_path = self.archive_path(sim);
        let channels_path = self.channels_path(sim);
        let channels_json = serde_json::to_vec_pretty(channels)?;

        let root = fleet_root.to_path_buf();
        let dest = archive_path.clone();
        let (archive_partial, files) =
            tokio::task::spawn_blocking(move || archive::pack_partial(&root, &dest))
                .await
                .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))??;

        let channels_partial = archive::partial_path(&channels_path);
        let committed: std::io::Result<()> = async {
            tokio::fs::write(&channels_partial, &channels_json).await?;
            tokio::fs::rename(&archive_partial, &archive_path).await?;
            tokio::fs::rename(&channels_partial, &channels_path).await
        }
        .await;

        if let Err(e) = committed {
            let _ = tokio::fs::remove_file(&archive_partial).await;
            let _ = tokio::fs::remove_file(&channels_partial).await;
            return Err(e.into());
        }

        tracing::info!(
            sim,
            files,
            channels = channels.channels.len(),
            archive = %archive_path.display(),
            "Saved simulation"
        );
        Ok(SavedSnapshot {
            archive: archive_path,
            channels: channels_path,
            files,
        })
    }

    /// Unpack a saved simulation into `destination_root`
    pub async fn restore(&self, sim: &str, destination_root: &Path) -> Result<usize, SnapshotError> {
        let archive_path = self.archive_path(sim);
        let dest = destination_root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || archive::unpack_into(&archive_path, &dest))
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))??;

        tracing::info!(sim, files, dest = %destination_root.display(), "Unpacked simulation");
        Ok(files)
    }

    /// Read a saved channel snapshot
    pub async fn load_channels(&self, sim: &str) -> Result<ChannelSnapshot, SnapshotError> {
        let path = self.channels_path(sim);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRecord;
    use fleet_core::{ChannelId, FundingReference, InstanceId};
    use tempfile::TempDir;

    fn channels() -> ChannelSnapshot {
        ChannelSnapshot {
            channels: vec![ChannelRecord {
                channel_id: ChannelId(7),
                source: InstanceId::new("blast-0000"),
                counterpart: "02aa".to_string(),
                funding: FundingReference::new("ab", 0),
            }],
        }
    }

    #[test]
    fn test_paths() {
        let store = SnapshotStore::new("/sims", "blast_lnd");
        assert_eq!(
            store.archive_path("sim-a"),
            PathBuf::from("/sims/sim-a/blast_lnd/sim-a.tar.gz")
        );
        assert_eq!(
            store.channels_path("sim-a"),
            PathBuf::from("/sims/sim-a/blast_lnd/sim-a_channels.json")
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(SnapshotStore::validate_name("sim-a").is_ok());
        assert!(SnapshotStore::validate_name("").is_err());
        assert!(SnapshotStore::validate_name("..").is_err());
        assert!(SnapshotStore::validate_name("a/b").is_err());
    }

    #[tokio::test]
    async fn test_save_and_restore() {
        let fleet = TempDir::new().unwrap();
        let sims = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::create_dir_all(fleet.path().join("lnd0000")).unwrap();
        std::fs::write(fleet.path().join("lnd0000/lnd.conf"), b"alias=blast-0000\n").unwrap();

        let store = SnapshotStore::new(sims.path(), "blast_lnd");
        let saved = store.save(fleet.path(), "sim-a", &channels()).await.unwrap();
        assert_eq!(saved.files, 1);
        assert!(store.exists("sim-a"));

        let restored = store.restore("sim-a", dest.path()).await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(
            std::fs::read(dest.path().join("lnd0000/lnd.conf")).unwrap(),
            b"alias=blast-0000\n"
        );
        assert_eq!(store.load_channels("sim-a").await.unwrap(), channels());
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let sims = TempDir::new().unwrap();
        let store = SnapshotStore::new(sims.path(), "blast_lnd");

        assert!(matches!(
            store.load_channels("nope").await,
            Err(SnapshotError::NotFound(_))
        ));
        assert!(matches!(
            store.restore("nope", sims.path()).await,
            Err(SnapshotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_nothing_behind() {
        let sims = TempDir::new().unwrap();
        let store = SnapshotStore::new(sims.path(), "blast_lnd");
        let missing_root = sims.path().join("no-such-fleet");

        let result = store.save(&missing_root, "sim-b", &channels()).await;
        assert!(result.is_err());
        assert!(!store.archive_path("sim-b").exists());
        assert!(!archive::partial_path(&store.archive_path("sim-b")).exists());
        assert!(!store.channels_path("sim-b").exists());
    }

    #[tokio::test]
    async fn test_failed_resave_keeps_previous_snapshot() {
        let fleet = TempDir::new().unwrap();
        let sims = TempDir::new().unwrap();
        std::fs::create_dir_all(fleet.path().join("lnd0000")).unwrap();
        std::fs::write(fleet.path().join("lnd0000/lnd.conf"), b"alias=blast-0000\n").unwrap();

        let store = SnapshotStore::new(sims.path(), "blast_lnd");
        store.save(fleet.path(), "sim-a", &channels()).await.unwrap();
        let archive_before = std::fs::read(store.archive_path("sim-a")).unwrap();
        let channels_before = std::fs::read(store.channels_path("sim-a")).unwrap();

        // A directory squatting on the channel file's temporary path makes the
        // second save fail after its archive was written
        let channels_partial = archive::partial_path(&store.channels_path("sim-a"));
        std::fs::create_dir_all(&channels_partial).unwrap();
        std::fs::write(fleet.path().join("lnd0000/extra"), b"later").unwrap();

        let result = store.save(fleet.path(), "sim-a", &ChannelSnapshot::default()).await;
        assert!(result.is_err());

        assert_eq!(std::fs::read(store.archive_path("sim-a")).unwrap(), archive_before);
        assert_eq!(std::fs::read(store.channels_path("sim-a")).unwrap(), channels_before);
        assert!(!archive::partial_path(&store.archive_path("sim-a")).exists());
        assert_eq!(store.load_channels("sim-a").await.unwrap(), channels());
    }
}
