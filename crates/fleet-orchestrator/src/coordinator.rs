//! Fleet lifecycle coordination
//!
//! The `FleetCoordinator` owns every step that changes which instances exist:
//! starting a fresh fleet, restoring a saved one, saving, stopping and the
//! final teardown. It wraps the shared fleet tables behind a single RwLock so
//! these multi-step operations cannot interleave.
//!
//! # Atomicity Model
//!
//! Gateway calls (identity, channel opens, peer management) do not take the
//! lock; they only need the connection registry, which is safe for concurrent
//! use on its own. Lifecycle operations take the write lock for their whole
//! duration, and status queries take the read lock so they never observe a
//! half-started fleet.
//!
//! This prevents races such as:
//! - Two start requests allocating overlapping instance ids
//! - A save archiving the fleet root while a load is unpacking into it
//! - A teardown removing working directories of instances still launching

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use fleet_core::config::{FleetConfig, NodeConfig};
use fleet_core::error::ConfigError;
use fleet_core::ipc::{FleetStatus, InstanceInfo, StartSummary};
use fleet_core::manifest::{FleetManifest, MANIFEST_FILE};
use fleet_core::traits::NodeConnector;
use fleet_core::types::pad_index;
use fleet_core::{FleetError, Instance, InstanceId, InstanceState};

use crate::connection::ConnectReport;
use crate::gateway::{FleetGateway, StopReport};
use crate::node::{ConfigMaterializer, NodeConfigFile, ProcessLauncher, RestConnector};
use crate::ports::PortAllocator;
use crate::snapshot::{SavedSnapshot, SnapshotStore};
use crate::state::FleetState;

/// Serializes fleet lifecycle operations over the shared fleet state.
///
/// # Usage
///
/// ```ignore
/// let coordinator = FleetCoordinator::with_rest(config)?;
/// let summary = coordinator.start_nodes(3).await?;
/// coordinator.gateway().open_channel("blast-0000", &pubkey, 100_000, 0, ChannelId(7)).await?;
/// coordinator.save("sim-a").await?;
/// coordinator.stop_fleet().await;
/// coordinator.teardown().await;
/// ```
pub struct FleetCoordinator {
    /// RwLock for lifecycle exclusivity.
    /// The unit type `()` indicates this lock is purely for coordination,
    /// not for protecting any specific data.
    inner: RwLock<()>,

    /// Tables shared with the gateway and the IPC server
    state: Arc<FleetState>,
    gateway: FleetGateway,
    launcher: ProcessLauncher,
    connector: Arc<dyn NodeConnector>,
    materializer: ConfigMaterializer,
    allocator: PortAllocator,
    snapshots: SnapshotStore,
    shutdown: CancellationToken,
}

impl FleetCoordinator {
    /// Create a coordinator that reaches nodes through `connector`
    pub fn new(config: FleetConfig, connector: Arc<dyn NodeConnector>) -> Result<Self, FleetError> {
        config.validate()?;

        let materializer = ConfigMaterializer::from_config(&config)?;
        let snapshots = SnapshotStore::new(config.snapshot_dir.clone(), config.model_name.clone());
        let state = Arc::new(FleetState::new(config));
        let launcher = ProcessLauncher::new(&state.config.node, Arc::clone(&state.instances));
        let allocator =
            PortAllocator::new(Arc::clone(&state.ledger), state.config.ports.max_attempts);

        Ok(Self {
            inner: RwLock::new(()),
            gateway: FleetGateway::new(Arc::clone(&state)),
            state,
            launcher,
            connector,
            materializer,
            allocator,
            snapshots,
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a coordinator that talks to nodes over their REST gateway
    pub fn with_rest(config: FleetConfig) -> Result<Self, FleetError> {
        let connector = Arc::new(RestConnector::new(config.connect.clone()));
        Self::new(config, connector)
    }

    /// Acquire a read lock for a consistent view of the fleet
    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().await
    }

    /// Acquire the write lock for an exclusive lifecycle change
    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write().await
    }

    pub fn state(&self) -> &Arc<FleetState> {
        &self.state
    }

    pub fn config(&self) -> &FleetConfig {
        &self.state.config
    }

    /// Request router over the live connections
    pub fn gateway(&self) -> &FleetGateway {
        &self.gateway
    }

    /// Cancelled once a fleet-wide stop was requested
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn fleet_root(&self) -> &Path {
        &self.state.config.data_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.fleet_root().join(MANIFEST_FILE)
    }

    fn ensure_idle(&self) -> Result<(), FleetError> {
        let count = self.state.instances.len();
        if count > 0 {
            return Err(FleetError::FleetActive(count));
        }
        if self.shutdown.is_cancelled() {
            return Err(FleetError::InvalidArgument(
                "fleet is shutting down".to_string(),
            ));
        }
        Ok(())
    }

    /// Start `count` fresh instances and connect to them.
    ///
    /// A configuration or allocation failure aborts the remaining instances;
    /// instances already launched keep running. A launch failure only marks
    /// that instance unreachable.
    pub async fn start_nodes(&self, count: usize) -> Result<StartSummary, FleetError> {
        let _lock = self.write().await;
        self.ensure_idle()?;
        if count == 0 {
            return Err(FleetError::InvalidArgument(
                "node count must be at least 1".to_string(),
            ));
        }

        let node = &self.state.config.node;
        tracing::info!(count, root = %self.fleet_root().display(), "Starting fleet");

        let mut summary = StartSummary {
            requested: count,
            started: 0,
            connected: 0,
        };
        let mut launched = Vec::with_capacity(count);

        for index in 0..count {
            let id = InstanceId::numbered(&node.alias_prefix, index);
            let workdir = self
                .fleet_root()
                .join(format!("{}{}", node.dir_prefix, pad_index(index)));

            let ports = self.allocator.allocate(&id, 2)?;
            let instance = Instance::new(
                id,
                workdir,
                ports[0],
                ports[1],
                &node.tls_cert_name,
                &node.macaroon_path,
            );

            if let Err(e) = self.materializer.materialize(&instance) {
                self.state.ledger.release_owner(&instance.id);
                tracing::error!(instance = %instance.id, error = %e, "Aborting fleet start");
                return Err(e.into());
            }

            let instance = self.state.instances.insert(instance);
            if self.launch_one(&instance) {
                summary.started += 1;
                launched.push(instance);
            }

            self.pace(index + 1, count).await;
        }

        self.write_manifest();

        let report = self.connect_launched(launched).await;
        summary.connected = report.connected.len();

        let settle = self.state.config.connect.settle_delay;
        if !settle.is_zero() && summary.connected > 0 {
            tracing::debug!(?settle, "Waiting for nodes to settle");
            tokio::time::sleep(settle).await;
        }

        tracing::info!(
            requested = summary.requested,
            started = summary.started,
            connected = summary.connected,
            "Fleet started"
        );
        Ok(summary)
    }

    /// Restore the simulation `sim` and connect to its instances.
    ///
    /// Nothing is launched when unpacking or parsing fails.
    pub async fn load(&self, sim: &str) -> Result<StartSummary, FleetError> {
        let _lock = self.write().await;
        SnapshotStore::validate_name(sim)?;
        self.ensure_idle()?;

        let channels = self.snapshots.load_channels(sim).await?;

        let root = self.fleet_root().to_path_buf();
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => tracing::debug!(root = %root.display(), "Cleared stale fleet root"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.snapshots.restore(sim, &root).await?;

        let node = self.state.config.node.clone();
        let materializer = self.materializer.clone();
        let instances = tokio::task::spawn_blocking(move || {
            let instances = discover_instances(&root, &node)?;
            for instance in &instances {
                materializer.materialize(instance)?;
            }
            Ok::<_, FleetError>(instances)
        })
        .await
        .map_err(|e| FleetError::Io(std::io::Error::other(e)))??;

        if instances.is_empty() {
            return Err(FleetError::Config(ConfigError::Invalid(format!(
                "simulation {} contains no node directories",
                sim
            ))));
        }

        if let Err(e) = self.reserve_all(&instances) {
            for instance in &instances {
                self.state.ledger.release_owner(&instance.id);
            }
            return Err(e);
        }

        self.state.channels.restore(channels);

        let count = instances.len();
        let mut summary = StartSummary {
            requested: count,
            started: 0,
            connected: 0,
        };
        let mut launched = Vec::with_capacity(count);

        for (index, instance) in instances.into_iter().enumerate() {
            self.state.ledger.release(instance.listen_port);
            self.state.ledger.release(instance.control_port);

            let instance = self.state.instances.insert(instance);
            if self.launch_one(&instance) {
                summary.started += 1;
                launched.push(instance);
            }

            self.pace(index + 1, count).await;
        }

        self.write_manifest();

        let report = self.connect_launched(launched).await;
        summary.connected = report.connected.len();

        tracing::info!(
            sim,
            started = summary.started,
            connected = summary.connected,
            channels = self.state.channels.len(),
            "Simulation loaded"
        );
        Ok(summary)
    }

    /// Archive the fleet root and the channel registry as `sim`
    pub async fn save(&self, sim: &str) -> Result<SavedSnapshot, FleetError> {
        let _lock = self.write().await;
        SnapshotStore::validate_name(sim)?;

        let saved = self
            .snapshots
            .save(self.fleet_root(), sim, &self.state.channels.snapshot())
            .await?;
        Ok(saved)
    }

    /// Ask every connected node to stop and mark the fleet stopped.
    ///
    /// Always succeeds; individual stop failures are logged and reported.
    pub async fn stop_fleet(&self) -> StopReport {
        let _lock = self.write().await;

        let report = self.gateway.stop_all().await;
        self.state.instances.mark_all(InstanceState::Stopped);
        self.shutdown.cancel();

        tracing::info!(
            requested = report.requested,
            failed = report.failed.len(),
            "Fleet stopped"
        );
        report
    }

    /// Release everything the fleet holds: processes, connections, ports and
    /// (when configured) the fleet root
    pub async fn teardown(&self) {
        let _lock = self.write().await;
        self.shutdown.cancel();

        self.launcher
            .shutdown(self.state.config.launch.stop_grace)
            .await;

        self.state.connections.clear();
        self.state.listeners.close();
        self.state.listeners.wait().await;

        self.state.ledger.clear();
        self.state.instances.clear();

        if self.state.config.remove_data_on_exit {
            let root = self.fleet_root();
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => tracing::info!(root = %root.display(), "Removed fleet root"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Failed to remove fleet root")
                }
            }
        }

        tracing::info!("Fleet torn down");
    }

    /// Orchestrator status
    pub async fn status(&self) -> FleetStatus {
        let _lock = self.read().await;
        FleetStatus {
            running: !self.shutdown.is_cancelled(),
            uptime_secs: self.state.uptime_secs(),
            instance_count: self.state.instances.len(),
            connected_count: self.state.connections.len(),
            channel_count: self.state.channels.len(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: self.fleet_root().display().to_string(),
            ipc_address: self.state.config.ipc_address(),
        }
    }

    /// Instances with their lifecycle state
    pub async fn instances(&self) -> Vec<InstanceInfo> {
        let _lock = self.read().await;
        self.state.instances.info()
    }

    /// Manifest of the current fleet
    pub async fn manifest(&self) -> FleetManifest {
        let _lock = self.read().await;
        let instances = self.state.instances.instances();
        FleetManifest::from_instances(instances.iter().map(|i| i.as_ref()))
    }

    /// Launch one instance; a failure only affects that instance
    fn launch_one(&self, instance: &Arc<Instance>) -> bool {
        match self.launcher.launch(instance) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(instance = %instance.id, error = %e, "Failed to launch node");
                self.state
                    .instances
                    .set_state(&instance.id, InstanceState::Unreachable);
                false
            }
        }
    }

    /// Pause after every full batch while more launches remain
    async fn pace(&self, launched: usize, total: usize) {
        let launch = &self.state.config.launch;
        if launched < total && launched % launch.batch_size == 0 && !launch.batch_pause.is_zero() {
            tracing::info!(launched, total, pause = ?launch.batch_pause, "Pausing between launch batches");
            tokio::time::sleep(launch.batch_pause).await;
        }
    }

    async fn connect_launched(&self, launched: Vec<Arc<Instance>>) -> ConnectReport {
        let report = self
            .state
            .connections
            .connect_all(launched, Arc::clone(&self.connector))
            .await;

        for id in &report.connected {
            self.state.instances.set_state(id, InstanceState::Connected);
        }
        for (id, _) in &report.failed {
            self.state.instances.set_state(id, InstanceState::Unreachable);
        }
        report
    }

    fn write_manifest(&self) {
        let path = self.manifest_path();
        if let Err(e) = self.manifest_now().write_to(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write fleet manifest");
        }
    }

    fn manifest_now(&self) -> FleetManifest {
        let instances = self.state.instances.instances();
        FleetManifest::from_instances(instances.iter().map(|i| i.as_ref()))
    }

    fn reserve_all(&self, instances: &[Instance]) -> Result<(), FleetError> {
        for instance in instances {
            self.state
                .ledger
                .reserve(instance.listen_port, &instance.id)?;
            self.state
                .ledger
                .reserve(instance.control_port, &instance.id)?;
        }
        Ok(())
    }
}

/// Instances described by the node directories under `root`, in name order
fn discover_instances(root: &Path, node: &NodeConfig) -> Result<Vec<Instance>, FleetError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && name.starts_with(&node.dir_prefix) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut instances: Vec<Instance> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let restored = NodeConfigFile::read(&dir.join(&node.config_file_name))?.restored()?;
        if instances.iter().any(|i| i.id.as_str() == restored.alias) {
            return Err(FleetError::Config(ConfigError::InvalidField {
                field: "alias".to_string(),
                value: restored.alias,
            }));
        }

        tracing::debug!(
            instance = %restored.alias,
            listen_port = restored.listen_port,
            control_port = restored.control_port,
            "Discovered saved node"
        );
        instances.push(Instance::new(
            InstanceId::new(restored.alias),
            dir,
            restored.listen_port,
            restored.control_port,
            &node.tls_cert_name,
            &node.macaroon_path,
        ));
    }
    Ok(instances)
}
