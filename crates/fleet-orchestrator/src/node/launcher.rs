//! Node process launching and supervision

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use fleet_core::config::NodeConfig;
use fleet_core::error::LaunchError;
use fleet_core::{Instance, InstanceState};

use crate::instances::InstanceTable;

/// Starts node processes and supervises them until they exit or the
/// launcher shuts down
pub struct ProcessLauncher {
    binary: PathBuf,
    args: Vec<String>,
    config_file_name: String,
    instances: Arc<InstanceTable>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    grace_ms: Arc<AtomicU64>,
}

impl ProcessLauncher {
    /// Create a launcher for the configured node binary
    pub fn new(node: &NodeConfig, instances: Arc<InstanceTable>) -> Self {
        Self {
            binary: node.binary.clone(),
            args: node.args.clone(),
            config_file_name: node.config_file_name.clone(),
            instances,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            grace_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arguments for `instance` with `{config}` and `{workdir}` substituted
    pub fn args_for(&self, instance: &Instance) -> Vec<String> {
        let config = instance.workdir.join(&self.config_file_name);
        let config = config.display().to_string();
        let workdir = instance.workdir.display().to_string();

        self.args
            .iter()
            .map(|arg| arg.replace("{config}", &config).replace("{workdir}", &workdir))
            .collect()
    }

    /// Spawn the node process for `instance` and start supervising it.
    ///
    /// Returns the process id. The instance moves to `Running` on success.
    pub fn launch(&self, instance: &Arc<Instance>) -> Result<u32, LaunchError> {
        if self.shutdown.is_cancelled() {
            return Err(LaunchError::ShuttingDown);
        }

        self.instances
            .set_state(&instance.id, InstanceState::Starting);

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args_for(instance))
            .current_dir(&instance.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            instance: instance.id.clone(),
            binary: self.binary.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        self.instances
            .set_state(&instance.id, InstanceState::Running);
        tracing::info!(instance = %instance.id, pid, "Launched node");

        let id = instance.id.clone();
        let instances = Arc::clone(&self.instances);
        let token = self.shutdown.clone();
        let grace_ms = Arc::clone(&self.grace_ms);

        self.tracker.spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = token.cancelled() => None,
            };

            match exited {
                Some(Ok(status)) if status.success() => {
                    tracing::info!(instance = %id, "Node exited");
                }
                Some(Ok(status)) => {
                    tracing::warn!(instance = %id, %status, "Node exited with failure");
                }
                Some(Err(e)) => {
                    tracing::warn!(instance = %id, error = %e, "Failed to wait for node");
                }
                None => {
                    let grace = Duration::from_millis(grace_ms.load(Ordering::SeqCst));
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(_) => tracing::debug!(instance = %id, "Node stopped"),
                        Err(_) => {
                            tracing::warn!(instance = %id, "Node did not stop in time, killing");
                            if let Err(e) = child.kill().await {
                                tracing::warn!(instance = %id, error = %e, "Failed to kill node");
                            }
                        }
                    }
                }
            }

            instances.mark_exited(&id, token.is_cancelled());
        });

        Ok(pid)
    }

    /// Number of processes still being supervised
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Whether shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop supervising: give every process `grace` to exit, kill the rest,
    /// and wait for all supervisors to finish
    pub async fn shutdown(&self, grace: Duration) {
        let millis = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self.grace_ms.store(millis, Ordering::SeqCst);
        self.tracker.close();
        self.shutdown.cancel();

        tracing::info!(processes = self.tracker.len(), "Waiting for node processes to exit");
        self.tracker.wait().await;
    }
}
