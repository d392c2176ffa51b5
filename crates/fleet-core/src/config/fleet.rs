//! Fleet orchestrator configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the fleet orchestrator daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fleet root: one working directory per instance lives here
    pub data_dir: PathBuf,

    /// Where saved simulations are written
    pub snapshot_dir: PathBuf,

    /// Model name used as a path component of saved simulations
    pub model_name: String,

    /// IPC port for CLI communication (localhost only)
    pub ipc_port: u16,

    /// Remove the fleet root when the orchestrator shuts down
    pub remove_data_on_exit: bool,

    /// Node process settings
    pub node: NodeConfig,

    /// Launch pacing
    pub launch: LaunchConfig,

    /// Control connection settings
    pub connect: ConnectConfig,

    /// Port allocation settings
    pub ports: PortConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        let blast_dir = super::default_blast_dir();

        Self {
            data_dir: blast_dir.join("blast_data").join("blast_lnd"),
            snapshot_dir: blast_dir.join("blast_sims"),
            model_name: "blast_lnd".to_string(),
            ipc_port: 5050,
            remove_data_on_exit: true,
            node: NodeConfig::default(),
            launch: LaunchConfig::default(),
            connect: ConnectConfig::default(),
            ports: PortConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.launch.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "launch.batch_size must be at least 1".to_string(),
            ));
        }
        if self.ports.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ports.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.node.alias_prefix.is_empty() {
            return Err(ConfigError::MissingField("node.alias_prefix".to_string()));
        }
        if self.node.config_file_name.is_empty() {
            return Err(ConfigError::MissingField("node.config_file_name".to_string()));
        }
        if self.model_name.is_empty() {
            return Err(ConfigError::MissingField("model_name".to_string()));
        }
        Ok(())
    }
}

/// How node processes are started and where their files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node executable
    pub binary: PathBuf,

    /// Arguments; `{config}` and `{workdir}` are substituted per instance
    pub args: Vec<String>,

    /// Name of the configuration file written into each working directory
    pub config_file_name: String,

    /// Custom configuration template (built-in LND template when unset)
    pub template_path: Option<PathBuf>,

    /// Instance ids are `<alias_prefix>-NNNN`
    pub alias_prefix: String,

    /// Working directories are `<dir_prefix>NNNN`
    pub dir_prefix: String,

    /// TLS certificate location relative to the working directory
    pub tls_cert_name: PathBuf,

    /// Admin macaroon location relative to the working directory
    pub macaroon_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("lnd"),
            args: vec![
                "--configfile={config}".to_string(),
                "--lnddir={workdir}".to_string(),
            ],
            config_file_name: "lnd.conf".to_string(),
            template_path: None,
            alias_prefix: "blast".to_string(),
            dir_prefix: "lnd".to_string(),
            tls_cert_name: PathBuf::from("tls.cert"),
            macaroon_path: PathBuf::from("data/chain/bitcoin/regtest/admin.macaroon"),
        }
    }
}

/// Launch pacing for mass fleet starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Pause after every this many launches
    pub batch_size: usize,

    /// Length of the pause between batches
    #[serde(with = "duration_secs")]
    pub batch_pause: Duration,

    /// How long a stopping node may take to exit before it is killed
    #[serde(with = "duration_secs")]
    pub stop_grace: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause: Duration::from_secs(10),
            stop_grace: Duration::from_secs(30),
        }
    }
}

/// Control connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Upper bound on waiting for a node to answer its first call
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Per-request timeout once connected
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Wait after a fleet-wide connect before reporting the fleet as started
    #[serde(with = "duration_secs")]
    pub settle_delay: Duration,

    /// Retry pacing while a node is still starting up
    pub backoff: BackoffConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Port allocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Probes per requested port before allocation gives up
    pub max_attempts: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { max_attempts: 64 }
    }
}
