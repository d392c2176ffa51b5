//! Node configuration rendering and parsing

use std::path::{Path, PathBuf};

use fleet_core::config::FleetConfig;
use fleet_core::error::ConfigError;
use fleet_core::Instance;

/// LND regtest/neutrino configuration.
///
/// gRPC goes on a unix socket inside the workdir so each node needs only two
/// TCP ports: the peer listener and the REST control listener.
pub const DEFAULT_TEMPLATE: &str = "\
listen=localhost:{listen_port}
rpclisten=unix://{workdir}/rpc.sock
restlisten=localhost:{control_port}
datadir={workdir}/data
logdir={workdir}/log
tlscertpath={workdir}/tls.cert
tlskeypath={workdir}/tls.key
letsencryptdir={workdir}/letsencrypt
watchtower.towerdir={workdir}/data/watchtower
noseedbackup=true
no-macaroons=true
accept-keysend=1
debuglevel=error
trickledelay=1000
alias={alias}

[rpcmiddleware]
rpcmiddleware.enable=false

[bitcoin]
bitcoin.active=1
bitcoin.node=neutrino
bitcoin.regtest=1

[neutrino]
neutrino.connect=localhost:18444
";

/// Writes per-instance node configuration files
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    template: String,
    config_file_name: String,
    fleet_root: PathBuf,
}

impl ConfigMaterializer {
    /// Create a materializer from an explicit template
    pub fn new(
        template: impl Into<String>,
        config_file_name: impl Into<String>,
        fleet_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template: template.into(),
            config_file_name: config_file_name.into(),
            fleet_root: fleet_root.into(),
        }
    }

    /// Create a materializer from fleet configuration, reading the custom
    /// template when one is configured
    pub fn from_config(config: &FleetConfig) -> Result<Self, ConfigError> {
        let template = match &config.node.template_path {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };

        Ok(Self::new(
            template,
            config.node.config_file_name.clone(),
            config.data_dir.clone(),
        ))
    }

    /// Root directory the instances live under
    pub fn fleet_root(&self) -> &Path {
        &self.fleet_root
    }

    /// Name of the configuration file inside each workdir
    pub fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    /// Path of `instance`'s configuration file
    pub fn config_path(&self, instance: &Instance) -> PathBuf {
        instance.workdir.join(&self.config_file_name)
    }

    /// Render the configuration text for `instance`
    pub fn render(&self, instance: &Instance) -> String {
        self.template
            .replace("{id}", instance.id.as_str())
            .replace("{alias}", instance.id.as_str())
            .replace("{workdir}", &instance.workdir.display().to_string())
            .replace("{fleet_root}", &self.fleet_root.display().to_string())
            .replace("{listen_port}", &instance.listen_port.to_string())
            .replace("{control_port}", &instance.control_port.to_string())
    }

    /// Create the workdir and write the rendered configuration into it
    pub fn materialize(&self, instance: &Instance) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&instance.workdir).map_err(|source| ConfigError::Io {
            path: instance.workdir.clone(),
            source,
        })?;

        let path = self.config_path(instance);
        std::fs::write(&path, self.render(instance)).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(instance = %instance.id, path = %path.display(), "Wrote node config");
        Ok(path)
    }
}

/// Values a restore needs from a saved node configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredNode {
    pub alias: String,
    pub listen_port: u16,
    pub control_port: u16,
}

/// Parsed INI-style node configuration
#[derive(Debug, Clone, Default)]
pub struct NodeConfigFile {
    entries: Vec<ConfigEntry>,
}

#[derive(Debug, Clone)]
struct ConfigEntry {
    section: Option<String>,
    key: String,
    value: String,
}

impl NodeConfigFile {
    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        let mut section = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name.trim().to_ascii_lowercase());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Invalid(format!(
                    "line {}: expected key=value, got {:?}",
                    lineno + 1,
                    line
                )));
            };

            entries.push(ConfigEntry {
                section: section.clone(),
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            });
        }

        Ok(Self { entries })
    }

    /// Read and parse a configuration file
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// First value for `key` in any section
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// First value for `key` inside `section`
    pub fn get_in(&self, section: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.section.as_deref() == Some(section) && e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Number of key=value entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extract alias and ports for a restore
    pub fn restored(&self) -> Result<RestoredNode, ConfigError> {
        let alias = self.required("alias")?;
        if alias.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "alias".to_string(),
                value: alias.to_string(),
            });
        }

        Ok(RestoredNode {
            alias: alias.to_string(),
            listen_port: self.port("listen")?,
            control_port: self.port("restlisten")?,
        })
    }

    fn required(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingField(key.to_string()))
    }

    fn port(&self, key: &str) -> Result<u16, ConfigError> {
        let value = self.required(key)?;
        let port = match value.rsplit_once(':') {
            Some((_, port)) => port,
            None => value,
        };

        match port.parse::<u16>() {
            Ok(p) if p != 0 => Ok(p),
            _ => Err(ConfigError::InvalidField {
                field: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}
