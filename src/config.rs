//! Layered configuration (§6.4, §10.2): compiled-in defaults, overridden by
//! an optional TOML file, overridden in turn by environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub repository: PathBuf,
    pub infura_project_id: String,
    pub swarm_gateway: String,
    pub ipfs_cat_request: String,
    pub block_time_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub fetch_concurrency_cap: usize,
    pub metrics_address: Option<SocketAddr>,
}

/// Redacts `infura_project_id` so the resolved config can be logged at
/// startup (§10.1: "minus secrets") without leaking the API key into logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repository", &self.repository)
            .field("infura_project_id", &"<redacted>")
            .field("swarm_gateway", &self.swarm_gateway)
            .field("ipfs_cat_request", &self.ipfs_cat_request)
            .field("block_time_secs", &self.block_time_secs)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("fetch_concurrency_cap", &self.fetch_concurrency_cap)
            .field("metrics_address", &self.metrics_address)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("net", "source-harvester", "source-harvester")
            .expect("failed to resolve project directories, please set the config path explicitly");
        Self {
            repository: dir.data_dir().join("repository"),
            infura_project_id: String::new(),
            swarm_gateway: "https://swarm-gateways.net/".to_string(),
            ipfs_cat_request: "https://ipfs.infura.io:5001/api/v0/cat?arg=".to_string(),
            block_time_secs: 15,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            fetch_concurrency_cap: 16,
            metrics_address: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9616)),
        }
    }
}

impl Config {
    pub fn block_time(&self) -> Duration {
        Duration::from_secs(self.block_time_secs)
    }

    /// Builds a `Config` by layering defaults, an optional TOML file at
    /// `path`, and then a fixed set of environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            config = merge_file(config, path)?;
        }

        if let Ok(project_id) = std::env::var("SOURCE_HARVESTER_INFURA_PROJECT_ID") {
            config.infura_project_id = project_id;
        }
        if let Ok(repository) = std::env::var("SOURCE_HARVESTER_REPOSITORY") {
            config.repository = PathBuf::from(repository);
        }
        if let Ok(log_level) = std::env::var("SOURCE_HARVESTER_LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }
}

fn merge_file(defaults: Config, path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let from_file: PartialConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    Ok(from_file.apply(defaults))
}

/// Mirrors [`Config`] with every field optional, so a TOML file only needs to
/// name the knobs it wants to override.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    repository: Option<PathBuf>,
    infura_project_id: Option<String>,
    swarm_gateway: Option<String>,
    ipfs_cat_request: Option<String>,
    block_time_secs: Option<u64>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
    fetch_concurrency_cap: Option<usize>,
    metrics_address: Option<SocketAddr>,
}

impl PartialConfig {
    fn apply(self, mut base: Config) -> Config {
        if let Some(v) = self.repository {
            base.repository = v;
        }
        if let Some(v) = self.infura_project_id {
            base.infura_project_id = v;
        }
        if let Some(v) = self.swarm_gateway {
            base.swarm_gateway = v;
        }
        if let Some(v) = self.ipfs_cat_request {
            base.ipfs_cat_request = v;
        }
        if let Some(v) = self.block_time_secs {
            base.block_time_secs = v;
        }
        if let Some(v) = self.log_level {
            base.log_level = v;
        }
        if let Some(v) = self.log_format {
            base.log_format = v;
        }
        if let Some(v) = self.fetch_concurrency_cap {
            base.fetch_concurrency_cap = v;
        }
        if let Some(v) = self.metrics_address {
            base.metrics_address = Some(v);
        }
        base
    }
}
