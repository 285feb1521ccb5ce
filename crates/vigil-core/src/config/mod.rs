//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: serde defaults on every section
//! 2. **Config file**: TOML file named by the `VIGIL_CONFIG` env var
//! 3. **Environment variables**: `VIGIL__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`NodeConfig`]: validator identity, location and cluster size
//! - [`PeersConfig`]: gossip peer URLs and Raft peer ids
//! - [`ServerConfig`]: HTTP server settings
//! - [`ProbeConfig`], [`GossipConfig`], [`QuorumConfig`], [`RaftConfig`],
//!   [`ReputationConfig`], [`AlertsConfig`], [`StoreConfig`]: subsystem settings
//! - [`LoggingConfig`], [`MetricsConfig`]: observability
//!
//! # Validation
//!
//! [`AppConfig::load`] validates before returning. A missing validator id, a multi-node
//! cluster without peers, an impossible quorum or unsafe Raft timings are startup
//! errors, never runtime surprises.
//!
//! # Example
//!
//! ```toml
//! [node]
//! validator_id = 1
//! location = "eu-west"
//!
//! [[peers.raft]]
//! id = 2
//! url = "http://10.0.0.2:3030"
//!
//! [probe]
//! targets = ["https://example.com/health"]
//! ```

use crate::{
    alerts::AlertsConfig,
    gossip::GossipConfig,
    metrics::MetricsConfig,
    probe::ProbeConfig,
    quorum::QuorumConfig,
    raft::{NodeId, RaftConfig},
    reputation::ReputationConfig,
    store::StoreConfig,
    types::ValidatorId,
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::Path, time::Duration};

/// Identity of this validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Validator id, also used as the Raft node id. Required.
    #[serde(default)]
    pub validator_id: Option<u64>,

    /// Region label attached to votes and used for alert routing.
    #[serde(default)]
    pub location: String,

    /// Total validators voting on each round. Defaults to the number of peers plus one.
    #[serde(default)]
    pub cluster_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftPeer {
    pub id: NodeId,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeersConfig {
    /// Base URLs that receive this validator's gossip.
    #[serde(default)]
    pub gossip: Vec<String>,

    #[serde(default)]
    pub raft: Vec<RaftPeer>,
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of requests handled concurrently. Defaults to `100`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3030
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration containing all subsystem settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub peers: PeersConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub gossip: GossipConfig,

    #[serde(default)]
    pub quorum: QuorumConfig,

    #[serde(default)]
    pub raft: RaftConfig,

    #[serde(default)]
    pub reputation: ReputationConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `VIGIL__` prefix override any value, using `__`
    /// between nested fields (e.g., `VIGIL__NODE__VALIDATOR_ID=3`). The file is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the sources cannot be read or deserialized, or if the
    /// result fails [`Self::validate`].
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("VIGIL").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate().map_err(ConfigError::Message)?;
        Ok(config)
    }

    /// Loads configuration from `config/config.toml`, or the file named by `VIGIL_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("VIGIL_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a [`SocketAddr`].
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port).parse().map_err(|_| {
            format!("Invalid socket address: {}:{}", self.server.bind_address, self.server.bind_port)
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// The configured validator id. Only `None` on an unvalidated config.
    #[must_use]
    pub fn validator_id(&self) -> Option<ValidatorId> {
        self.node.validator_id.map(ValidatorId)
    }

    /// Validators voting per round: explicit, else the larger peer list plus this node.
    #[must_use]
    pub fn cluster_size(&self) -> usize {
        self.node
            .cluster_size
            .unwrap_or_else(|| self.peers.gossip.len().max(self.peers.raft.len()) + 1)
    }

    #[must_use]
    pub fn raft_peer_urls(&self) -> HashMap<NodeId, String> {
        self.peers.raft.iter().map(|p| (p.id, p.url.clone())).collect()
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string for the first failing check.
    pub fn validate(&self) -> Result<(), String> {
        let Some(validator_id) = self.node.validator_id else {
            return Err("node.validator_id is required".to_string());
        };

        let cluster_size = self.cluster_size();
        if cluster_size > 1 && self.peers.gossip.is_empty() && self.peers.raft.is_empty() {
            return Err(format!("cluster size is {cluster_size} but no peers are configured"));
        }
        if self.peers.raft.iter().any(|p| p.id == validator_id) {
            return Err(format!("raft peers must not include this node ({validator_id})"));
        }
        for url in self.peers.gossip.iter().chain(self.peers.raft.iter().map(|p| &p.url)) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("peer URL must be http(s): {url}"));
            }
        }

        self.quorum.resolve_quorum(cluster_size)?;
        self.quorum.validate()?;
        self.probe.validate()?;
        self.gossip.validate()?;
        self.raft.validate()?;
        self.reputation.validate()?;
        self.alerts.validate()?;

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
