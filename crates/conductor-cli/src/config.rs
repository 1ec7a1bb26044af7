//! Client configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use conductor_network::{NodeConfig, ResponseMode, DEFAULT_RESPONSE_CAPACITY};

/// The public IPFS bootstrap node conductor hosts are reachable through.
pub const DEFAULT_BOOTSTRAP_PEER: &str =
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ";

/// Full configuration for the conductor client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConductorConfig {
    /// P2P network settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Host discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Request protocol settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// P2P listen multiaddress.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    #[serde(default = "default_bootstrap_peers")]
    pub bootstrap_peers: Vec<String>,
    /// Seconds before an idle connection is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Content identifier hosts announce themselves under. `--cid` overrides it.
    #[serde(default)]
    pub content_id: Option<String>,
    /// Seconds to wait after bootstrapping before looking up providers.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Stream protocol identifier.
    #[serde(default = "default_protocol_id")]
    pub protocol_id: String,
    /// How replies are read (bounded, to-end).
    #[serde(default)]
    pub response_mode: ResponseMode,
    /// Maximum reply size in bytes.
    #[serde(default = "default_response_capacity")]
    pub response_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to the keypair file.
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/0".into()
}
fn default_bootstrap_peers() -> Vec<String> {
    vec![DEFAULT_BOOTSTRAP_PEER.to_string()]
}
fn default_idle_timeout() -> u64 {
    60
}
fn default_settle_secs() -> u64 {
    5
}
fn default_protocol_id() -> String {
    "/conductor/0.0.1".into()
}
fn default_response_capacity() -> usize {
    DEFAULT_RESPONSE_CAPACITY
}
fn default_keypair_path() -> PathBuf {
    PathBuf::from("key.priv")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            bootstrap_peers: default_bootstrap_peers(),
            idle_connection_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            content_id: None,
            settle_secs: default_settle_secs(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_id: default_protocol_id(),
            response_mode: ResponseMode::default(),
            response_capacity: default_response_capacity(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ConductorConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ConductorConfig = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings no exchange can work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.protocol.response_capacity == 0 {
            anyhow::bail!("protocol.response_capacity must be at least 1");
        }
        Ok(())
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Network node settings derived from this config.
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            listen_addr: self.network.listen_addr.clone(),
            bootstrap_peers: self.network.bootstrap_peers.clone(),
            idle_connection_timeout_secs: self.network.idle_connection_timeout_secs,
            ..NodeConfig::default()
        }
    }
}
