//! # Node Configuration
//!
//! One [`NodeConfig`] is built at startup and passed down explicitly.
//!
//! ## Loading order
//!
//! 1. Defaults (a single local replica set of four nodes).
//! 2. TOML file given by `--config`.
//! 3. `QL_*` environment overrides.
//!
//! ```toml
//! [node]
//! id = 0
//! listen = "127.0.0.1:7000"
//!
//! key_seed = "<64 hex chars>"
//!
//! [[peers]]
//! id = 0
//! address = "127.0.0.1:7000"
//! public_key = "<64 hex chars>"
//!
//! [consensus]
//! view_change_timeout_ms = 2000
//! batch = { mode = "window", size = 16 }
//!
//! [storage]
//! backend = "rocksdb"
//! data_dir = "./data/node-0"
//! ```

use ql_01_consensus::{ConsensusConfig, ReplicaKey};
use ql_02_block_storage::BatchPolicy;
use ql_03_accounts::LedgerConfig;
use ql_04_contracts::RuntimeConfig;
use ql_05_cross_chain::TrustedRoot;
use serde::Deserialize;
use serde_with::{hex::Hex, serde_as};
use shared_crypto::Ed25519PublicKey;
use shared_types::NodeId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    /// Validator table; `[[peers]]` entries, own id included.
    pub peers: Vec<PeerConfig>,
    pub consensus: ConsensusSection,
    pub ledger: LedgerSection,
    pub cross_chain: CrossChainSection,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

/// This replica.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub id: NodeId,
    /// Address the replica accepts peer and client connections on.
    pub listen: String,
    /// Ed25519 seed of the consensus signing key. Without it the replica
    /// signs with the public development key of its id.
    #[serde_as(as = "Option<Hex>")]
    pub key_seed: Option<[u8; 32]>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: 0,
            listen: "127.0.0.1:7000".to_string(),
            key_seed: None,
        }
    }
}

/// One entry of the validator table.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    pub address: String,
    /// Consensus public key; the development key of `id` when absent.
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    pub public_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    pub view_change_timeout_ms: u64,
    pub watermark_window: u64,
    pub max_future_messages: usize,
    /// How delivered requests are cut into blocks.
    pub batch: BatchPolicy,
    /// Period of the view-change timer.
    pub tick_interval_ms: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        let defaults = ConsensusConfig::default();
        Self {
            view_change_timeout_ms: defaults.view_change_timeout_ms,
            watermark_window: defaults.watermark_window,
            max_future_messages: defaults.max_future_messages,
            batch: BatchPolicy::default(),
            tick_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub initial_balance: u64,
    pub max_call_depth: u32,
    pub max_instructions: usize,
    pub max_steps: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        let runtime = RuntimeConfig::default();
        Self {
            initial_balance: LedgerConfig::default().initial_balance,
            max_call_depth: runtime.max_call_depth,
            max_instructions: runtime.max_instructions,
            max_steps: runtime.max_steps,
        }
    }
}

impl LedgerSection {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            initial_balance: self.initial_balance,
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_call_depth: self.max_call_depth,
            max_instructions: self.max_instructions,
            max_steps: self.max_steps,
        }
    }
}

/// Foreign chain roots trusted for cross-chain proofs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrossChainSection {
    pub roots: Vec<TrustedRoot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" => Ok(Self::Rocksdb),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `ql_01_consensus=debug`.
    pub log_level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// `n` nodes on consecutive local ports starting at `base_port`.
    pub fn local(id: NodeId, nodes: usize, base_port: u16) -> Self {
        let peers = (0..nodes)
            .map(|i| PeerConfig {
                id: i as NodeId,
                address: format!("127.0.0.1:{}", base_port as usize + i),
                public_key: None,
            })
            .collect::<Vec<_>>();
        let listen = peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.address.clone())
            .unwrap_or_default();
        Self {
            node: NodeSection {
                id,
                listen,
                key_seed: None,
            },
            peers,
            ..Default::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `QL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map).
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("QL_NODE_ID") {
            self.node.id = parse_var("QL_NODE_ID", &id)?;
        }
        if let Some(listen) = lookup("QL_LISTEN") {
            self.node.listen = listen;
        }
        if let Some(dir) = lookup("QL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("QL_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(level) = lookup("QL_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            self.telemetry.log_level = level;
        }
        if let Some(json) = lookup("QL_JSON_LOGS") {
            self.telemetry.json = matches!(json.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(timeout) = lookup("QL_VIEW_CHANGE_TIMEOUT_MS") {
            self.consensus.view_change_timeout_ms = parse_var("QL_VIEW_CHANGE_TIMEOUT_MS", &timeout)?;
        }
        if let Some(balance) = lookup("QL_INITIAL_BALANCE") {
            self.ledger.initial_balance = parse_var("QL_INITIAL_BALANCE", &balance)?;
        }
        Ok(())
    }

    /// Validator ids in table order.
    pub fn validators(&self) -> Vec<NodeId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    pub fn peer_address(&self, id: NodeId) -> Option<&str> {
        self.peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.address.as_str())
    }

    /// Consensus parameters and keys. Configured keys replace the
    /// development defaults one by one.
    pub fn consensus_config(&self) -> Result<ConsensusConfig, ConfigError> {
        let mut config = ConsensusConfig::for_node(self.node.id, self.validators());
        config.view_change_timeout_ms = self.consensus.view_change_timeout_ms;
        config.watermark_window = self.consensus.watermark_window;
        config.max_future_messages = self.consensus.max_future_messages;
        for peer in &self.peers {
            if let Some(bytes) = peer.public_key {
                let key = Ed25519PublicKey::from_bytes(bytes).map_err(|e| {
                    ConfigError::Invalid(format!("public key of peer {}: {e}", peer.id))
                })?;
                config.validator_keys.insert(peer.id, key);
            }
        }
        if let Some(seed) = self.node.key_seed {
            config.signing_key = ReplicaKey::from_seed(seed);
        }
        Ok(config)
    }

    /// Whether any consensus key falls back to a development key.
    pub fn uses_development_keys(&self) -> bool {
        self.node.key_seed.is_none() || self.peers.iter().any(|p| p.public_key.is_none())
    }

    /// Check the configuration; returns warnings for layouts that run but
    /// tolerate fewer faults than the table size suggests.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::Invalid("peer table is empty".into()));
        }
        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.id) {
                return Err(ConfigError::Invalid(format!("duplicate peer id {}", peer.id)));
            }
        }
        if !seen.contains(&self.node.id) {
            return Err(ConfigError::Invalid(format!(
                "node id {} is missing from the peer table",
                self.node.id
            )));
        }
        if self.consensus.view_change_timeout_ms == 0 || self.consensus.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.consensus.watermark_window == 0 {
            return Err(ConfigError::Invalid("watermark window must be positive".into()));
        }
        if self.consensus.batch == BatchPolicy::Window(0) {
            return Err(ConfigError::Invalid("batch window must be positive".into()));
        }

        let mut warnings = Vec::new();
        let n = self.peers.len();
        let f = n.saturating_sub(1) / 3;
        if n < 4 {
            warnings.push(format!("{n} validators tolerate no Byzantine fault"));
        } else if n != 3 * f + 1 {
            warnings.push(format!(
                "{n} validators tolerate only f = {f}; {} would tolerate the same",
                3 * f + 1
            ));
        }
        Ok(warnings)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}={value} is not a valid value")))
}
