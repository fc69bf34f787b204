//! Node configuration.

use std::path::PathBuf;

use beck_core::constants::{DEFAULT_NODE_PORT, DEFAULT_SEED_URL};

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the peer RPC server listens on.
    pub port: u16,
    /// Seed registry URL for peer discovery.
    pub seed_server: String,
    /// Root directory for persistent data.
    pub data_dir: PathBuf,
    /// Address (public key hex) credited by mined coinbases. An ephemeral
    /// key is generated when unset.
    pub payout_address: Option<String>,
    /// Whether the mining task runs.
    pub mine: bool,
    /// Whether periodic peer sync runs.
    pub sync: bool,
    /// Log level filter string (e.g. "info", "debug").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NODE_PORT,
            seed_server: DEFAULT_SEED_URL.to_string(),
            data_dir: PathBuf::from("beck-data"),
            payout_address: None,
            mine: true,
            sync: true,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Path of the RocksDB block store.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    /// Socket address string the RPC server binds.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
