//! Node configuration.

use std::path::PathBuf;

use tern_core::checkpoint::Checkpoint;
use tern_core::constants::NetworkKind;
use tern_network::NetworkConfig;
use tern_sync::SyncConfig;

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Transport configuration (network selection lives here).
    pub network: NetworkConfig,
    /// Sync rates, quorum, and tick periods.
    pub sync: SyncConfig,
    /// Checkpoint anchors; defaults to the network's compiled-in list.
    pub checkpoints: Vec<Checkpoint>,
    /// Log level filter string (e.g. "info", "tern_sync=debug").
    pub log_level: String,
}

impl NodeConfig {
    /// Defaults for the given network.
    pub fn for_network(network: NetworkKind) -> Self {
        Self {
            data_dir: PathBuf::from("tern-data"),
            network: NetworkConfig::for_network(network),
            sync: SyncConfig::default(),
            checkpoints: network.checkpoints(),
            log_level: "info".to_string(),
        }
    }

    pub fn network_kind(&self) -> NetworkKind {
        self.network.network
    }

    /// Path to the block database directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_network(NetworkKind::Mainnet)
    }
}
