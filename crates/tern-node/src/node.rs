//! Node orchestration: run the two sync phases back to back.

use std::sync::Arc;

use tracing::{error, info};

use tern_core::error::NodeError;
use tern_core::traits::BlockStore;
use tern_network::{Connector, HostPool, Shutdown};
use tern_sync::{BlockSyncSession, HashList, HeaderSyncSession};

use crate::config::NodeConfig;
use crate::store::RocksStore;

/// A Bitcoin sync node: storage, host directory, and the sync sessions.
pub struct Node {
    config: NodeConfig,
    store: Arc<RocksStore>,
    hosts: Arc<HostPool>,
    shutdown: Shutdown,
}

impl Node {
    /// Open the store and prepare the node. Nothing is dialed yet.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let store = Arc::new(RocksStore::open(config.db_path(), config.network_kind())?);
        let hosts = Arc::new(HostPool::new(config.network.seeds.clone()));
        Ok(Self { config, store, hosts, shutdown: Shutdown::new() })
    }

    pub fn store(&self) -> &Arc<RocksStore> {
        &self.store
    }

    pub fn hosts(&self) -> &Arc<HostPool> {
        &self.hosts
    }

    /// Abort the running sync sessions. Idempotent, callable from any task.
    pub fn stop(&self) {
        info!("node stop requested");
        self.shutdown.trigger();
    }

    /// Synchronize the blockchain: header phase, then block phase.
    ///
    /// Returns once a quorum of peers has served every block body, or with
    /// the first unrecoverable error.
    pub async fn run(&self) -> Result<(), NodeError> {
        let (tip_height, tip_hash) = self.store.tip()?;
        info!(
            network = ?self.config.network_kind(),
            tip_height,
            %tip_hash,
            "starting initial block-chain sync"
        );

        let connector = Connector::new(self.config.network.clone());
        let mut hashes = HashList::new(tip_height, tip_hash);

        let header_session = HeaderSyncSession::new(
            connector.clone(),
            Arc::clone(&self.hosts),
            self.config.sync.clone(),
            self.config.checkpoints.clone(),
            self.shutdown.clone(),
        );
        if let Err(e) = header_session.run(&mut hashes).await {
            error!(error = %e, "header sync failed");
            return Err(e);
        }

        // Header sync is done: freeze the list and share it read-only with
        // the block phase.
        let chain = Arc::new(hashes);

        let block_session = BlockSyncSession::new(
            connector,
            Arc::clone(&self.hosts),
            self.config.sync.clone(),
            self.shutdown.clone(),
        );
        let store: Arc<dyn BlockStore> = Arc::clone(&self.store) as Arc<dyn BlockStore>;
        if let Err(e) = block_session.run(Arc::clone(&chain), store).await {
            error!(error = %e, "block sync failed");
            return Err(e);
        }

        self.store.flush()?;
        let (height, hash) = self.store.tip()?;
        info!(height, %hash, "node synchronized");
        Ok(())
    }
}
