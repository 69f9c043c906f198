//! Block-sync session: parallel dials with a success quorum.
//!
//! Keeps `connections` attempts in flight. Every attempt dials a fresh
//! address, attaches ping and address-exchange, and runs the block-sync
//! protocol over the full frozen range. Completed protocols count one vote;
//! failed or completed channels are replaced with new dials until `quorum`
//! votes are in. Requiring several independent completions is a weak
//! agreement check on top of the identity validation each protocol does.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info};

use tern_core::error::{NodeError, SyncError};
use tern_core::traits::BlockStore;
use tern_network::{spawn_address_exchange, spawn_ping, Connector, HostPool, Shutdown};

use crate::block_sync::BlockSync;
use crate::config::SyncConfig;
use crate::hash_list::HashList;

/// Parallel block download until a quorum of peers has served the range.
pub struct BlockSyncSession {
    connector: Connector,
    hosts: Arc<HostPool>,
    config: SyncConfig,
    shutdown: Shutdown,
}

impl BlockSyncSession {
    pub fn new(
        connector: Connector,
        hosts: Arc<HostPool>,
        config: SyncConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self { connector, hosts, config, shutdown }
    }

    /// Run until `quorum` peers have independently served every body.
    pub async fn run(
        &self,
        chain: Arc<HashList>,
        store: Arc<dyn BlockStore>,
    ) -> Result<(), NodeError> {
        if chain.body_hashes().is_empty() {
            info!("no block bodies to fetch");
            return Ok(());
        }

        let quorum = self.config.quorum.max(1);
        let mut votes = 0u32;
        let mut attempts: JoinSet<Result<(), SyncError>> = JoinSet::new();

        loop {
            while attempts.len() < self.config.connections.max(1) as usize {
                attempts.spawn(attempt(
                    self.connector.clone(),
                    Arc::clone(&self.hosts),
                    Arc::clone(&chain),
                    Arc::clone(&store),
                    self.config.clone(),
                ));
            }

            tokio::select! {
                _ = self.shutdown.wait() => {
                    attempts.abort_all();
                    return Err(SyncError::ServiceStopped.into());
                }
                joined = attempts.join_next() => match joined {
                    Some(Ok(Ok(()))) => {
                        votes += 1;
                        info!(votes, quorum, "block sync peer vote recorded");
                        if votes >= quorum {
                            attempts.abort_all();
                            info!(top = chain.top_height(), "block sync complete");
                            return Ok(());
                        }
                    }
                    Some(Ok(Err(SyncError::ServiceStopped))) => {
                        // A local collaborator failed; redialing cannot help.
                        attempts.abort_all();
                        return Err(SyncError::ServiceStopped.into());
                    }
                    Some(Ok(Err(e))) => {
                        debug!(error = %e, "block sync attempt failed; redialing");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "block sync attempt panicked or was aborted");
                    }
                    None => unreachable!("attempt set is refilled before joining"),
                }
            }
        }
    }
}

/// One peer attempt: fetch an address, dial, attach protocols, sync.
async fn attempt(
    connector: Connector,
    hosts: Arc<HostPool>,
    chain: Arc<HashList>,
    store: Arc<dyn BlockStore>,
    config: SyncConfig,
) -> Result<(), SyncError> {
    let authority = match hosts.fetch_address().await {
        Ok(authority) => authority,
        Err(e) => {
            debug!(error = %e, "no block sync address available");
            // Do not spin the redial loop hot while the directory is empty.
            tokio::time::sleep(Duration::from_secs(1)).await;
            return Err(SyncError::ChannelStopped);
        }
    };

    info!(%authority, "contacting block sync peer");
    let channel = match connector.connect(authority).await {
        Ok(channel) => channel,
        Err(e) => {
            debug!(%authority, error = %e, "block sync dial failed");
            return Err(SyncError::ChannelStopped);
        }
    };

    // The session aborts in-flight attempts once the quorum is reached;
    // the guard stops the channel (and with it the attached protocols)
    // even when this future is dropped mid-run.
    let guard = StopOnDrop(channel.clone());

    spawn_ping(channel.clone(), connector.config().ping_interval);
    spawn_address_exchange(channel.clone(), hosts);

    let result = BlockSync::new(channel, config.blocks_per_minute, config.block_tick)
        .run(chain, store)
        .await;
    drop(guard);
    result
}

struct StopOnDrop(tern_network::Channel);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}
