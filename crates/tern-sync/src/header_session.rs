//! Header-sync session: serial peer retry.
//!
//! One channel is active at a time. Each attempt shares the same hash
//! list, so the next peer continues from whatever verified prefix the
//! previous one left behind (or from the rollback point). The session ends
//! on the first fully successful attempt or when it is stopped.

use std::sync::Arc;

use tracing::{debug, info};

use tern_core::checkpoint::{self, Checkpoint};
use tern_core::error::{NodeError, SyncError};
use tern_network::{spawn_address_exchange, spawn_ping, Channel, Connector, HostPool, Shutdown};

use crate::config::SyncConfig;
use crate::hash_list::HashList;
use crate::header_sync::HeaderSync;

/// Serial retry loop completing the header chain once.
pub struct HeaderSyncSession {
    connector: Connector,
    hosts: Arc<HostPool>,
    config: SyncConfig,
    checkpoints: Vec<Checkpoint>,
    shutdown: Shutdown,
}

impl HeaderSyncSession {
    pub fn new(
        connector: Connector,
        hosts: Arc<HostPool>,
        config: SyncConfig,
        mut checkpoints: Vec<Checkpoint>,
        shutdown: Shutdown,
    ) -> Self {
        checkpoint::sort(&mut checkpoints);
        Self { connector, hosts, config, checkpoints, shutdown }
    }

    /// Drive header sync to completion, dialing peers one at a time.
    pub async fn run(&self, hashes: &mut HashList) -> Result<(), NodeError> {
        loop {
            if self.shutdown.is_triggered() {
                return Err(SyncError::ServiceStopped.into());
            }

            let authority = self.hosts.fetch_address().await?;
            info!(%authority, "contacting header sync peer");

            let channel = tokio::select! {
                _ = self.shutdown.wait() => return Err(SyncError::ServiceStopped.into()),
                connected = self.connector.connect(authority) => match connected {
                    Ok(channel) => channel,
                    Err(e) => {
                        debug!(%authority, error = %e, "header sync dial failed");
                        continue;
                    }
                },
            };

            match self.attempt(channel, hashes).await? {
                Some(()) => {
                    info!(
                        top = hashes.top_height(),
                        headers = hashes.len(),
                        "header sync complete"
                    );
                    return Ok(());
                }
                None => continue,
            }
        }
    }

    /// One peer attempt. `Ok(Some(()))` is success, `Ok(None)` means try
    /// the next peer.
    async fn attempt(
        &self,
        channel: Channel,
        hashes: &mut HashList,
    ) -> Result<Option<()>, NodeError> {
        let authority = channel.authority();
        spawn_ping(channel.clone(), self.connector.config().ping_interval);
        spawn_address_exchange(channel.clone(), Arc::clone(&self.hosts));

        let protocol = HeaderSync::new(
            channel.clone(),
            self.config.headers_per_second,
            self.config.header_tick,
            self.checkpoints.clone(),
        );

        tokio::select! {
            _ = self.shutdown.wait() => {
                channel.stop();
                Err(SyncError::ServiceStopped.into())
            }
            completed = protocol.run(hashes) => match completed {
                Ok(()) => Ok(Some(())),
                Err(e) => {
                    info!(%authority, error = %e, "header sync attempt failed");
                    Ok(None)
                }
            }
        }
    }
}
