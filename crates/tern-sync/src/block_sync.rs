//! Block-sync protocol: downloads the bodies for a frozen hash list on one
//! channel, delivering them to the store strictly in height order.
//!
//! Bodies are requested in `getdata` batches; each incoming block must be
//! the next expected hash. Blocks that are not (typically tip announcements
//! the peer pushes unrequested) are ignored rather than treated as faults.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tern_core::constants::MAX_GET_DATA;
use tern_core::error::SyncError;
use tern_core::traits::BlockStore;
use tern_network::message::{Inventory, Message};
use tern_network::Channel;

use crate::hash_list::HashList;
use crate::rate::RateMeter;

/// One block-sync attempt on one channel.
pub struct BlockSync {
    channel: Channel,
    minimum_rate: u32,
    tick: Duration,
}

impl BlockSync {
    pub fn new(channel: Channel, minimum_rate: u32, tick: Duration) -> Self {
        Self { channel, minimum_rate, tick }
    }

    /// Run to completion: success means every body in the assigned range
    /// was delivered to the store. The channel is stopped on the way out.
    pub async fn run(
        self,
        chain: Arc<HashList>,
        store: Arc<dyn BlockStore>,
    ) -> Result<(), SyncError> {
        let result = self.sync(&chain, store.as_ref()).await;
        self.channel.stop();
        result
    }

    async fn sync(&self, chain: &HashList, store: &dyn BlockStore) -> Result<(), SyncError> {
        let authority = self.channel.authority();
        let bodies = chain.body_hashes();
        let target_height = chain.top_height();

        if bodies.is_empty() {
            return Ok(());
        }

        if self.channel.peer_start_height() < target_height {
            info!(
                %authority,
                peer_height = self.channel.peer_start_height(),
                target_height,
                "peer is below the block sync target"
            );
            return Err(SyncError::ChannelStopped);
        }

        let mut events = self.channel.subscribe();
        let mut meter = RateMeter::new(0);
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Index of the next body expected, and the end of the range already
        // requested from the peer.
        let mut index = 0usize;
        let mut requested = self.request_bodies(bodies, 0)?;

        loop {
            tokio::select! {
                _ = self.channel.wait_stop() => return Err(SyncError::ChannelStopped),

                event = events.recv() => {
                    let block = match event {
                        Ok(Message::Block(block)) => block,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%authority, skipped, "block subscriber lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => return Err(SyncError::ChannelStopped),
                    };

                    let hash = block.header.hash();
                    if hash != bodies[index] {
                        debug!(%hash, %authority, "out of order block ignored");
                        continue;
                    }

                    let height = chain.first_height() + 1 + index as u32;
                    if let Err(e) = store.store_block(height, &block) {
                        error!(height, error = %e, "block store rejected block");
                        return Err(SyncError::ServiceStopped);
                    }
                    debug!(height, %authority, "synced block");

                    index += 1;
                    if index == bodies.len() {
                        info!(
                            blocks = bodies.len(),
                            top = target_height,
                            %authority,
                            "block range complete"
                        );
                        return Ok(());
                    }
                    if index == requested {
                        requested = self.request_bodies(bodies, index)?;
                    }
                }

                _ = ticker.tick() => {
                    let rate = meter.tick(index);
                    if rate < self.minimum_rate {
                        info!(
                            rate,
                            minimum = self.minimum_rate,
                            %authority,
                            "block sync rate below minimum"
                        );
                        return Err(SyncError::ChannelTimeout);
                    }
                }
            }
        }
    }

    /// Request the next batch of bodies starting at `from`; returns the end
    /// of the requested range.
    fn request_bodies(&self, bodies: &[tern_core::types::Hash256], from: usize) -> Result<usize, SyncError> {
        let end = bodies.len().min(from + MAX_GET_DATA);
        let inventory: Vec<Inventory> =
            bodies[from..end].iter().map(|h| Inventory::block(*h)).collect();
        debug!(
            authority = %self.channel.authority(),
            count = inventory.len(),
            "requesting block bodies"
        );
        self.channel
            .send(Message::GetData(inventory))
            .map_err(|_| SyncError::SendFailed)?;
        Ok(end)
    }
}
