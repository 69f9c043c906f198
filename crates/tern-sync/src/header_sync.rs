//! Header-sync protocol: drives one channel through repeated
//! `getheaders`/`headers` exchanges until the hash list reaches the target
//! height.
//!
//! The protocol owns its channel for the duration of the run and borrows
//! the session's hash list; partial progress (and rollback) is therefore
//! visible to whichever peer the session tries next.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tern_core::checkpoint::{self, Checkpoint};
use tern_core::constants::HEADERS_BATCH;
use tern_core::error::SyncError;
use tern_core::types::BlockHeader;
use tern_network::message::{GetHeaders, Message};
use tern_network::Channel;

use crate::hash_list::HashList;
use crate::rate::RateMeter;

/// One header-sync attempt on one channel.
pub struct HeaderSync {
    channel: Channel,
    minimum_rate: u32,
    tick: Duration,
    checkpoints: Vec<Checkpoint>,
}

impl HeaderSync {
    pub fn new(
        channel: Channel,
        minimum_rate: u32,
        tick: Duration,
        mut checkpoints: Vec<Checkpoint>,
    ) -> Self {
        checkpoint::sort(&mut checkpoints);
        Self { channel, minimum_rate, tick, checkpoints }
    }

    /// Run to completion. The channel is stopped on the way out whatever
    /// the outcome; the session only has to decide whether to redial.
    pub async fn run(self, hashes: &mut HashList) -> Result<(), SyncError> {
        let result = self.sync(hashes).await;
        self.channel.stop();
        result
    }

    async fn sync(&self, hashes: &mut HashList) -> Result<(), SyncError> {
        let authority = self.channel.authority();
        let target_height = hashes.target_height(&self.checkpoints);

        // A peer below the target cannot complete the chain; do not even
        // issue a request.
        if self.channel.peer_start_height() < target_height {
            info!(
                %authority,
                peer_height = self.channel.peer_start_height(),
                target_height,
                "peer is below the header sync target"
            );
            return Err(SyncError::ChannelStopped);
        }

        let mut events = self.channel.subscribe();
        let mut meter = RateMeter::new(hashes.len());
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.request_headers(hashes.last())?;

        loop {
            tokio::select! {
                _ = self.channel.wait_stop() => return Err(SyncError::ChannelStopped),

                event = events.recv() => {
                    let headers = match event {
                        Ok(Message::Headers(headers)) => headers,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%authority, skipped, "header subscriber lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => return Err(SyncError::ChannelStopped),
                    };

                    let count = headers.len();
                    merge_headers(hashes, &headers, &self.checkpoints).map_err(|e| {
                        info!(%authority, "failure merging headers");
                        e
                    })?;

                    info!(
                        from = hashes.next_height() - count as u32,
                        to = hashes.next_height() - 1,
                        %authority,
                        "synced headers"
                    );

                    // A full batch means the peer has more; anything short
                    // means its chain is exhausted.
                    if count == HEADERS_BATCH {
                        self.request_headers(hashes.last())?;
                        continue;
                    }
                    return if hashes.next_height() > target_height {
                        Ok(())
                    } else {
                        Err(SyncError::TargetNotReached)
                    };
                }

                _ = ticker.tick() => {
                    let rate = meter.tick(hashes.len());
                    if rate < self.minimum_rate {
                        info!(
                            rate,
                            minimum = self.minimum_rate,
                            %authority,
                            "header sync rate below minimum"
                        );
                        return Err(SyncError::ChannelTimeout);
                    }
                }
            }
        }
    }

    fn request_headers(&self, tip: tern_core::types::Hash256) -> Result<(), SyncError> {
        debug!(authority = %self.channel.authority(), %tip, "requesting headers");
        self.channel
            .send(Message::GetHeaders(GetHeaders::from_tip(tip)))
            .map_err(|_| SyncError::SendFailed)
    }
}

/// Append a batch of headers to the hash list.
///
/// Each header must link to the current tip and satisfy any checkpoint at
/// its height. On the first violation the list is rolled back and the whole
/// batch is rejected.
pub(crate) fn merge_headers(
    hashes: &mut HashList,
    headers: &[BlockHeader],
    checkpoints: &[Checkpoint],
) -> Result<(), SyncError> {
    let mut previous = hashes.last();
    for header in headers {
        let current = header.hash();
        if header.previous_block_hash != previous
            || !checkpoint::validate(&current, hashes.next_height(), checkpoints)
        {
            hashes.rollback(checkpoints);
            return Err(SyncError::PreviousBlockInvalid);
        }
        previous = current;
        hashes.push(current);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::types::Hash256;

    fn header_on(previous: Hash256, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 4,
            previous_block_hash: previous,
            merkle_root: Hash256::ZERO,
            timestamp: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce,
        }
    }

    fn linked_chain(from: Hash256, count: usize) -> Vec<BlockHeader> {
        let mut headers = Vec::with_capacity(count);
        let mut previous = from;
        for nonce in 0..count {
            let header = header_on(previous, nonce as u32);
            previous = header.hash();
            headers.push(header);
        }
        headers
    }

    #[test]
    fn merge_appends_linked_headers() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        let headers = linked_chain(genesis, 3);

        merge_headers(&mut hashes, &headers, &[]).unwrap();

        assert_eq!(hashes.len(), 4);
        assert_eq!(hashes.top_height(), 3);
        for (i, header) in headers.iter().enumerate() {
            assert_eq!(hashes.hash_at_height(i as u32 + 1), Some(header.hash()));
        }
    }

    #[test]
    fn merge_rejects_linkage_break_and_rolls_back_to_seed() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        let good = header_on(genesis, 1);
        let stray = header_on(Hash256([0xEE; 32]), 2);

        let err = merge_headers(&mut hashes, &[good, stray], &[]).unwrap_err();

        assert_eq!(err, SyncError::PreviousBlockInvalid);
        assert_eq!(hashes.as_slice(), &[genesis]);
    }

    #[test]
    fn merge_rejects_checkpoint_mismatch() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        let headers = linked_chain(genesis, 2);
        // Pin height 2 to a hash the chain will not produce.
        let checkpoints = [Checkpoint::new(2, Hash256([0xCD; 32]))];

        let err = merge_headers(&mut hashes, &headers, &checkpoints).unwrap_err();

        assert_eq!(err, SyncError::PreviousBlockInvalid);
        assert_eq!(hashes.as_slice(), &[genesis]);
    }

    #[test]
    fn merge_failure_rolls_back_to_matching_checkpoint() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        let headers = linked_chain(genesis, 3);
        merge_headers(&mut hashes, &headers, &[]).unwrap();

        // Anchor height 2 at the hash actually on the chain, then feed a
        // batch that breaks linkage: progress beyond the anchor is dropped.
        let checkpoints = [Checkpoint::new(2, headers[1].hash())];
        let stray = header_on(Hash256([0xEE; 32]), 99);

        let err = merge_headers(&mut hashes, &[stray], &checkpoints).unwrap_err();

        assert_eq!(err, SyncError::PreviousBlockInvalid);
        assert_eq!(hashes.top_height(), 2);
        assert_eq!(hashes.last(), headers[1].hash());
    }

    #[test]
    fn merge_accepts_headers_matching_checkpoints() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        let headers = linked_chain(genesis, 3);
        let checkpoints = [Checkpoint::new(2, headers[1].hash())];

        merge_headers(&mut hashes, &headers, &checkpoints).unwrap();
        assert_eq!(hashes.top_height(), 3);
    }

    #[test]
    fn merge_empty_batch_is_a_no_op() {
        let genesis = Hash256([0xAB; 32]);
        let mut hashes = HashList::new(0, genesis);
        merge_headers(&mut hashes, &[], &[]).unwrap();
        assert_eq!(hashes.len(), 1);
    }
}
