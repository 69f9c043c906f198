//! Sync tuning knobs.

use std::time::Duration;

/// Configuration for the two sync phases.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum header download rate (hashes per tick period); a channel
    /// below this is evicted so the session can try a faster peer.
    pub headers_per_second: u32,
    /// Minimum block download rate (blocks per tick period).
    pub blocks_per_minute: u32,
    /// Independently successful block-sync peers required before the block
    /// phase is declared complete.
    pub quorum: u32,
    /// Concurrent block-sync dials kept in flight.
    pub connections: u32,
    /// Tick period behind `headers_per_second`.
    pub header_tick: Duration,
    /// Tick period behind `blocks_per_minute`.
    pub block_tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            headers_per_second: 1000,
            blocks_per_minute: 60,
            quorum: 2,
            connections: 4,
            header_tick: Duration::from_secs(1),
            block_tick: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quorum_is_sane() {
        let cfg = SyncConfig::default();
        assert!(cfg.quorum >= 1);
        assert!(cfg.connections >= cfg.quorum);
    }
}
