//! Error types for the Tern node, one enum per failure domain.
use thiserror::Error;

/// Failures while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of payload reading {0}")] UnexpectedEof(&'static str),
    #[error("unknown network magic")] BadMagic,
    #[error("checksum mismatch on '{0}'")] BadChecksum(String),
    #[error("payload too large: {size} > {max}")] OversizedPayload { size: usize, max: usize },
    #[error("malformed field: {0}")] Malformed(&'static str),
    #[error("too many entries in {field}: {count} > {max}")] TooManyEntries { field: &'static str, count: usize, max: usize },
}

/// Failures in the transport layer: dialing, handshaking, channel plumbing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("connect timed out")] ConnectTimeout,
    #[error("handshake failed: {0}")] Handshake(String),
    #[error("io: {0}")] Io(String),
    #[error(transparent)] Wire(#[from] WireError),
    #[error("no peer addresses available")] NoAddresses,
    #[error("channel closed")] ChannelClosed,
}

/// Completion codes surfaced by the sync protocols to their sessions.
///
/// Normal completion is `Ok(())`; every variant here tells the session how
/// the attempt ended so it can decide between redialing and giving up.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The peer or the local side shut the channel down.
    #[error("channel stopped")]
    ChannelStopped,
    /// Sync throughput fell below the configured minimum rate.
    #[error("sync rate below minimum")]
    ChannelTimeout,
    /// A header broke the chain linkage or contradicted a checkpoint.
    #[error("previous block invalid")]
    PreviousBlockInvalid,
    /// The peer ran out of data before the target height was reached.
    #[error("target height not reached")]
    TargetNotReached,
    /// A message could not be queued on the channel.
    #[error("send failed")]
    SendFailed,
    /// The owning session was stopped, or a local collaborator failed.
    #[error("service stopped")]
    ServiceStopped,
}

/// Failures in the block store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database: {0}")] Database(String),
    #[error("value codec: {0}")] Codec(String),
}

/// Top-level error for node orchestration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Sync(#[from] SyncError),
    #[error(transparent)] Store(#[from] StoreError),
}
