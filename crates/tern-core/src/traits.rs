//! Traits at the seams between the sync core and its collaborators.

use crate::error::StoreError;
use crate::types::{Block, Hash256};

/// Persistent destination for synchronized blocks.
///
/// Block sync delivers bodies in height order per peer, but several peers
/// may race over the same range, so `store_block` must be idempotent: a
/// block that is already present is accepted silently.
pub trait BlockStore: Send + Sync {
    /// Persist a block at the given height.
    fn store_block(&self, height: u32, block: &Block) -> Result<(), StoreError>;

    /// Whether a block with this hash is already stored.
    fn contains(&self, hash: &Hash256) -> Result<bool, StoreError>;

    /// The current best (height, hash) pair.
    fn tip(&self) -> Result<(u32, Hash256), StoreError>;
}
