//! Blockchain checkpoints: trusted `(height, hash)` anchors.
//!
//! Checkpoints are applied reactively during header accumulation: a header
//! landing on a checkpointed height must carry the checkpoint hash, and a
//! failed merge rolls the accumulated chain back to the deepest checkpoint
//! it still agrees with. This rejects divergent chains during bootstrap
//! without requiring proof-of-work verification up front.

use crate::types::Hash256;

/// A trusted anchor pinning the block hash at a given height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash256,
}

impl Checkpoint {
    pub fn new(height: u32, hash: Hash256) -> Self {
        Self { height, hash }
    }
}

/// Sort a checkpoint list ascending by height. Stable and deterministic.
pub fn sort(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by_key(|c| c.height);
}

/// Check a hash against the checkpoint at `height`, if one exists.
///
/// Returns `true` when no checkpoint covers that exact height, or when the
/// one that does matches `hash`. Checkpoints at other heights impose no
/// constraint on this call.
pub fn validate(hash: &Hash256, height: u32, checkpoints: &[Checkpoint]) -> bool {
    checkpoints
        .iter()
        .find(|c| c.height == height)
        .map_or(true, |c| c.hash == *hash)
}

/// The highest checkpoint, if any.
pub fn last(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
    checkpoints.iter().max_by_key(|c| c.height)
}
