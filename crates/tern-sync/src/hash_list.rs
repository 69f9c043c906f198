//! The accumulated chain of block hashes under construction.
//!
//! Index `i` always corresponds to height `first_height + i`, and the list
//! is never empty: element zero is the trusted starting hash (genesis or
//! the stored tip). Header sync grows the list one validated header at a
//! time and rolls it back on a failed merge; afterwards it is frozen and
//! shared read-only with block sync.

use tern_core::checkpoint::{self, Checkpoint};
use tern_core::types::Hash256;

/// Ordered block-hash sequence anchored at a known height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashList {
    first_height: u32,
    hashes: Vec<Hash256>,
}

impl HashList {
    /// Start a list from the trusted `(height, hash)` anchor.
    pub fn new(first_height: u32, seed: Hash256) -> Self {
        Self { first_height, hashes: vec![seed] }
    }

    pub fn first_height(&self) -> u32 {
        self.first_height
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// The list holds at least the seed, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The current tip hash.
    pub fn last(&self) -> Hash256 {
        *self.hashes.last().expect("hash list is never empty")
    }

    /// Height of the current tip.
    pub fn top_height(&self) -> u32 {
        self.first_height + (self.hashes.len() as u32 - 1)
    }

    /// Height the next appended hash will occupy.
    pub fn next_height(&self) -> u32 {
        self.first_height + self.hashes.len() as u32
    }

    /// The height header sync must reach: the highest checkpoint, or the
    /// current tip when checkpoints do not reach past it.
    pub fn target_height(&self, checkpoints: &[Checkpoint]) -> u32 {
        checkpoint::last(checkpoints)
            .map(|c| c.height)
            .unwrap_or(0)
            .max(self.top_height())
    }

    pub fn push(&mut self, hash: Hash256) {
        self.hashes.push(hash);
    }

    /// All hashes, index 0 at `first_height`.
    pub fn as_slice(&self) -> &[Hash256] {
        &self.hashes
    }

    /// The hashes whose bodies block sync must fetch: everything above the
    /// seed.
    pub fn body_hashes(&self) -> &[Hash256] {
        &self.hashes[1..]
    }

    /// The stored hash for `height`, if the list covers it.
    pub fn hash_at_height(&self, height: u32) -> Option<Hash256> {
        let offset = height.checked_sub(self.first_height)? as usize;
        self.hashes.get(offset).copied()
    }

    /// Discard unverifiable progress after a failed merge.
    ///
    /// Walks checkpoints from the highest down; the first checkpoint hash
    /// present in the list proves the prefix up to and including it, so
    /// everything past that element is dropped. With no checkpoint match
    /// the list shrinks back to the seed.
    pub fn rollback(&mut self, checkpoints: &[Checkpoint]) {
        for anchor in checkpoints.iter().rev() {
            if let Some(position) = self.hashes.iter().position(|h| *h == anchor.hash) {
                self.hashes.truncate(position + 1);
                return;
            }
        }
        self.hashes.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    fn seeded() -> HashList {
        let mut list = HashList::new(100, hash(0));
        list.push(hash(1));
        list.push(hash(2));
        list.push(hash(3));
        list
    }

    #[test]
    fn heights_track_first_height() {
        let list = seeded();
        assert_eq!(list.len(), 4);
        assert_eq!(list.top_height(), 103);
        assert_eq!(list.next_height(), 104);
        assert_eq!(list.hash_at_height(100), Some(hash(0)));
        assert_eq!(list.hash_at_height(103), Some(hash(3)));
        assert_eq!(list.hash_at_height(104), None);
        assert_eq!(list.hash_at_height(99), None);
    }

    #[test]
    fn body_hashes_exclude_the_seed() {
        let list = seeded();
        assert_eq!(list.body_hashes(), &[hash(1), hash(2), hash(3)]);
    }

    #[test]
    fn target_height_is_max_of_tip_and_last_checkpoint() {
        let list = seeded();
        assert_eq!(list.target_height(&[]), 103);

        let below = [Checkpoint::new(101, hash(1))];
        assert_eq!(list.target_height(&below), 103);

        let above = [Checkpoint::new(101, hash(1)), Checkpoint::new(500, hash(9))];
        assert_eq!(list.target_height(&above), 500);
    }

    #[test]
    fn rollback_without_checkpoints_keeps_only_the_seed() {
        let mut list = seeded();
        list.rollback(&[]);
        assert_eq!(list.as_slice(), &[hash(0)]);
        assert_eq!(list.top_height(), 100);
    }

    #[test]
    fn rollback_truncates_just_after_matching_checkpoint() {
        let mut list = seeded();
        list.rollback(&[Checkpoint::new(102, hash(2))]);
        assert_eq!(list.as_slice(), &[hash(0), hash(1), hash(2)]);
    }

    #[test]
    fn rollback_prefers_the_highest_matching_checkpoint() {
        let mut list = seeded();
        let checkpoints = [
            Checkpoint::new(101, hash(1)),
            Checkpoint::new(102, hash(2)),
        ];
        list.rollback(&checkpoints);
        assert_eq!(list.as_slice(), &[hash(0), hash(1), hash(2)]);
    }

    #[test]
    fn rollback_ignores_checkpoints_not_in_the_list() {
        let mut list = seeded();
        list.rollback(&[Checkpoint::new(999, hash(0xEE))]);
        assert_eq!(list.as_slice(), &[hash(0)]);
    }

    #[test]
    fn rollback_is_idempotent() {
        let mut list = seeded();
        let checkpoints = [Checkpoint::new(102, hash(2))];
        list.rollback(&checkpoints);
        let once = list.clone();
        list.rollback(&checkpoints);
        assert_eq!(list, once);

        let mut bare = seeded();
        bare.rollback(&[]);
        let once = bare.clone();
        bare.rollback(&[]);
        assert_eq!(bare, once);
        assert_eq!(bare.len(), 1);
    }
}
