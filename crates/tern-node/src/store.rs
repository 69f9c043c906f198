//! RocksDB-backed block store.
//!
//! Column families: block bodies keyed by hash, a height-to-hash index,
//! and tip metadata. All mutations go through an atomic [`WriteBatch`]
//! under a write lock, so concurrent block-sync peers can deliver the same
//! heights without corrupting the tip.
//!
//! On first open the store is seeded with the network's genesis hash at
//! height 0. Only the hash is recorded; sync starts above it.

use std::path::Path;
use std::sync::Mutex;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use tern_core::constants::NetworkKind;
use tern_core::error::StoreError;
use tern_core::traits::BlockStore;
use tern_core::types::{Block, Hash256};

const CF_BLOCKS: &str = "blocks";
const CF_HEIGHT_INDEX: &str = "height_index";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[CF_BLOCKS, CF_HEIGHT_INDEX, CF_METADATA];

const META_TIP_HEIGHT: &[u8] = b"tip_height";
const META_TIP_HASH: &[u8] = b"tip_hash";

/// Persistent block store.
pub struct RocksStore {
    db: DB,
    // Serializes read-modify-write of the tip across sync peers.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create the database at `path`, seeding the genesis hash of
    /// `network` as the tip when the store is empty.
    pub fn open(path: impl AsRef<Path>, network: NetworkKind) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { db, write_lock: Mutex::new(()) };

        if store.read_meta(META_TIP_HEIGHT)?.is_none() {
            let genesis = network.genesis_hash();
            let mut batch = WriteBatch::default();
            batch.put_cf(store.cf(CF_HEIGHT_INDEX)?, Self::height_key(0), genesis.as_bytes());
            batch.put_cf(store.cf(CF_METADATA)?, META_TIP_HEIGHT, 0u32.to_le_bytes());
            batch.put_cf(store.cf(CF_METADATA)?, META_TIP_HASH, genesis.as_bytes());
            store
                .db
                .write(batch)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(store)
    }

    /// The stored hash at `height`, if any.
    pub fn hash_at_height(&self, height: u32) -> Result<Option<Hash256>, StoreError> {
        let value = self
            .db
            .get_cf(self.cf(CF_HEIGHT_INDEX)?, Self::height_key(height))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        value.map(Self::decode_hash).transpose()
    }

    /// The stored block with `hash`, if any.
    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        let value = self
            .db
            .get_cf(self.cf(CF_BLOCKS)?, hash.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;
        value
            .map(|bytes| {
                bincode::decode_from_slice(&bytes, bincode::config::standard())
                    .map(|(block, _)| block)
                    .map_err(|e| StoreError::Codec(e.to_string()))
            })
            .transpose()
    }

    /// The stored block at `height`, if any.
    pub fn block_at_height(&self, height: u32) -> Result<Option<Block>, StoreError> {
        match self.hash_at_height(height)? {
            Some(hash) => self.block(&hash),
            None => Ok(None),
        }
    }

    /// Flush in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::Database(e.to_string()))
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("missing column family '{name}'")))
    }

    fn height_key(height: u32) -> [u8; 4] {
        height.to_be_bytes()
    }

    fn read_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get_cf(self.cf(CF_METADATA)?, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn decode_hash(bytes: Vec<u8>) -> Result<Hash256, StoreError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::Codec("stored hash is not 32 bytes".to_string()))?;
        Ok(Hash256(array))
    }
}

impl BlockStore for RocksStore {
    fn store_block(&self, height: u32, block: &Block) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("store write lock");

        let hash = block.hash();
        if self.contains(&hash)? {
            return Ok(());
        }

        let encoded = bincode::encode_to_vec(block, bincode::config::standard())
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        let (tip_height, _) = self.tip()?;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, hash.as_bytes(), encoded);
        batch.put_cf(self.cf(CF_HEIGHT_INDEX)?, Self::height_key(height), hash.as_bytes());
        if height > tip_height {
            batch.put_cf(self.cf(CF_METADATA)?, META_TIP_HEIGHT, height.to_le_bytes());
            batch.put_cf(self.cf(CF_METADATA)?, META_TIP_HASH, hash.as_bytes());
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn contains(&self, hash: &Hash256) -> Result<bool, StoreError> {
        let value = self
            .db
            .get_cf(self.cf(CF_BLOCKS)?, hash.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(value.is_some())
    }

    fn tip(&self) -> Result<(u32, Hash256), StoreError> {
        let height_bytes = self
            .read_meta(META_TIP_HEIGHT)?
            .ok_or_else(|| StoreError::Database("tip height missing".to_string()))?;
        let height = u32::from_le_bytes(
            height_bytes
                .try_into()
                .map_err(|_| StoreError::Codec("stored height is not 4 bytes".to_string()))?,
        );
        let hash_bytes = self
            .read_meta(META_TIP_HASH)?
            .ok_or_else(|| StoreError::Database("tip hash missing".to_string()))?;
        Ok((height, Self::decode_hash(hash_bytes)?))
    }
}
