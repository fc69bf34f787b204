//! RocksDB-backed block store.
//!
//! The persistent realization of [`BlockStore`]: header hash → canonical
//! block JSON. Writes are idempotent by construction (same hash, same
//! bytes) and reads are repeatable.

use std::path::Path;

use rocksdb::{DB, Options};

use beck_core::error::{CodecError, StoreError};
use beck_core::store::BlockStore;
use beck_core::types::{Block, Hash};

/// Persistent block storage in a RocksDB database.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl BlockStore for RocksStore {
    fn put(&self, hash: &Hash, block: &Block) -> Result<(), StoreError> {
        let encoded = block.canonical_json()?;
        self.db
            .put(hash.as_str().as_bytes(), encoded.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        match self.get_raw(hash)? {
            Some(raw) => Ok(Some(Block::from_canonical_json(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_raw(&self, hash: &Hash) -> Result<Option<String>, StoreError> {
        let bytes = self
            .db
            .get(hash.as_str().as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match bytes {
            Some(bytes) => {
                let raw = String::from_utf8(bytes)
                    .map_err(|e| StoreError::Codec(CodecError::Parse(e.to_string())))?;
                Ok(Some(raw))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, hash: &Hash) -> Result<bool, StoreError> {
        let present = self.contains(hash)?;
        if present {
            self.db
                .delete(hash.as_str().as_bytes())
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(present)
    }
}
