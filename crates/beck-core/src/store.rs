//! The block store: an opaque key/value mapping from header hash to the
//! block's canonical encoding.
//!
//! Writes are idempotent by hash and reads are repeatable, so chains can
//! replay shared history without coordinating. The in-memory
//! implementation backs tests; the node supplies a RocksDB-backed one
//! through the same trait.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::types::{Block, Hash};

/// Serializable block storage keyed by header hash.
///
/// Safe for concurrent readers; the single writer is serialized by the
/// fork manager's lock.
pub trait BlockStore: Send + Sync {
    /// Persist a block under its header hash. Idempotent: re-putting the
    /// same hash is a no-op.
    fn put(&self, hash: &Hash, block: &Block) -> Result<(), StoreError>;

    /// Fetch and decode a block.
    fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError>;

    /// Fetch a block's raw canonical encoding (served verbatim to peers).
    fn get_raw(&self, hash: &Hash) -> Result<Option<String>, StoreError>;

    /// Drop a block. Returns whether it was present.
    fn remove(&self, hash: &Hash) -> Result<bool, StoreError>;

    /// Whether a block is stored under this hash.
    fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.get_raw(hash)?.is_some())
    }
}

/// In-memory block store for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, String>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, hash: &Hash, block: &Block) -> Result<(), StoreError> {
        let encoded = block.canonical_json()?;
        self.blocks.write().entry(hash.clone()).or_insert(encoded);
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        match self.get_raw(hash)? {
            Some(raw) => Ok(Some(Block::from_canonical_json(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_raw(&self, hash: &Hash) -> Result<Option<String>, StoreError> {
        Ok(self.blocks.read().get(hash).cloned())
    }

    fn remove(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.blocks.write().remove(hash).is_some())
    }
}
