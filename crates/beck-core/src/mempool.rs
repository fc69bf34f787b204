//! The pool of validated transactions awaiting inclusion in a block.
//!
//! Keyed by transaction identity (the txid). The pool itself only refuses
//! duplicates; chain-context validity is the admission rule enforced by
//! [`BlockChain::receive_transaction`](crate::blockchain::BlockChain::receive_transaction).

use std::collections::HashMap;

use crate::error::MempoolError;
use crate::types::{Block, Hash, Transaction};

/// A pooled transaction with its serialized size cached for the miner's
/// start condition.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub size: u64,
}

/// Set of candidate transactions keyed by txid.
#[derive(Default)]
pub struct Mempool {
    entries: HashMap<Hash, MempoolEntry>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction, keyed by its identity.
    ///
    /// Returns the txid, or [`MempoolError::AlreadyKnown`] for a duplicate.
    pub fn insert(&mut self, tx: Transaction) -> Result<Hash, MempoolError> {
        let txid = tx.txid()?;
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyKnown(txid.to_string()));
        }
        let size = tx.serialized_size()?;
        self.entries.insert(txid.clone(), MempoolEntry { tx, size });
        Ok(txid)
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn remove(&mut self, txid: &Hash) -> Option<MempoolEntry> {
        self.entries.remove(txid)
    }

    /// Evict every transaction that appears in the given block, compared
    /// by identity. Called when a block lands on the active chain.
    pub fn remove_block_transactions(&mut self, block: &Block) {
        for tx in &block.transactions {
            if let Ok(txid) = tx.txid() {
                self.entries.remove(&txid);
            }
        }
    }

    /// Clone out the current candidates, in arbitrary order.
    ///
    /// The miner snapshots the pool and works on its copy; the pool keeps
    /// changing underneath.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.values().map(|e| e.tx.clone()).collect()
    }

    /// Sum of declared fees across the pool.
    pub fn pending_fees(&self) -> u64 {
        self.entries.values().map(|e| e.tx.fees).fold(0, u64::saturating_add)
    }

    /// Sum of serialized sizes across the pool, in bytes.
    pub fn pending_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).fold(0, u64::saturating_add)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
