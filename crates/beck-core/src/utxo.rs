//! The unspent transaction output set.
//!
//! Keyed directly by [`SingleOutput`] value equality. The container does
//! not police overwrites; a `set` on a live key cannot happen in a valid
//! chain because block validation rejects duplicate txids and double
//! spends before the UTXO is touched.

use std::collections::HashMap;

use crate::types::{BlockHeader, SingleOutput, TxOut};

/// A single unspent output together with provenance needed for validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntry {
    /// The unspent output.
    pub output: TxOut,
    /// Header of the block whose transaction created this output.
    pub block_header: BlockHeader,
    /// Whether the creating transaction was coinbase (maturity applies).
    pub is_coinbase: bool,
}

/// Mapping from output reference to unspent output.
#[derive(Clone, Debug, Default)]
pub struct Utxo {
    entries: HashMap<SingleOutput, UtxoEntry>,
}

impl Utxo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an unspent output.
    pub fn get(&self, so: &SingleOutput) -> Option<&UtxoEntry> {
        self.entries.get(so)
    }

    /// Record a new unspent output.
    pub fn set(&mut self, so: SingleOutput, output: TxOut, header: BlockHeader, is_coinbase: bool) {
        self.entries.insert(
            so,
            UtxoEntry {
                output,
                block_header: header,
                is_coinbase,
            },
        );
    }

    /// Remove a spent output. Returns whether it was present.
    pub fn remove(&mut self, so: &SingleOutput) -> bool {
        self.entries.remove(so).is_some()
    }

    pub fn contains(&self, so: &SingleOutput) -> bool {
        self.entries.contains_key(so)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all unspent outputs (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = (&SingleOutput, &UtxoEntry)> {
        self.entries.iter()
    }
}
