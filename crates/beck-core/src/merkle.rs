//! Merkle root over a block's transaction list.
//!
//! Leaves are transaction hashes ([`dhash`](crate::hashing::dhash) of the
//! canonical encoding). Odd layers duplicate their last element; parents
//! hash the concatenation of their children's hex strings. The root of an
//! empty list is a fixed sentinel that no real block can carry, since
//! consensus requires at least the coinbase transaction.

use crate::error::CodecError;
use crate::hashing::{dhash, dhash_str};
use crate::types::{Hash, Transaction};

/// Root reported for an empty transaction list.
pub const EMPTY_MERKLE_ROOT: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";

/// Compute the merkle root of an ordered transaction list.
pub fn merkle_hash(transactions: &[Transaction]) -> Result<Hash, CodecError> {
    if transactions.is_empty() {
        return Ok(Hash::from_digest(EMPTY_MERKLE_ROOT.to_string()));
    }
    if transactions.len() == 1 {
        return dhash(&transactions[0]);
    }

    let mut layer: Vec<Hash> = transactions
        .iter()
        .map(dhash)
        .collect::<Result<_, _>>()?;

    while layer.len() > 1 {
        if layer.len() % 2 != 0 {
            layer.push(layer[layer.len() - 1].clone());
        }
        layer = layer
            .chunks(2)
            .map(|pair| dhash_str(&format!("{}{}", pair[0].as_str(), pair[1].as_str())))
            .collect();
    }

    Ok(layer.into_iter().next().expect("non-empty layer"))
}
