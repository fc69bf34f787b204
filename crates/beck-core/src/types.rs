//! Core protocol types: transactions, blocks, headers.
//!
//! All monetary values are in smallest units (1 BECK = 10^8 units).
//! Identities are double-SHA-256 hashes of the canonical JSON encoding
//! (see [`hashing`](crate::hashing)); hashes travel as 64-character
//! lowercase hex strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::HASH_LENGTH_HEX;
use crate::error::CodecError;
use crate::hashing;

/// A 32-byte double-SHA-256 digest as a 64-character lowercase hex string.
///
/// This is the wire, storage, and map-key form of every identity in the
/// protocol: transaction ids, block header hashes, and merkle roots.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Wrap an already-computed digest string without validation.
    ///
    /// Only the hashing and merkle modules produce these.
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Parse a hex string, rejecting anything that is not 64 lowercase hex
    /// characters.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let candidate = Self(s.to_string());
        if !candidate.is_well_formed() {
            return Err(CodecError::MalformedHash(s.to_string()));
        }
        Ok(candidate)
    }

    /// The hex string itself.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a 64-character lowercase hex string.
    ///
    /// Hashes arriving over the wire deserialize unchecked; boundary
    /// validation calls this before trusting them.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == HASH_LENGTH_HEX
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a single output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SingleOutput {
    /// The transaction that created the output.
    pub txid: Hash,
    /// Index of the output within that transaction.
    pub vout: u64,
}

impl fmt::Display for SingleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// A transaction output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    /// Amount in smallest units.
    pub amount: u64,
    /// The receiving public key, hex-encoded. Outputs are pay-to-public-key.
    pub address: String,
}

/// A transaction input.
///
/// `payout` is `None` exactly when the enclosing transaction is coinbase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// The unspent output being consumed.
    pub payout: Option<SingleOutput>,
    /// ECDSA signature over the unsigned transaction payload, hex-encoded.
    pub sig: String,
    /// Public key of the output's owner; must equal the output's address.
    pub pub_key: String,
}

/// A transaction.
///
/// `vin` and `vout` are index-keyed maps; `BTreeMap` keeps the canonical
/// encoding deterministic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Whether this transaction mints the block reward.
    pub is_coinbase: bool,
    pub version: u32,
    /// Creation time, unix seconds.
    pub timestamp: i64,
    /// Earliest unix time at which this transaction may be included.
    pub locktime: i64,
    /// Declared fee: inputs minus outputs. Zero for coinbase.
    pub fees: u64,
    pub vin: BTreeMap<u64, TxIn>,
    pub vout: BTreeMap<u64, TxOut>,
}

impl Transaction {
    /// The transaction id: double SHA-256 of the canonical encoding.
    pub fn txid(&self) -> Result<Hash, CodecError> {
        hashing::dhash(self)
    }

    /// Canonical JSON encoding.
    pub fn canonical_json(&self) -> Result<String, CodecError> {
        hashing::canonical_json(self)
    }

    /// Parse a transaction from its canonical encoding.
    pub fn from_canonical_json(raw: &str) -> Result<Self, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Parse(e.to_string()))
    }

    /// Serialized size in bytes of the canonical encoding.
    pub fn serialized_size(&self) -> Result<u64, CodecError> {
        Ok(self.canonical_json()?.len() as u64)
    }

    /// The byte payload that input signatures commit to: the canonical
    /// encoding of this transaction with `vin` emptied.
    pub fn unsigned_payload(&self) -> Result<String, CodecError> {
        let mut unsigned = self.clone();
        unsigned.vin.clear();
        hashing::canonical_json(&unsigned)
    }

    /// Sum of all output amounts. `None` on overflow.
    pub fn total_output_amount(&self) -> Option<u64> {
        self.vout
            .values()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }
}

/// A block header: the proof-of-work puzzle and chain linkage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    /// Position in the chain; the genesis block has height 0.
    pub height: u64,
    /// Hash of the previous header; `None` only for genesis.
    pub prev_block_hash: Option<Hash>,
    /// Merkle root over the block's transactions.
    pub merkle_root: Hash,
    /// Claimed mining time, unix seconds.
    pub timestamp: i64,
    /// Difficulty divisor the miner committed to.
    pub target_difficulty: u64,
    pub nonce: u64,
}

impl BlockHeader {
    /// The header hash: double SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Result<Hash, CodecError> {
        hashing::dhash(self)
    }

    /// Whether this header starts a chain.
    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_none()
    }
}

/// A block: header plus an ordered, non-empty transaction list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The first transaction, which consensus requires to be coinbase.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Canonical JSON encoding.
    pub fn canonical_json(&self) -> Result<String, CodecError> {
        hashing::canonical_json(self)
    }

    /// Parse a block from its canonical encoding.
    pub fn from_canonical_json(raw: &str) -> Result<Self, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Parse(e.to_string()))
    }

    /// Serialized size in bytes of the canonical encoding.
    pub fn serialized_size(&self) -> Result<u64, CodecError> {
        Ok(self.canonical_json()?.len() as u64)
    }
}
