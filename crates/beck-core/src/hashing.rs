//! Double-SHA-256 over canonical serializations.
//!
//! Every identity in the protocol is `sha256(sha256(bytes))` rendered as
//! lowercase hex. For structured values the bytes are the canonical JSON
//! encoding (declaration-order fields, numerically ordered index maps); for
//! raw hashes the bytes are the hex string itself, which is how merkle
//! nodes combine their children.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CodecError;
use crate::types::Hash;

/// Canonical JSON encoding of a protocol value.
///
/// serde_json writes struct fields in declaration order and `BTreeMap` keys
/// in ascending order, so the output is deterministic and round-trips
/// exactly.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Double SHA-256 of a value's canonical encoding.
pub fn dhash<T: Serialize>(value: &T) -> Result<Hash, CodecError> {
    Ok(dhash_bytes(canonical_json(value)?.as_bytes()))
}

/// Double SHA-256 of a raw string (used for hex-string concatenation in the
/// merkle tree).
pub fn dhash_str(s: &str) -> Hash {
    dhash_bytes(s.as_bytes())
}

fn dhash_bytes(bytes: &[u8]) -> Hash {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    Hash::from_digest(hex::encode(second))
}
