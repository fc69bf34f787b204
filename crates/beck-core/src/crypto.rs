//! secp256k1 ECDSA over the protocol's hex-string encodings.
//!
//! Outputs are pay-to-public-key: a `TxOut.address` is the owner's
//! compressed public key in hex, and a spending input presents the same
//! key plus a compact-encoded signature. Signatures commit to the SHA-256
//! digest of the transaction's unsigned payload (the canonical encoding
//! with `vin` emptied), so inputs can be signed after outputs are final.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{CodecError, CryptoError};
use crate::types::Transaction;

/// A secp256k1 keypair.
///
/// The public side doubles as the owner's address; see
/// [`public_key_hex`](Self::public_key_hex).
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secret, public }
    }

    /// Rebuild a keypair from a 32-byte secret key in hex.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str).map_err(|_| CryptoError::InvalidSecretKey)?;
        let secret =
            SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = secret.public_key(&Secp256k1::new());
        Ok(Self { secret, public })
    }

    /// The secret key in hex. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// The compressed public key in hex; this is the address form used in
    /// outputs.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Sign a payload, returning the compact signature in hex.
    pub fn sign_payload(&self, payload: &[u8]) -> String {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(Sha256::digest(payload).into());
        hex::encode(secp.sign_ecdsa(&msg, &self.secret).serialize_compact())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a hex-encoded compact signature over a payload with a hex-encoded
/// compressed public key.
pub fn verify(pub_key_hex: &str, payload: &[u8], sig_hex: &str) -> Result<(), CryptoError> {
    let key_bytes = hex::decode(pub_key_hex).map_err(|_| CryptoError::InvalidPublicKey)?;
    let public = PublicKey::from_slice(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig_bytes = hex::decode(sig_hex).map_err(|_| CryptoError::InvalidSignature)?;
    let signature =
        Signature::from_compact(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    let msg = Message::from_digest(Sha256::digest(payload).into());
    Secp256k1::new()
        .verify_ecdsa(&msg, &signature, &public)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Sign every input of a transaction with the given keypair.
///
/// Fills in `sig` and `pub_key` on each input. The payload is computed
/// once; all inputs carry the same signature since they commit to the same
/// unsigned transaction.
pub fn sign_transaction(tx: &mut Transaction, keypair: &KeyPair) -> Result<(), CodecError> {
    let payload = tx.unsigned_payload()?;
    let sig = keypair.sign_payload(payload.as_bytes());
    let pub_key = keypair.public_key_hex();
    for input in tx.vin.values_mut() {
        input.sig = sig.clone();
        input.pub_key = pub_key.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_public_key_is_compressed_hex() {
        let kp = KeyPair::generate();
        let pk = kp.public_key_hex();
        assert_eq!(pk.len(), 66);
        assert!(pk.starts_with("02") || pk.starts_with("03"));
    }

    #[test]
    fn secret_round_trips() {
        let kp = KeyPair::generate();
        let back = KeyPair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(back.public_key_hex(), kp.public_key_hex());
    }

    #[test]
    fn from_secret_rejects_garbage() {
        assert!(KeyPair::from_secret_hex("nope").is_err());
        assert!(KeyPair::from_secret_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn sign_and_verify() {
        let kp = KeyPair::generate();
        let sig = kp.sign_payload(b"payload");
        assert!(verify(&kp.public_key_hex(), b"payload", &sig).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_payload() {
        let kp = KeyPair::generate();
        let sig = kp.sign_payload(b"payload");
        assert_eq!(
            verify(&kp.public_key_hex(), b"other", &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = kp.sign_payload(b"payload");
        assert_eq!(
            verify(&other.public_key_hex(), b"payload", &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_zeroed_signature() {
        let kp = KeyPair::generate();
        assert!(verify(&kp.public_key_hex(), b"payload", &"00".repeat(64)).is_err());
    }

    #[test]
    fn verify_rejects_malformed_inputs() {
        let kp = KeyPair::generate();
        let sig = kp.sign_payload(b"payload");
        assert_eq!(
            verify("zz", b"payload", &sig),
            Err(CryptoError::InvalidPublicKey)
        );
        assert_eq!(
            verify(&kp.public_key_hex(), b"payload", "zz"),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn sign_transaction_fills_all_inputs() {
        use crate::types::{SingleOutput, TxIn, TxOut};
        use std::collections::BTreeMap;

        let kp = KeyPair::generate();
        let origin = |v| SingleOutput {
            txid: crate::hashing::dhash_str("origin"),
            vout: v,
        };
        let mut tx = Transaction {
            is_coinbase: false,
            version: 1,
            timestamp: 0,
            locktime: 0,
            fees: 1,
            vin: BTreeMap::from([
                (0, TxIn { payout: Some(origin(0)), sig: String::new(), pub_key: String::new() }),
                (1, TxIn { payout: Some(origin(1)), sig: String::new(), pub_key: String::new() }),
            ]),
            vout: BTreeMap::from([(0, TxOut { amount: 9, address: kp.public_key_hex() })]),
        };

        sign_transaction(&mut tx, &kp).unwrap();

        let payload = tx.unsigned_payload().unwrap();
        for input in tx.vin.values() {
            assert_eq!(input.pub_key, kp.public_key_hex());
            assert!(verify(&input.pub_key, payload.as_bytes(), &input.sig).is_ok());
        }
    }
}
