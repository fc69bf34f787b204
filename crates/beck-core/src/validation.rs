//! Context-free transaction validation.
//!
//! These checks need no chain state: structure, size, amount ranges,
//! coinbase/payout consistency, and locktime. The UTXO-aware checks
//! (existence, maturity, signatures, value conservation) live on
//! [`Chain`](crate::chain::Chain), which re-runs this pass first.

use crate::constants::{MAX_BLOCK_SIZE_BYTES, MAX_COINS};
use crate::error::TransactionError;
use crate::types::Transaction;

/// Validate a transaction's structure against no state but the clock.
///
/// `now` is the local unix time used for the locktime bound.
pub fn validate_transaction(tx: &Transaction, now: i64) -> Result<(), TransactionError> {
    if tx.vin.is_empty() || tx.vout.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    let size = tx.serialized_size()?;
    if size > MAX_BLOCK_SIZE_BYTES {
        return Err(TransactionError::Oversized {
            size,
            max: MAX_BLOCK_SIZE_BYTES,
        });
    }

    for (&index, out) in &tx.vout {
        if out.amount > MAX_COINS {
            return Err(TransactionError::AmountOutOfRange {
                index,
                amount: out.amount,
            });
        }
    }

    for (&index, input) in &tx.vin {
        match &input.payout {
            // An input may only omit its payout reference inside a coinbase.
            None => {
                if !tx.is_coinbase {
                    return Err(TransactionError::MissingPayout(index));
                }
            }
            Some(payout) => {
                if tx.is_coinbase {
                    return Err(TransactionError::CoinbaseWithPayout(index));
                }
                if !payout.txid.is_well_formed() {
                    return Err(TransactionError::MalformedPayoutTxid(index));
                }
                if input.sig.is_empty() || input.pub_key.is_empty() {
                    return Err(TransactionError::EmptyCredentials(index));
                }
            }
        }
    }

    if tx.locktime > now {
        return Err(TransactionError::LocktimeInFuture {
            locktime: tx.locktime,
            now,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::hashing::dhash_str;
    use crate::types::{Hash, SingleOutput, TxIn, TxOut};

    const NOW: i64 = 1_700_000_000;

    fn coinbase() -> Transaction {
        Transaction {
            is_coinbase: true,
            version: 1,
            timestamp: NOW,
            locktime: 0,
            fees: 0,
            vin: BTreeMap::from([(0, TxIn { payout: None, sig: String::new(), pub_key: String::new() })]),
            vout: BTreeMap::from([(0, TxOut { amount: 50, address: "aa".repeat(33) })]),
        }
    }

    fn spend() -> Transaction {
        Transaction {
            is_coinbase: false,
            version: 1,
            timestamp: NOW,
            locktime: 0,
            fees: 5,
            vin: BTreeMap::from([(0, TxIn {
                payout: Some(SingleOutput { txid: dhash_str("origin"), vout: 0 }),
                sig: "cd".repeat(64),
                pub_key: "ab".repeat(33),
            })]),
            vout: BTreeMap::from([(0, TxOut { amount: 45, address: "ef".repeat(33) })]),
        }
    }

    #[test]
    fn valid_coinbase_passes() {
        assert!(validate_transaction(&coinbase(), NOW).is_ok());
    }

    #[test]
    fn valid_spend_passes() {
        assert!(validate_transaction(&spend(), NOW).is_ok());
    }

    #[test]
    fn rejects_empty_inputs() {
        let mut tx = spend();
        tx.vin.clear();
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::EmptyInputsOrOutputs)
        );
    }

    #[test]
    fn rejects_empty_outputs() {
        let mut tx = spend();
        tx.vout.clear();
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::EmptyInputsOrOutputs)
        );
    }

    #[test]
    fn rejects_amount_above_cap() {
        let mut tx = spend();
        tx.vout.get_mut(&0).unwrap().amount = MAX_COINS + 1;
        assert!(matches!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::AmountOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn amount_at_cap_is_allowed() {
        let mut tx = spend();
        tx.vout.get_mut(&0).unwrap().amount = MAX_COINS;
        assert!(validate_transaction(&tx, NOW).is_ok());
    }

    #[test]
    fn rejects_non_coinbase_without_payout() {
        let mut tx = spend();
        tx.vin.get_mut(&0).unwrap().payout = None;
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::MissingPayout(0))
        );
    }

    #[test]
    fn rejects_coinbase_with_payout() {
        let mut tx = coinbase();
        tx.vin.get_mut(&0).unwrap().payout =
            Some(SingleOutput { txid: dhash_str("x"), vout: 0 });
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::CoinbaseWithPayout(0))
        );
    }

    #[test]
    fn rejects_malformed_payout_txid() {
        let mut tx = spend();
        tx.vin.get_mut(&0).unwrap().payout =
            Some(SingleOutput { txid: Hash::from_digest("abc".into()), vout: 0 });
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::MalformedPayoutTxid(0))
        );
    }

    #[test]
    fn rejects_empty_signature() {
        let mut tx = spend();
        tx.vin.get_mut(&0).unwrap().sig = String::new();
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::EmptyCredentials(0))
        );
    }

    #[test]
    fn rejects_empty_pub_key() {
        let mut tx = spend();
        tx.vin.get_mut(&0).unwrap().pub_key = String::new();
        assert_eq!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::EmptyCredentials(0))
        );
    }

    #[test]
    fn rejects_future_locktime() {
        let mut tx = spend();
        tx.locktime = NOW + 1;
        assert!(matches!(
            validate_transaction(&tx, NOW),
            Err(TransactionError::LocktimeInFuture { .. })
        ));
    }

    #[test]
    fn locktime_at_now_is_allowed() {
        let mut tx = spend();
        tx.locktime = NOW;
        assert!(validate_transaction(&tx, NOW).is_ok());
    }
}
