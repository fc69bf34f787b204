//! The genesis block.
//!
//! Fixed for all peers; every node seeds its fork set by ingesting this
//! block through the ordinary [`BlockChain::add_block`] path, so it is
//! shaped like any other block: a two-output coinbase paying the full
//! initial reward and zero fees. The payout key is a burn key nobody holds
//! a secret for.
//!
//! [`BlockChain::add_block`]: crate::blockchain::BlockChain::add_block

use std::collections::BTreeMap;

use crate::constants::{INITIAL_BLOCK_DIFFICULTY, INITIAL_BLOCK_REWARD, PROTOCOL_VERSION};
use crate::merkle;
use crate::types::{Block, BlockHeader, Transaction, TxIn, TxOut};

/// Timestamp of the genesis block, unix seconds.
pub const GENESIS_TIMESTAMP: i64 = 1_231_006_505;

/// Nonce baked into the genesis header.
pub const GENESIS_NONCE: u64 = 2_083_236_893;

/// Burn address credited by the genesis coinbase.
const GENESIS_ADDRESS: &str =
    "029b2f6c1e4d8a357bde0f91c24a6e8b3d5c7f90a1b2c3d4e5f60718293a4b5c6d";

/// Build the genesis block.
///
/// Deterministic: every call, on every node, produces the same block and
/// therefore the same header hash.
pub fn genesis_block() -> Block {
    let coinbase = Transaction {
        is_coinbase: true,
        version: PROTOCOL_VERSION,
        timestamp: GENESIS_TIMESTAMP,
        locktime: 0,
        fees: 0,
        vin: BTreeMap::from([(
            0,
            TxIn {
                payout: None,
                sig: String::new(),
                pub_key: String::new(),
            },
        )]),
        vout: BTreeMap::from([
            (
                0,
                TxOut {
                    amount: INITIAL_BLOCK_REWARD,
                    address: GENESIS_ADDRESS.to_string(),
                },
            ),
            (
                1,
                TxOut {
                    amount: 0,
                    address: GENESIS_ADDRESS.to_string(),
                },
            ),
        ]),
    };

    let merkle_root = merkle::merkle_hash(std::slice::from_ref(&coinbase))
        .expect("genesis coinbase serializes");

    Block {
        header: BlockHeader {
            version: PROTOCOL_VERSION,
            height: 0,
            prev_block_hash: None,
            merkle_root,
            timestamp: GENESIS_TIMESTAMP,
            target_difficulty: INITIAL_BLOCK_DIFFICULTY,
            nonce: GENESIS_NONCE,
        },
        transactions: vec![coinbase],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::blockchain::{AddOutcome, BlockChain};
    use crate::store::MemoryBlockStore;

    fn now() -> i64 {
        GENESIS_TIMESTAMP + 1_000_000
    }

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(
            genesis_block().header.hash().unwrap(),
            genesis_block().header.hash().unwrap()
        );
        assert_eq!(genesis_block(), genesis_block());
    }

    #[test]
    fn genesis_shape() {
        let block = genesis_block();
        assert_eq!(block.header.height, 0);
        assert!(block.header.is_genesis());
        assert_eq!(block.transactions.len(), 1);
        let coinbase = block.coinbase().unwrap();
        assert!(coinbase.is_coinbase);
        assert_eq!(coinbase.vout.len(), 2);
        assert_eq!(coinbase.vout[&0].amount, INITIAL_BLOCK_REWARD);
        assert_eq!(coinbase.vout[&1].amount, 0);
    }

    #[test]
    fn genesis_passes_consensus_validation() {
        let mut bc = BlockChain::new(Arc::new(MemoryBlockStore::new()));
        let outcome = bc.add_block(&genesis_block(), now()).unwrap();
        assert_eq!(outcome, AddOutcome::Extended { on_active: true });
        assert_eq!(bc.active_chain().length(), 1);
        // Exactly the genesis coinbase outputs are unspent.
        assert_eq!(bc.active_chain().utxo().len(), 2);
    }

    #[test]
    fn genesis_round_trips() {
        let block = genesis_block();
        let json = block.canonical_json().unwrap();
        assert_eq!(Block::from_canonical_json(&json).unwrap(), block);
    }
}
