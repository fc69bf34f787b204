//! Test scaffolding: deterministic keys, block assembly, and a fork set
//! wired to an in-memory store.
//!
//! Scenario tests use a custom genesis paying a key they hold, so that
//! coinbase outputs are spendable once matured. Blocks are ground against
//! the initial difficulty, which any honest hash meets.

use std::collections::BTreeMap;
use std::sync::Arc;

use beck_core::blockchain::BlockChain;
use beck_core::chain::Chain;
use beck_core::constants::{COINBASE_MATURITY, PROTOCOL_VERSION};
use beck_core::crypto::{self, KeyPair};
use beck_core::difficulty;
use beck_core::merkle;
use beck_core::store::{BlockStore, MemoryBlockStore};
use beck_core::types::{Block, BlockHeader, SingleOutput, Transaction, TxIn, TxOut};

/// Timestamp of the scenario genesis blocks.
pub const GENESIS_TIME: i64 = 1_231_006_505;

/// A "local clock" comfortably after every scenario timestamp.
pub fn now() -> i64 {
    GENESIS_TIME + 1_000_000
}

/// Deterministic keypair owning the scenario genesis coinbase.
pub fn test_keypair() -> KeyPair {
    KeyPair::from_secret_hex(&"11".repeat(32)).expect("fixed test secret")
}

/// A second deterministic keypair for recipients and rivals.
pub fn alt_keypair() -> KeyPair {
    KeyPair::from_secret_hex(&"22".repeat(32)).expect("fixed test secret")
}

/// A protocol-shaped coinbase: reward output then fee output.
pub fn coinbase_tx(reward: u64, fees: u64, address: &str, timestamp: i64) -> Transaction {
    Transaction {
        is_coinbase: true,
        version: PROTOCOL_VERSION,
        timestamp,
        locktime: 0,
        fees: 0,
        vin: BTreeMap::from([(0, TxIn { payout: None, sig: String::new(), pub_key: String::new() })]),
        vout: BTreeMap::from([
            (0, TxOut { amount: reward, address: address.to_string() }),
            (1, TxOut { amount: fees, address: address.to_string() }),
        ]),
    }
}

/// Assemble and nonce-grind the next block of `chain`.
pub fn next_block(chain: &Chain, txs: Vec<Transaction>, address: &str, timestamp: i64) -> Block {
    let fees = txs.iter().map(|t| t.fees).sum();
    let mut transactions =
        vec![coinbase_tx(chain.current_block_reward(), fees, address, timestamp)];
    transactions.extend(txs);

    let mut header = BlockHeader {
        version: PROTOCOL_VERSION,
        height: chain.length(),
        prev_block_hash: chain.tip_hash().cloned(),
        merkle_root: merkle::merkle_hash(&transactions).expect("test transactions serialize"),
        timestamp,
        target_difficulty: chain.target_difficulty(),
        nonce: 0,
    };
    grind(&mut header, chain.target_difficulty());
    Block { header, transactions }
}

/// Find a nonce meeting the difficulty.
pub fn grind(header: &mut BlockHeader, target_difficulty: u64) {
    while !difficulty::is_proper_difficulty(
        &header.hash().expect("test header serializes"),
        target_difficulty,
    ) {
        header.nonce += 1;
    }
}

/// A signed single-input spend; `fees` is `amount_in - amount_out`.
pub fn signed_spend(
    kp: &KeyPair,
    origin: SingleOutput,
    amount_in: u64,
    amount_out: u64,
    to: &str,
    timestamp: i64,
) -> Transaction {
    let mut tx = Transaction {
        is_coinbase: false,
        version: PROTOCOL_VERSION,
        timestamp,
        locktime: 0,
        fees: amount_in - amount_out,
        vin: BTreeMap::from([(0, TxIn { payout: Some(origin), sig: String::new(), pub_key: String::new() })]),
        vout: BTreeMap::from([(0, TxOut { amount: amount_out, address: to.to_string() })]),
    };
    crypto::sign_transaction(&mut tx, kp).expect("test transaction signs");
    tx
}

/// A fork set seeded with a genesis paying `test_keypair`, plus a mirror
/// chain for assembling blocks against the active branch.
pub fn setup() -> (BlockChain, Chain, KeyPair, Arc<dyn BlockStore>) {
    let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
    let mut bc = BlockChain::new(Arc::clone(&store));
    let mut mirror = Chain::new(Arc::clone(&store));
    let kp = test_keypair();

    let genesis = next_block(&mirror, vec![], &kp.public_key_hex(), GENESIS_TIME);
    mirror.add_block(&genesis, now()).expect("genesis applies to mirror");
    bc.add_block(&genesis, now()).expect("genesis accepted");
    (bc, mirror, kp, store)
}

/// Extend the mirror by one block (carrying `txs`) and feed it to the
/// fork set. Returns the block.
pub fn grow(
    bc: &mut BlockChain,
    mirror: &mut Chain,
    kp: &KeyPair,
    txs: Vec<Transaction>,
    timestamp: i64,
) -> Block {
    let block = next_block(mirror, txs, &kp.public_key_hex(), timestamp);
    mirror.add_block(&block, now()).expect("block applies to mirror");
    bc.add_block(&block, now()).expect("block accepted");
    block
}

/// Grow empty blocks until the genesis coinbase is spendable.
///
/// Leaves the chain at exactly `COINBASE_MATURITY` blocks; the genesis
/// output (height 0) matures precisely at that length.
pub fn mature_genesis(bc: &mut BlockChain, mirror: &mut Chain, kp: &KeyPair) {
    for i in 1..COINBASE_MATURITY as i64 {
        grow(bc, mirror, kp, vec![], GENESIS_TIME + i);
    }
}

/// The scenario genesis coinbase's output reference.
pub fn genesis_coinbase_output(store: &Arc<dyn BlockStore>, mirror: &Chain) -> SingleOutput {
    let genesis_hash = mirror.hash_at(0).expect("mirror holds genesis");
    let genesis = store
        .get(genesis_hash)
        .expect("store readable")
        .expect("genesis stored");
    SingleOutput {
        txid: genesis.transactions[0].txid().expect("coinbase txid"),
        vout: 0,
    }
}
