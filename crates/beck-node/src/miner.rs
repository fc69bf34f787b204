//! The mining task.
//!
//! The miner works on an immutable snapshot: candidate assembly copies the
//! mempool and chain tip under the node's lock, then the nonce search runs
//! as a detached tokio task with no shared mutable state. A solved block
//! travels back through the same ingestion channel a peer block would use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use beck_core::constants::{MAX_BLOCK_SIZE_BYTES, PROTOCOL_VERSION};
use beck_core::difficulty;
use beck_core::error::CodecError;
use beck_core::merkle;
use beck_core::types::{Block, BlockHeader, Hash, SingleOutput, Transaction, TxIn, TxOut};

/// How often the nonce loop checks the termination flag.
const TERMINATION_CHECK_STRIDE: u64 = 512;

/// How often the nonce loop yields to the runtime.
const YIELD_STRIDE: u64 = 8192;

/// Snapshot of everything the miner needs from the active chain.
#[derive(Clone, Debug)]
pub struct CandidateParams {
    pub prev_block_hash: Hash,
    pub height: u64,
    pub target_difficulty: u64,
    pub reward: u64,
    pub payout_address: String,
    pub timestamp: i64,
}

/// Assemble a candidate block from a mempool snapshot.
///
/// Candidates are sorted by fee descending and accepted greedily while the
/// running serialized size stays below the block budget. Transactions that
/// would double-spend an already-selected input (or masquerade as
/// coinbase) are skipped; the coinbase claims the scheduled reward plus
/// the accepted fees.
pub fn build_candidate(
    params: &CandidateParams,
    mut pool: Vec<Transaction>,
) -> Result<Block, CodecError> {
    pool.sort_by(|a, b| b.fees.cmp(&a.fees));

    let mut selected: Vec<Transaction> = Vec::new();
    let mut spent: std::collections::HashSet<SingleOutput> = std::collections::HashSet::new();
    let mut running_size: u64 = 0;
    let mut fees: u64 = 0;

    'candidates: for tx in pool {
        if tx.is_coinbase {
            continue;
        }
        let size = tx.serialized_size()?;
        if running_size.saturating_add(size) >= MAX_BLOCK_SIZE_BYTES {
            continue;
        }
        for input in tx.vin.values() {
            if let Some(payout) = &input.payout {
                if spent.contains(payout) {
                    continue 'candidates;
                }
            }
        }
        for input in tx.vin.values() {
            if let Some(payout) = &input.payout {
                spent.insert(payout.clone());
            }
        }
        running_size += size;
        fees = fees.saturating_add(tx.fees);
        selected.push(tx);
    }

    // Coinbase: reward to the miner, collected fees to the miner. The
    // height in `locktime` keeps coinbase txids unique across heights.
    let coinbase = Transaction {
        is_coinbase: true,
        version: PROTOCOL_VERSION,
        timestamp: params.timestamp,
        locktime: params.height as i64,
        fees: 0,
        vin: std::collections::BTreeMap::from([(
            0,
            TxIn { payout: None, sig: String::new(), pub_key: String::new() },
        )]),
        vout: std::collections::BTreeMap::from([
            (0, TxOut { amount: params.reward, address: params.payout_address.clone() }),
            (1, TxOut { amount: fees, address: params.payout_address.clone() }),
        ]),
    };

    let mut transactions = Vec::with_capacity(1 + selected.len());
    transactions.push(coinbase);
    transactions.extend(selected);

    let merkle_root = merkle::merkle_hash(&transactions)?;
    Ok(Block {
        header: BlockHeader {
            version: PROTOCOL_VERSION,
            height: params.height,
            prev_block_hash: Some(params.prev_block_hash.clone()),
            merkle_root,
            timestamp: params.timestamp,
            target_difficulty: params.target_difficulty,
            nonce: 0,
        },
        transactions,
    })
}

/// Handle to the node's single mining task.
///
/// `Idle → Mining → (Solved | Terminated) → Idle`; termination is
/// idempotent and a no-op while idle.
pub struct Miner {
    running: Arc<AtomicBool>,
}

impl Miner {
    pub fn new() -> Self {
        Self { running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_mining(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the current search, if any.
    pub fn terminate(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop the current search after a grace delay, so an in-progress
    /// solve racing the network loses without tearing down mid-check.
    pub fn schedule_terminate(&self, delay: Duration) {
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            running.store(false, Ordering::Relaxed);
        });
    }

    /// Start searching nonces for a candidate block.
    ///
    /// Returns `false` without spawning when a search is already running.
    /// The solved block is sent through `solved`.
    pub fn start(&self, candidate: Block, solved: mpsc::UnboundedSender<Block>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let running = Arc::clone(&self.running);
        info!(
            height = candidate.header.height,
            transactions = candidate.transactions.len(),
            difficulty = candidate.header.target_difficulty,
            "mining started"
        );
        tokio::spawn(solve(candidate, running, solved));
        true
    }
}

impl Default for Miner {
    fn default() -> Self {
        Self::new()
    }
}

/// Race nonces over the full 64-bit range until the header hash meets the
/// committed difficulty, the flag drops, or the range is exhausted.
async fn solve(mut block: Block, running: Arc<AtomicBool>, solved: mpsc::UnboundedSender<Block>) {
    let target = block.header.target_difficulty;
    for nonce in 0..=u64::MAX {
        if nonce % TERMINATION_CHECK_STRIDE == 0 && !running.load(Ordering::Relaxed) {
            debug!(nonce, "mining terminated");
            return;
        }
        if nonce % YIELD_STRIDE == 0 {
            tokio::task::yield_now().await;
        }

        block.header.nonce = nonce;
        let hash = match block.header.hash() {
            Ok(hash) => hash,
            Err(e) => {
                debug!(error = %e, "candidate header failed to serialize");
                running.store(false, Ordering::Relaxed);
                return;
            }
        };
        if difficulty::is_proper_difficulty(&hash, target) {
            info!(height = block.header.height, %hash, nonce, "block solved");
            running.store(false, Ordering::Relaxed);
            let _ = solved.send(block);
            return;
        }
    }
    running.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use beck_core::hashing::dhash_str;

    fn params() -> CandidateParams {
        CandidateParams {
            prev_block_hash: dhash_str("tip"),
            height: 3,
            target_difficulty: 1,
            reward: 50,
            payout_address: "ab".repeat(33),
            timestamp: 1_700_000_000,
        }
    }

    fn pool_tx(seed: u64, fees: u64) -> Transaction {
        Transaction {
            is_coinbase: false,
            version: PROTOCOL_VERSION,
            timestamp: seed as i64,
            locktime: 0,
            fees,
            vin: BTreeMap::from([(0, TxIn {
                payout: Some(SingleOutput { txid: dhash_str(&seed.to_string()), vout: 0 }),
                sig: "cd".repeat(64),
                pub_key: "ab".repeat(33),
            })]),
            vout: BTreeMap::from([(0, TxOut { amount: 1, address: "ef".repeat(33) })]),
        }
    }

    #[test]
    fn candidate_prepends_coinbase() {
        let block = build_candidate(&params(), vec![pool_tx(1, 5)]).unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert!(block.transactions[0].is_coinbase);
        assert_eq!(block.header.height, 3);
        assert_eq!(block.header.nonce, 0);
        assert_eq!(block.header.prev_block_hash, Some(dhash_str("tip")));
    }

    #[test]
    fn candidate_coinbase_outputs_reward_and_fees() {
        let block = build_candidate(&params(), vec![pool_tx(1, 5), pool_tx(2, 7)]).unwrap();
        let coinbase = &block.transactions[0];
        assert_eq!(coinbase.vout[&0].amount, 50);
        assert_eq!(coinbase.vout[&1].amount, 12);
    }

    #[test]
    fn candidate_sorts_by_fee_descending() {
        let block =
            build_candidate(&params(), vec![pool_tx(1, 1), pool_tx(2, 9), pool_tx(3, 5)]).unwrap();
        let fees: Vec<u64> = block.transactions[1..].iter().map(|t| t.fees).collect();
        assert_eq!(fees, vec![9, 5, 1]);
    }

    #[test]
    fn candidate_skips_conflicting_spends() {
        let a = pool_tx(1, 9);
        let mut b = pool_tx(2, 5);
        b.vin.get_mut(&0).unwrap().payout = a.vin[&0].payout.clone();
        let block = build_candidate(&params(), vec![a, b]).unwrap();
        // Only the higher-fee spend of the contested output is included.
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1].fees, 9);
    }

    #[test]
    fn candidate_skips_fake_coinbase() {
        let mut fake = pool_tx(1, 9);
        fake.is_coinbase = true;
        let block = build_candidate(&params(), vec![fake]).unwrap();
        assert_eq!(block.transactions.len(), 1);
    }

    #[test]
    fn candidate_merkle_commits_to_transactions() {
        let block = build_candidate(&params(), vec![pool_tx(1, 5)]).unwrap();
        assert_eq!(
            block.header.merkle_root,
            merkle::merkle_hash(&block.transactions).unwrap()
        );
    }

    #[tokio::test]
    async fn solve_finds_block_at_trivial_difficulty() {
        let candidate = build_candidate(&params(), vec![]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let miner = Miner::new();
        assert!(miner.start(candidate, tx));

        let block = rx.recv().await.expect("solved block");
        assert!(difficulty::is_proper_difficulty(
            &block.header.hash().unwrap(),
            block.header.target_difficulty
        ));
        assert!(!miner.is_mining());
    }

    #[tokio::test]
    async fn start_refuses_while_mining() {
        // An impossible target keeps the first search running.
        let mut p = params();
        p.target_difficulty = u64::MAX;
        let candidate = build_candidate(&p, vec![]).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let miner = Miner::new();
        assert!(miner.start(candidate.clone(), tx.clone()));
        assert!(!miner.start(candidate, tx));
        assert!(miner.is_mining());

        miner.terminate();
        // Idempotent.
        miner.terminate();
    }
}
