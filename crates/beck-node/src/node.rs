//! Full node composition and event loop.
//!
//! A [`Node`] owns the fork manager behind one coarse mutex, the peer
//! working set, and the miner handle. Every mutating path — peer RPC,
//! sync, the miner's solved-block channel — funnels through
//! [`submit_block`](Node::submit_block) /
//! [`submit_transaction`](Node::submit_transaction), which acquire the
//! mutex exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beck_core::blockchain::{AddOutcome, BlockChain};
use beck_core::constants::{
    AVERAGE_BLOCK_MINE_INTERVAL, MINE_FEE_THRESHOLD, MINE_SIZE_THRESHOLD_BYTES,
};
use beck_core::crypto::KeyPair;
use beck_core::error::{BeckError, ChainError, MempoolError};
use beck_core::genesis;
use beck_core::store::BlockStore;
use beck_core::types::{Block, Hash, Transaction};

use crate::config::NodeConfig;
use crate::miner::{CandidateParams, Miner, build_candidate};
use crate::sync::{self, PeerInfo};

/// Seconds between peer discovery / sync rounds.
const SYNC_INTERVAL_SECS: u64 = 60;

/// Seconds between miner start-condition checks.
const MINER_CHECK_INTERVAL_SECS: u64 = AVERAGE_BLOCK_MINE_INTERVAL / 5;

/// Grace delay before a new active-chain block stops an in-progress solve.
const MINER_TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Gossip timeouts (per request).
const GOSSIP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const GOSSIP_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Sync fetch timeout; block bodies can be megabytes.
const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The full node.
pub struct Node {
    config: NodeConfig,
    chain: Mutex<BlockChain>,
    peers: Mutex<Vec<PeerInfo>>,
    miner: Miner,
    payout_address: String,
    solved_tx: mpsc::UnboundedSender<Block>,
    solved_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Block>>,
    gossip_client: reqwest::Client,
    sync_client: reqwest::Client,
}

impl Node {
    /// Build a node over the given block store and ingest the genesis
    /// block through the ordinary validation path.
    pub fn new(config: NodeConfig, store: Arc<dyn BlockStore>) -> Result<Arc<Self>, BeckError> {
        let mut chain = BlockChain::new(store);
        chain.add_block(&genesis::genesis_block(), Utc::now().timestamp())?;

        let payout_address = match &config.payout_address {
            Some(address) => address.clone(),
            None => {
                let keypair = KeyPair::generate();
                warn!(
                    address = %keypair.public_key_hex(),
                    secret = %keypair.secret_hex(),
                    "no payout address configured; mining to an ephemeral key"
                );
                keypair.public_key_hex()
            }
        };

        let gossip_client = reqwest::Client::builder()
            .connect_timeout(GOSSIP_CONNECT_TIMEOUT)
            .timeout(GOSSIP_SEND_TIMEOUT)
            .build()
            .map_err(|e| BeckError::Network(e.to_string()))?;
        let sync_client = reqwest::Client::builder()
            .connect_timeout(GOSSIP_CONNECT_TIMEOUT)
            .timeout(SYNC_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BeckError::Network(e.to_string()))?;

        let (solved_tx, solved_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Self {
            config,
            chain: Mutex::new(chain),
            peers: Mutex::new(Vec::new()),
            miner: Miner::new(),
            payout_address,
            solved_tx,
            solved_rx: tokio::sync::Mutex::new(solved_rx),
            gossip_client,
            sync_client,
        }))
    }

    // --- read-side accessors ---

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn seed_server(&self) -> &str {
        &self.config.seed_server
    }

    pub fn sync_client(&self) -> reqwest::Client {
        self.sync_client.clone()
    }

    /// Length of the active chain.
    pub fn chain_length(&self) -> u64 {
        self.chain.lock().active_chain().length()
    }

    /// Active-chain header hash at a height.
    pub fn active_hash_at(&self, height: u64) -> Option<Hash> {
        self.chain.lock().active_chain().hash_at(height).cloned()
    }

    /// Whether a hash is on the active chain.
    pub fn is_on_active_chain(&self, hash: &Hash) -> bool {
        self.chain.lock().active_chain().height_of(hash).is_some()
    }

    /// Active-chain header hashes strictly above `height` (which may be
    /// -1 for "everything").
    pub fn hashes_above(&self, height: i64) -> Vec<Hash> {
        let chain = self.chain.lock();
        let hashes = chain.active_chain().hashes();
        let start = (height + 1).max(0) as usize;
        hashes.get(start..).unwrap_or(&[]).to_vec()
    }

    /// A stored block's raw canonical encoding.
    pub fn block_raw(&self, hash: &Hash) -> Option<String> {
        let chain = self.chain.lock();
        chain.store().get_raw(hash).ok().flatten()
    }

    /// Number of pooled transactions.
    pub fn mempool_len(&self) -> usize {
        self.chain.lock().mempool().len()
    }

    /// The current peer working set.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().clone()
    }

    /// Replace the peer working set after a discovery round.
    pub fn set_peers(&self, peers: Vec<PeerInfo>) {
        *self.peers.lock() = peers;
    }

    // --- ingestion ---

    /// Ingest a block from a peer, sync, or the miner.
    ///
    /// Duplicates succeed silently. A block that lands on the active chain
    /// schedules miner termination; any newly accepted block is gossiped.
    pub fn submit_block(&self, block: &Block) -> Result<AddOutcome, ChainError> {
        let now = Utc::now().timestamp();
        let outcome = match self.chain.lock().add_block(block, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Consensus rejections are the caller's business to log;
                // an inconsistency means a chain was just abandoned.
                if matches!(e, ChainError::Inconsistent(_)) {
                    error!(error = %e, "chain inconsistency during block ingestion");
                }
                return Err(e);
            }
        };

        if outcome == AddOutcome::AlreadyKnown {
            return Ok(outcome);
        }

        info!(
            height = block.header.height,
            transactions = block.transactions.len(),
            on_active = outcome.on_active(),
            "block accepted"
        );

        if outcome.on_active() {
            self.miner.schedule_terminate(MINER_TERMINATE_GRACE);
        }

        match block.canonical_json() {
            Ok(body) => sync::broadcast_block(&self.gossip_client, &self.peers(), body),
            Err(e) => debug!(error = %e, "skipping gossip of unserializable block"),
        }

        Ok(outcome)
    }

    /// Ingest a transaction from a peer or the wallet surface.
    ///
    /// Returns the txid on admission, `None` for an already-pooled
    /// duplicate (silent success). Admission gossips the transaction and
    /// re-evaluates the miner start condition.
    pub fn submit_transaction(&self, tx: &Transaction) -> Result<Option<Hash>, MempoolError> {
        let now = Utc::now().timestamp();
        let result = self.chain.lock().receive_transaction(tx.clone(), now);
        match result {
            Ok(txid) => {
                info!(%txid, "transaction admitted to mempool");
                match tx.canonical_json() {
                    Ok(body) => {
                        sync::broadcast_transaction(&self.gossip_client, &self.peers(), body);
                    }
                    Err(e) => debug!(error = %e, "skipping gossip of unserializable tx"),
                }
                self.maybe_start_mining();
                Ok(Some(txid))
            }
            Err(MempoolError::AlreadyKnown(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // --- mining ---

    /// Start the miner when it is idle and the pool justifies a block:
    /// enough pending fees, enough pending bytes, or a stale tip.
    pub fn maybe_start_mining(&self) {
        if !self.config.mine || self.miner.is_mining() {
            return;
        }
        let now = Utc::now().timestamp();

        let candidate = {
            let chain = self.chain.lock();
            let active = chain.active_chain();
            let Some(tip) = active.tip() else {
                return;
            };
            let Some(tip_hash) = active.tip_hash() else {
                return;
            };

            let fees = chain.mempool().pending_fees();
            let size = chain.mempool().pending_size();
            let tip_age = now - tip.timestamp;
            let due = fees >= MINE_FEE_THRESHOLD
                || size >= MINE_SIZE_THRESHOLD_BYTES
                || tip_age >= (AVERAGE_BLOCK_MINE_INTERVAL / 2) as i64;
            if !due {
                return;
            }

            let params = CandidateParams {
                prev_block_hash: tip_hash.clone(),
                height: active.length(),
                target_difficulty: active.target_difficulty(),
                reward: active.current_block_reward(),
                payout_address: self.payout_address.clone(),
                timestamp: now.max(tip.timestamp + 1),
            };
            build_candidate(&params, chain.mempool().snapshot())
        };

        match candidate {
            Ok(block) => {
                self.miner.start(block, self.solved_tx.clone());
            }
            Err(e) => warn!(error = %e, "failed to assemble candidate block"),
        }
    }

    /// The miner handle (termination is idempotent).
    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    // --- event loop ---

    /// Run the periodic work: solved-block ingestion, sync rounds, and
    /// miner checks. Runs until the process shuts down.
    pub async fn run(self: Arc<Self>) {
        let mut sync_timer = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECS));
        let mut miner_timer =
            tokio::time::interval(Duration::from_secs(MINER_CHECK_INTERVAL_SECS));

        loop {
            tokio::select! {
                solved = async { self.solved_rx.lock().await.recv().await } => {
                    match solved {
                        Some(block) => {
                            if let Err(e) = self.submit_block(&block) {
                                // Lost the race to a peer block; normal.
                                debug!(error = %e, "solved block not accepted");
                            }
                        }
                        None => break,
                    }
                }
                _ = sync_timer.tick() => {
                    if self.config.sync {
                        sync::sync_round(&self).await;
                    }
                }
                _ = miner_timer.tick() => {
                    self.maybe_start_mining();
                }
            }
        }
    }
}
