//! A single candidate chain.
//!
//! A [`Chain`] owns an ordered header sequence, the UTXO set produced by
//! applying every block in order, the current difficulty divisor, and the
//! running issuance total. It validates and appends blocks one at a time;
//! the fork manager ([`blockchain`](crate::blockchain)) owns the set of
//! competing chains.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error};

use crate::constants::{
    BLOCK_DIFFICULTY_UPDATE_INTERVAL, BLOCK_MAX_TIME_FUTURE_SECS, COINBASE_MATURITY,
    INITIAL_BLOCK_DIFFICULTY, INITIAL_BLOCK_REWARD, MAX_BLOCK_SIZE_BYTES, MAX_COINS,
    MEDIAN_TIME_SPAN, REWARD_UPDATE_INTERVAL,
};
use crate::crypto;
use crate::difficulty;
use crate::error::{BlockError, ChainError, TransactionError};
use crate::merkle;
use crate::store::BlockStore;
use crate::types::{Block, BlockHeader, Hash, SingleOutput, Transaction};
use crate::utxo::Utxo;
use crate::validation;

/// An ordered list of block headers with its own UTXO set and difficulty.
///
/// Invariants, maintained by [`add_block`](Self::add_block):
/// - `header_list[i].prev_block_hash == hash(header_list[i-1])` for `i > 0`
/// - `header_list[i].height == i`
/// - `utxo` is the post-state of applying all blocks in order
/// - `hash_list[i] == hash(header_list[i])`
pub struct Chain {
    header_list: Vec<BlockHeader>,
    hash_list: Vec<Hash>,
    utxo: Utxo,
    target_difficulty: u64,
    total_issued: u64,
    store: Arc<dyn BlockStore>,
}

impl Chain {
    /// An empty chain at the initial difficulty.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            header_list: Vec::new(),
            hash_list: Vec::new(),
            utxo: Utxo::new(),
            target_difficulty: INITIAL_BLOCK_DIFFICULTY,
            total_issued: 0,
            store,
        }
    }

    /// Rebuild a chain by replaying stored blocks for the given headers.
    ///
    /// This is the soft-fork path: the header prefix shared with an
    /// existing chain is replayed from the block store into a fresh chain
    /// with its own UTXO. A replay failure means the store and the tracked
    /// chains disagree; the candidate is abandoned.
    pub fn build_from_header_list(
        headers: &[BlockHeader],
        store: Arc<dyn BlockStore>,
        now: i64,
    ) -> Result<Self, ChainError> {
        let mut chain = Self::new(Arc::clone(&store));
        for header in headers {
            let hash = header.hash().map_err(BlockError::from)?;
            let block = store.get(&hash)?.ok_or_else(|| {
                ChainError::Inconsistent(format!("block {hash} referenced but not stored"))
            })?;
            chain.add_block(&block, now)?;
        }
        Ok(chain)
    }

    /// Number of blocks in the chain.
    pub fn length(&self) -> u64 {
        self.header_list.len() as u64
    }

    /// The tip header, if any block has been added.
    pub fn tip(&self) -> Option<&BlockHeader> {
        self.header_list.last()
    }

    /// Hash of the tip header.
    pub fn tip_hash(&self) -> Option<&Hash> {
        self.hash_list.last()
    }

    /// Header at a given height.
    pub fn header_at(&self, height: u64) -> Option<&BlockHeader> {
        self.header_list.get(height as usize)
    }

    /// Header hash at a given height.
    pub fn hash_at(&self, height: u64) -> Option<&Hash> {
        self.hash_list.get(height as usize)
    }

    /// All header hashes, in height order.
    pub fn hashes(&self) -> &[Hash] {
        &self.hash_list
    }

    /// All headers, in height order.
    pub fn headers(&self) -> &[BlockHeader] {
        &self.header_list
    }

    /// Height of the header with the given hash, if it is on this chain.
    pub fn height_of(&self, hash: &Hash) -> Option<u64> {
        self.hash_list.iter().position(|h| h == hash).map(|i| i as u64)
    }

    /// Current difficulty divisor new blocks must meet.
    pub fn target_difficulty(&self) -> u64 {
        self.target_difficulty
    }

    /// The UTXO set as of the tip.
    pub fn utxo(&self) -> &Utxo {
        &self.utxo
    }

    /// Total coins minted by coinbase reward outputs so far.
    pub fn total_issued(&self) -> u64 {
        self.total_issued
    }

    /// Reward the next block's coinbase must claim.
    ///
    /// Halves every [`REWARD_UPDATE_INTERVAL`] blocks; zero once the
    /// issuance cap is reached.
    pub fn current_block_reward(&self) -> u64 {
        if self.total_issued >= MAX_COINS {
            return 0;
        }
        let epoch = self.length() / REWARD_UPDATE_INTERVAL;
        if epoch >= 64 {
            return 0;
        }
        INITIAL_BLOCK_REWARD >> epoch
    }

    /// Median timestamp of the last [`MEDIAN_TIME_SPAN`] headers.
    ///
    /// `None` while the chain is shorter than the span.
    pub fn median_time_past(&self) -> Option<i64> {
        if self.header_list.len() < MEDIAN_TIME_SPAN {
            return None;
        }
        let mut timestamps: Vec<i64> = self.header_list[self.header_list.len() - MEDIAN_TIME_SPAN..]
            .iter()
            .map(|h| h.timestamp)
            .collect();
        timestamps.sort_unstable();
        Some(timestamps[MEDIAN_TIME_SPAN / 2])
    }

    /// Validate a transaction against this chain's UTXO set.
    ///
    /// Re-runs the context-free checks, then resolves every non-coinbase
    /// input against the UTXO, enforces coinbase maturity, verifies the
    /// signature over the unsigned payload with the output owner's key,
    /// and checks value conservation against the declared fee. Coinbase
    /// transactions only get the structural pass here; their output
    /// amounts are a block-level rule.
    pub fn is_transaction_valid(&self, tx: &Transaction, now: i64) -> Result<(), TransactionError> {
        validation::validate_transaction(tx, now)?;

        let mut input_sum: u64 = 0;

        if !tx.is_coinbase {
            let payload = tx.unsigned_payload()?;
            for (&index, input) in &tx.vin {
                let Some(payout) = &input.payout else {
                    return Err(TransactionError::MissingPayout(index));
                };
                let entry = self
                    .utxo
                    .get(payout)
                    .ok_or_else(|| TransactionError::UnknownUtxo(payout.to_string()))?;

                if entry.is_coinbase {
                    let origin_height = entry.block_header.height;
                    if self.length() < origin_height + COINBASE_MATURITY {
                        return Err(TransactionError::ImmatureCoinbase {
                            origin_height,
                            chain_length: self.length(),
                        });
                    }
                }

                // Pay-to-public-key: the presented key IS the address.
                if input.pub_key != entry.output.address {
                    return Err(TransactionError::InvalidSignature { index });
                }
                crypto::verify(&input.pub_key, payload.as_bytes(), &input.sig)
                    .map_err(|_| TransactionError::InvalidSignature { index })?;

                input_sum = input_sum
                    .checked_add(entry.output.amount)
                    .ok_or(TransactionError::ValueOverflow)?;
            }
        }

        let output_sum = tx
            .total_output_amount()
            .ok_or(TransactionError::ValueOverflow)?;
        if input_sum > MAX_COINS || output_sum > MAX_COINS {
            return Err(TransactionError::ValueOverflow);
        }

        if !tx.is_coinbase {
            if input_sum <= output_sum {
                return Err(TransactionError::InputsDoNotCoverOutputs {
                    inputs: input_sum,
                    outputs: output_sum,
                });
            }
            let fee = input_sum - output_sum;
            if fee != tx.fees {
                return Err(TransactionError::FeeMismatch {
                    declared: tx.fees,
                    actual: fee,
                });
            }
        }

        Ok(())
    }

    /// Validate a block as the next block of this chain.
    pub fn is_block_valid(&self, block: &Block, now: i64) -> Result<(), BlockError> {
        // Context-free: size, coinbase placement, per-transaction
        // structure, merkle commitment.
        let size = block.serialized_size()?;
        if size > MAX_BLOCK_SIZE_BYTES {
            return Err(BlockError::Oversized {
                size,
                max: MAX_BLOCK_SIZE_BYTES,
            });
        }
        if block.transactions.is_empty() {
            return Err(BlockError::EmptyTransactions);
        }
        for (i, tx) in block.transactions.iter().enumerate() {
            if i == 0 && !tx.is_coinbase {
                return Err(BlockError::FirstTxNotCoinbase);
            }
            if i > 0 && tx.is_coinbase {
                return Err(BlockError::UnexpectedCoinbase(i as u64));
            }
            validation::validate_transaction(tx, now).map_err(|source| {
                BlockError::Transaction {
                    index: i as u64,
                    source,
                }
            })?;
        }
        if block.header.merkle_root != merkle::merkle_hash(&block.transactions)? {
            return Err(BlockError::InvalidMerkleRoot);
        }

        // Proof of work against this chain's difficulty.
        if block.header.target_difficulty < self.target_difficulty {
            return Err(BlockError::DifficultyBelowChain {
                got: block.header.target_difficulty,
                required: self.target_difficulty,
            });
        }
        let header_hash = block.header.hash()?;
        if !difficulty::is_proper_difficulty(&header_hash, self.target_difficulty) {
            return Err(BlockError::InvalidPow);
        }

        // Timestamp window: bounded above by local time plus drift, below
        // by the median of the last eleven headers.
        let limit = now + BLOCK_MAX_TIME_FUTURE_SECS;
        if block.header.timestamp > limit {
            return Err(BlockError::TimestampTooFarFuture {
                timestamp: block.header.timestamp,
                limit,
            });
        }
        if let Some(median) = self.median_time_past() {
            if block.header.timestamp <= median {
                return Err(BlockError::TimestampNotPastMedian {
                    timestamp: block.header.timestamp,
                    median,
                });
            }
        }

        // Linkage.
        match self.tip_hash() {
            Some(tip_hash) => {
                if block.header.prev_block_hash.as_ref() != Some(tip_hash) {
                    return Err(BlockError::InvalidPrevHash);
                }
            }
            None => {
                if block.header.prev_block_hash.is_some() {
                    return Err(BlockError::InvalidPrevHash);
                }
            }
        }
        if block.header.height != self.length() {
            return Err(BlockError::HeightMismatch {
                expected: self.length(),
                got: block.header.height,
            });
        }

        // Contextual transaction validity against the pre-block UTXO,
        // plus intra-block duplicate and double-spend rejection so the
        // UTXO update below never overwrites or misses an entry.
        let mut seen_txids: HashSet<Hash> = HashSet::new();
        let mut spent: HashSet<SingleOutput> = HashSet::new();
        let mut fee_total: u64 = 0;
        for (i, tx) in block.transactions.iter().enumerate() {
            let txid = tx.txid()?;
            if !seen_txids.insert(txid.clone()) {
                return Err(BlockError::DuplicateTxid(txid.to_string()));
            }
            self.is_transaction_valid(tx, now).map_err(|source| {
                BlockError::Transaction {
                    index: i as u64,
                    source,
                }
            })?;
            if !tx.is_coinbase {
                for input in tx.vin.values() {
                    if let Some(payout) = &input.payout {
                        if !spent.insert(payout.clone()) {
                            return Err(BlockError::DoubleSpend(payout.to_string()));
                        }
                    }
                }
                fee_total = fee_total
                    .checked_add(tx.fees)
                    .ok_or(BlockError::FeeOverflow)?;
            }
        }

        // Coinbase pays exactly the scheduled reward and the collected fees.
        let coinbase = &block.transactions[0];
        if coinbase.vout.len() != 2 {
            return Err(BlockError::CoinbaseOutputCount(coinbase.vout.len() as u64));
        }
        let (Some(reward_out), Some(fee_out)) = (coinbase.vout.get(&0), coinbase.vout.get(&1))
        else {
            return Err(BlockError::CoinbaseOutputCount(coinbase.vout.len() as u64));
        };
        if reward_out.amount != self.current_block_reward() {
            return Err(BlockError::CoinbaseRewardMismatch {
                got: reward_out.amount,
                expected: self.current_block_reward(),
            });
        }
        if fee_out.amount != fee_total {
            return Err(BlockError::CoinbaseFeesMismatch {
                got: fee_out.amount,
                expected: fee_total,
            });
        }

        Ok(())
    }

    /// Validate and append a block.
    ///
    /// On success the header is appended, the UTXO advances, issuance is
    /// tracked, the difficulty retargets on interval boundaries, and the
    /// block is persisted. On failure nothing is mutated: every fallible
    /// step (validation, UTXO staging, persistence) runs before the first
    /// write to chain state.
    pub fn add_block(&mut self, block: &Block, now: i64) -> Result<(), ChainError> {
        self.is_block_valid(block, now)?;
        let header_hash = block.header.hash().map_err(BlockError::from)?;
        let txids = self.stage_utxo_update(block)?;
        self.store.put(&header_hash, block)?;

        self.header_list.push(block.header.clone());
        self.hash_list.push(header_hash);
        self.update_utxo(block, &txids);

        // Only the reward output mints new coins; the fee output recycles.
        if let Some(reward_out) = block.transactions[0].vout.get(&0) {
            self.total_issued = self.total_issued.saturating_add(reward_out.amount);
        }

        self.update_target_difficulty();
        Ok(())
    }

    /// Stage a block's UTXO update without mutating anything.
    ///
    /// Precomputes every txid and checks that every spent output resolves
    /// in the current UTXO set. A miss here means the chain disagrees
    /// with its own validation pass — the fatal-inconsistency case, logged
    /// at the point of detection.
    fn stage_utxo_update(&self, block: &Block) -> Result<Vec<Hash>, ChainError> {
        let mut txids = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            txids.push(tx.txid().map_err(BlockError::from)?);
            if tx.is_coinbase {
                continue;
            }
            for input in tx.vin.values() {
                if let Some(payout) = &input.payout {
                    if !self.utxo.contains(payout) {
                        error!(
                            %payout,
                            height = block.header.height,
                            "validated block spends an output missing from the UTXO set"
                        );
                        return Err(ChainError::Inconsistent(format!(
                            "validated block spends missing output {payout}"
                        )));
                    }
                }
            }
        }
        Ok(txids)
    }

    /// Apply a staged block to the UTXO set. Infallible: every spend was
    /// resolved by [`stage_utxo_update`](Self::stage_utxo_update).
    ///
    /// For each transaction in order: remove every referenced output, then
    /// add every created output keyed by `(txid, index)`.
    fn update_utxo(&mut self, block: &Block, txids: &[Hash]) {
        for (tx, txid) in block.transactions.iter().zip(txids) {
            if !tx.is_coinbase {
                for input in tx.vin.values() {
                    if let Some(payout) = &input.payout {
                        self.utxo.remove(payout);
                    }
                }
            }
            for (&index, out) in &tx.vout {
                self.utxo.set(
                    SingleOutput {
                        txid: txid.clone(),
                        vout: index,
                    },
                    out.clone(),
                    block.header.clone(),
                    tx.is_coinbase,
                );
            }
        }
    }

    /// Retarget the difficulty on interval boundaries.
    fn update_target_difficulty(&mut self) {
        let len = self.header_list.len() as u64;
        if len == 0 || len % BLOCK_DIFFICULTY_UPDATE_INTERVAL != 0 {
            return;
        }
        let last = self.header_list.len() - 1;
        let first = last.saturating_sub(BLOCK_DIFFICULTY_UPDATE_INTERVAL as usize);
        let elapsed = self.header_list[last].timestamp - self.header_list[first].timestamp;
        let old = self.target_difficulty;
        self.target_difficulty = difficulty::retarget(old, elapsed);
        debug!(old, new = self.target_difficulty, elapsed, "difficulty retarget");
    }
}
