//! Fork management: the set of candidate chains and the active pointer.
//!
//! All tracked chains share block bodies through the block store; sharing
//! is expressed by per-hash reference counts, not shared pointers. A block
//! is evicted from the store when the last chain referencing it is pruned.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chain::Chain;
use crate::constants::FORK_CHAIN_HEIGHT;
use crate::error::{BlockError, ChainError, MempoolError};
use crate::mempool::Mempool;
use crate::store::BlockStore;
use crate::types::{Block, Hash, Transaction};

/// How an accepted block entered the fork set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The block was already known; nothing changed.
    AlreadyKnown,
    /// The block extended the tip of a tracked chain.
    Extended {
        /// Whether the extended chain is the active chain afterwards.
        on_active: bool,
    },
    /// The block attached below a tip; a new fork chain was materialized.
    Forked {
        /// Whether the new fork is the active chain afterwards.
        on_active: bool,
    },
}

impl AddOutcome {
    /// Whether the block ended up on the active chain.
    pub fn on_active(&self) -> bool {
        matches!(
            self,
            AddOutcome::Extended { on_active: true } | AddOutcome::Forked { on_active: true }
        )
    }
}

/// The set of tracked chains, the active pointer, and the mempool.
///
/// Invariants:
/// - `active` indexes the longest chain (first-seen on ties; the pointer
///   never moves to a chain of equal length)
/// - every tracked chain is within [`FORK_CHAIN_HEIGHT`] of the active tip
/// - `ref_counts[h]` is the number of tracked chains containing block `h`;
///   the store holds exactly the blocks with a positive count
pub struct BlockChain {
    chains: Vec<Chain>,
    active: usize,
    mempool: Mempool,
    ref_counts: HashMap<Hash, usize>,
    store: Arc<dyn BlockStore>,
}

impl BlockChain {
    /// A fresh fork set holding one empty chain awaiting genesis.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            chains: vec![Chain::new(Arc::clone(&store))],
            active: 0,
            mempool: Mempool::new(),
            ref_counts: HashMap::new(),
            store,
        }
    }

    /// The current longest chain.
    pub fn active_chain(&self) -> &Chain {
        &self.chains[self.active]
    }

    /// All tracked chains, in first-seen order.
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// The transaction pool.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// The shared block store.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Whether any tracked chain references this block.
    pub fn block_is_known(&self, hash: &Hash) -> bool {
        self.ref_counts.contains_key(hash)
    }

    /// Number of tracked chains referencing this block.
    pub fn ref_count(&self, hash: &Hash) -> usize {
        self.ref_counts.get(hash).copied().unwrap_or(0)
    }

    /// Ingest a block from any source (peer, miner, replay).
    ///
    /// Policy, in order: silently accept duplicates; extend the tracked
    /// chain whose tip the block names as parent; otherwise materialize a
    /// fork below the parent header (longest chains scanned first);
    /// otherwise reject with the parent hash.
    pub fn add_block(&mut self, block: &Block, now: i64) -> Result<AddOutcome, ChainError> {
        let hash = block.header.hash().map_err(BlockError::from)?;

        if self.ref_counts.contains_key(&hash) {
            return Ok(AddOutcome::AlreadyKnown);
        }

        // Tip extension.
        for idx in 0..self.chains.len() {
            let extends = match self.chains[idx].tip_hash() {
                Some(tip) => block.header.prev_block_hash.as_ref() == Some(tip),
                None => block.header.prev_block_hash.is_none(),
            };
            if !extends {
                continue;
            }
            if let Err(e) = self.chains[idx].add_block(block, now) {
                if matches!(e, ChainError::Inconsistent(_)) {
                    // The chain disagrees with the block store: abandon
                    // it, the node keeps running on the other chains.
                    error!(error = %e, "tracked chain inconsistent, abandoning it");
                    self.evict_chain(idx);
                }
                return Err(e);
            }
            *self.ref_counts.entry(hash.clone()).or_insert(0) += 1;
            self.update_active_chain(now);

            let on_active = self.active_chain().tip_hash() == Some(&hash);
            if on_active {
                self.mempool.remove_block_transactions(block);
            }
            return Ok(AddOutcome::Extended { on_active });
        }

        // Soft fork: attach below a tip by replaying the shared prefix.
        let Some(parent_hash) = block.header.prev_block_hash.clone() else {
            return Err(ChainError::UnknownParent("genesis duplicate".to_string()));
        };

        let mut order: Vec<usize> = (0..self.chains.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.chains[i].length()));

        for idx in order {
            let Some(pos) = self.chains[idx].height_of(&parent_hash) else {
                continue;
            };
            let prefix = &self.chains[idx].headers()[..=pos as usize];
            let mut candidate =
                match Chain::build_from_header_list(prefix, Arc::clone(&self.store), now) {
                    Ok(chain) => chain,
                    Err(e) => {
                        // The store and this chain disagree; abandon the
                        // candidate, the node keeps running.
                        error!(error = %e, "fork replay failed, abandoning candidate chain");
                        continue;
                    }
                };
            match candidate.add_block(block, now) {
                Ok(()) => {}
                Err(e @ ChainError::Inconsistent(_)) => {
                    error!(error = %e, "candidate fork chain inconsistent, abandoning it");
                    continue;
                }
                Err(e) => return Err(e),
            }

            for h in candidate.hashes() {
                *self.ref_counts.entry(h.clone()).or_insert(0) += 1;
            }
            self.chains.push(candidate);
            self.update_active_chain(now);

            let on_active = self.active_chain().tip_hash() == Some(&hash);
            if on_active {
                self.mempool.remove_block_transactions(block);
            }
            info!(height = block.header.height, %hash, on_active, "tracked new fork chain");
            return Ok(AddOutcome::Forked { on_active });
        }

        Err(ChainError::UnknownParent(parent_hash.to_string()))
    }

    /// Admit a transaction to the mempool.
    ///
    /// A transaction is admitted iff it is not already pooled and is valid
    /// against the active chain's UTXO set.
    pub fn receive_transaction(&mut self, tx: Transaction, now: i64) -> Result<Hash, MempoolError> {
        let txid = tx.txid()?;
        if self.mempool.contains(&txid) {
            return Err(MempoolError::AlreadyKnown(txid.to_string()));
        }
        self.chains[self.active].is_transaction_valid(&tx, now)?;
        self.mempool.insert(tx)
    }

    /// Recompute the active pointer and prune stale forks.
    ///
    /// The pointer moves only to a strictly longer chain. On a switch, the
    /// abandoned branch's transactions are readmitted to the mempool when
    /// still valid. Chains at or beyond [`FORK_CHAIN_HEIGHT`] behind the
    /// new tip are dropped, their blocks unreferenced and — at count
    /// zero — evicted from the store.
    fn update_active_chain(&mut self, now: i64) {
        let mut best = self.active;
        for (i, chain) in self.chains.iter().enumerate() {
            if chain.length() > self.chains[best].length() {
                best = i;
            }
        }

        if best != self.active {
            let old_hashes: Vec<Hash> = self.chains[self.active].hashes().to_vec();
            self.active = best;
            info!(
                length = self.chains[self.active].length(),
                "active chain reorganized"
            );
            self.rebuild_mempool_after_reorg(&old_hashes, now);
        }

        // Prune chains that fell out of the fork window.
        let active_len = self.chains[self.active].length();
        let active_tip = self.chains[self.active].tip_hash().cloned();

        let mut kept = Vec::with_capacity(self.chains.len());
        let mut pruned = Vec::new();
        for chain in std::mem::take(&mut self.chains) {
            if chain.length().saturating_add(FORK_CHAIN_HEIGHT) <= active_len {
                pruned.push(chain);
            } else {
                kept.push(chain);
            }
        }
        self.chains = kept;
        self.active = self
            .chains
            .iter()
            .position(|c| c.tip_hash() == active_tip.as_ref())
            .unwrap_or(0);

        for chain in pruned {
            warn!(length = chain.length(), "pruning stale fork chain");
            self.release_chain_blocks(&chain);
        }
    }

    /// Drop a tracked chain outright and release its block references.
    ///
    /// The fatal-inconsistency path: the chain disagrees with the block
    /// store, so it is abandoned while the rest of the fork set keeps
    /// running. The active pointer moves to the longest surviving chain
    /// (first-seen on ties); an emptied fork set gets a fresh chain
    /// awaiting genesis.
    fn evict_chain(&mut self, idx: usize) {
        let chain = self.chains.remove(idx);
        self.release_chain_blocks(&chain);

        if self.chains.is_empty() {
            self.chains.push(Chain::new(Arc::clone(&self.store)));
            self.active = 0;
            return;
        }
        let mut best = 0;
        for (i, chain) in self.chains.iter().enumerate() {
            if chain.length() > self.chains[best].length() {
                best = i;
            }
        }
        self.active = best;
    }

    /// Decrement every block reference held by a dropped chain, evicting
    /// blocks whose count reaches zero from the store.
    fn release_chain_blocks(&mut self, chain: &Chain) {
        for hash in chain.hashes() {
            let remaining = match self.ref_counts.get_mut(hash) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => continue,
            };
            if remaining == 0 {
                self.ref_counts.remove(hash);
                if let Err(e) = self.store.remove(hash) {
                    warn!(%hash, error = %e, "failed to evict unreferenced block");
                }
            }
        }
    }

    /// Return abandoned-branch transactions to the mempool after a reorg.
    ///
    /// Transactions confirmed on the old branch but absent from the new
    /// one are readmitted when they still validate against the new active
    /// chain.
    fn rebuild_mempool_after_reorg(&mut self, old_hashes: &[Hash], now: i64) {
        let new_hashes = self.chains[self.active].hashes();

        let mut prefix = 0;
        while prefix < old_hashes.len()
            && prefix < new_hashes.len()
            && old_hashes[prefix] == new_hashes[prefix]
        {
            prefix += 1;
        }

        let mut on_new_branch: HashSet<Hash> = HashSet::new();
        for hash in &new_hashes[prefix..] {
            if let Ok(Some(block)) = self.store.get(hash) {
                for tx in &block.transactions {
                    if let Ok(txid) = tx.txid() {
                        on_new_branch.insert(txid);
                    }
                }
            }
        }

        let mut candidates: Vec<Transaction> = Vec::new();
        for hash in &old_hashes[prefix..] {
            let Ok(Some(block)) = self.store.get(hash) else {
                continue;
            };
            for tx in block.transactions {
                if tx.is_coinbase {
                    continue;
                }
                match tx.txid() {
                    Ok(txid) if !on_new_branch.contains(&txid) => candidates.push(tx),
                    _ => {}
                }
            }
        }

        for tx in candidates {
            if self.chains[self.active].is_transaction_valid(&tx, now).is_ok() {
                let _ = self.mempool.insert(tx);
            }
        }
    }
}
