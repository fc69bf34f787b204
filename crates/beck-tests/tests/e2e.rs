//! End-to-end consensus scenarios: genesis bootstrap, coinbase spending
//! through the miner's assembly path, signature rejection, coinbase
//! maturity boundaries, and the median-time-past rule.

use std::sync::Arc;

use beck_core::blockchain::{AddOutcome, BlockChain};
use beck_core::constants::{COIN, COINBASE_MATURITY};
use beck_core::error::{BlockError, ChainError, MempoolError, TransactionError};
use beck_core::genesis;
use beck_core::store::MemoryBlockStore;
use beck_node_lib::miner::{CandidateParams, build_candidate};
use beck_tests::helpers::{
    GENESIS_TIME, alt_keypair, genesis_coinbase_output, grind, grow, mature_genesis, next_block,
    now, setup, signed_spend, test_keypair,
};

#[test]
fn genesis_only() {
    let mut bc = BlockChain::new(Arc::new(MemoryBlockStore::new()));
    let outcome = bc.add_block(&genesis::genesis_block(), now()).unwrap();

    assert_eq!(outcome, AddOutcome::Extended { on_active: true });
    assert_eq!(bc.active_chain().length(), 1);

    // The UTXO holds exactly the genesis coinbase outputs.
    let coinbase_txid = genesis::genesis_block().transactions[0].txid().unwrap();
    assert_eq!(bc.active_chain().utxo().len(), 2);
    for vout in 0..2 {
        let so = beck_core::types::SingleOutput { txid: coinbase_txid.clone(), vout };
        assert!(bc.active_chain().utxo().get(&so).is_some());
    }
}

#[test]
fn genesis_resubmission_is_idempotent() {
    let mut bc = BlockChain::new(Arc::new(MemoryBlockStore::new()));
    bc.add_block(&genesis::genesis_block(), now()).unwrap();
    assert_eq!(
        bc.add_block(&genesis::genesis_block(), now()).unwrap(),
        AddOutcome::AlreadyKnown
    );
    assert_eq!(bc.active_chain().length(), 1);
}

#[test]
fn spend_coinbase_through_miner_assembly() {
    let (mut bc, mut mirror, kp, store) = setup();
    mature_genesis(&mut bc, &mut mirror, &kp);

    // Spend the 50-coin genesis coinbase: one 10-coin output, 40 in fees.
    let origin = genesis_coinbase_output(&store, &mirror);
    let recipient = alt_keypair().public_key_hex();
    let tx = signed_spend(&kp, origin, 50 * COIN, 10 * COIN, &recipient, now());
    let txid = bc.receive_transaction(tx, now()).unwrap();
    assert!(bc.mempool().contains(&txid));

    // The miner assembles from the mempool snapshot.
    let params = {
        let active = bc.active_chain();
        CandidateParams {
            prev_block_hash: active.tip_hash().unwrap().clone(),
            height: active.length(),
            target_difficulty: active.target_difficulty(),
            reward: active.current_block_reward(),
            payout_address: kp.public_key_hex(),
            timestamp: now(),
        }
    };
    let mut candidate = build_candidate(&params, bc.mempool().snapshot()).unwrap();
    grind(&mut candidate.header, params.target_difficulty);

    // Coinbase carries the reward and the collected fees.
    assert_eq!(candidate.transactions[0].vout[&0].amount, 50 * COIN);
    assert_eq!(candidate.transactions[0].vout[&1].amount, 40 * COIN);

    let outcome = bc.add_block(&candidate, now()).unwrap();
    assert!(outcome.on_active());
    assert!(bc.mempool().is_empty());

    // The spent output is gone; the new output exists.
    let active = bc.active_chain();
    assert!(active.utxo().get(&genesis_coinbase_output(&store, &mirror)).is_none());
    assert!(
        active
            .utxo()
            .iter()
            .any(|(_, e)| e.output.amount == 10 * COIN && e.output.address == recipient)
    );
}

#[test]
fn zeroed_signature_is_rejected_without_state_change() {
    let (mut bc, mut mirror, kp, store) = setup();
    mature_genesis(&mut bc, &mut mirror, &kp);

    let utxo_before = bc.active_chain().utxo().len();
    let origin = genesis_coinbase_output(&store, &mirror);
    let mut tx = signed_spend(
        &kp,
        origin,
        50 * COIN,
        10 * COIN,
        &alt_keypair().public_key_hex(),
        now(),
    );
    tx.vin.get_mut(&0).unwrap().sig = "00".repeat(64);

    assert!(matches!(
        bc.receive_transaction(tx, now()),
        Err(MempoolError::Invalid(TransactionError::InvalidSignature { index: 0 }))
    ));
    assert!(bc.mempool().is_empty());
    assert_eq!(bc.active_chain().utxo().len(), utxo_before);
}

#[test]
fn coinbase_maturity_boundary() {
    let (mut bc, mut mirror, kp, store) = setup();
    let origin = genesis_coinbase_output(&store, &mirror);
    let spend = |ts| {
        signed_spend(&kp, origin.clone(), 50 * COIN, 10 * COIN, &kp.public_key_hex(), ts)
    };

    // One block short of maturity: rejected.
    for i in 1..COINBASE_MATURITY as i64 - 1 {
        grow(&mut bc, &mut mirror, &kp, vec![], GENESIS_TIME + i);
    }
    assert_eq!(bc.active_chain().length(), COINBASE_MATURITY - 1);
    assert!(matches!(
        bc.receive_transaction(spend(now()), now()),
        Err(MempoolError::Invalid(TransactionError::ImmatureCoinbase { .. }))
    ));

    // At exactly `COINBASE_MATURITY` confirmations: accepted.
    grow(
        &mut bc,
        &mut mirror,
        &kp,
        vec![],
        GENESIS_TIME + COINBASE_MATURITY as i64 - 1,
    );
    assert_eq!(bc.active_chain().length(), COINBASE_MATURITY);
    assert!(bc.receive_transaction(spend(now() + 1), now() + 1).is_ok());
}

#[test]
fn median_time_past_bounds_new_blocks() {
    let (mut bc, mut mirror, kp, _) = setup();
    for i in 1..11 {
        grow(&mut bc, &mut mirror, &kp, vec![], GENESIS_TIME + i);
    }
    // Timestamps GENESIS..GENESIS+10: the median is GENESIS+5.
    let median = bc.active_chain().median_time_past().unwrap();
    assert_eq!(median, GENESIS_TIME + 5);

    let at_median = next_block(&mirror, vec![], &kp.public_key_hex(), median);
    assert!(matches!(
        bc.add_block(&at_median, now()),
        Err(ChainError::Rejected(BlockError::TimestampNotPastMedian { .. }))
    ));

    let one_second_later = next_block(&mirror, vec![], &kp.public_key_hex(), median + 1);
    assert!(bc.add_block(&one_second_later, now()).unwrap().on_active());
}

#[test]
fn issuance_tracks_reward_schedule() {
    let (mut bc, mut mirror, kp, _) = setup();
    for i in 1..5 {
        grow(&mut bc, &mut mirror, &kp, vec![], GENESIS_TIME + i);
    }
    // Five blocks, each minting the epoch-zero reward.
    assert_eq!(bc.active_chain().total_issued(), 5 * 50 * COIN);
}

#[test]
fn deterministic_keypairs_differ() {
    assert_ne!(
        test_keypair().public_key_hex(),
        alt_keypair().public_key_hex()
    );
}
