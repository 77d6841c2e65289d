// Consensus Engine Tests
// Admission, block application, penalties and proposal

use num_bigint::BigUint;
use stakemesh::consensus::{
    Block, BlockError, BlockOutcome, ConsensusEngine, ConsensusParams, Lottery, LotteryOutcome,
    ParamsError, SignedBlock, StakePolicy, TransactionOutcome,
};
use stakemesh::identity::{Keypair, PublicKey};
use stakemesh::ledger::LedgerPolicy;
use stakemesh::tx::{SignedTransaction, TransactionBuilder, ValidationError};
use std::io::Write;

fn easy_params() -> ConsensusParams {
    ConsensusParams::new().with_hardness(BigUint::from(1u32))
}

fn engine() -> ConsensusEngine {
    ConsensusEngine::new(
        Keypair::generate(),
        easy_params(),
        StakePolicy::default(),
        LedgerPolicy::default(),
    )
}

fn transfer(from: &Keypair, to: &PublicKey, amount: u64) -> SignedTransaction {
    TransactionBuilder::new()
        .sender(from)
        .recipient(to.clone())
        .amount(amount)
        .build()
        .unwrap()
}

fn block(creator: &Keypair, slot: u64, transactions: Vec<SignedTransaction>) -> SignedBlock {
    let draw = Lottery::draw(creator, easy_params().seed, slot);
    SignedBlock::sign(
        Block::new(slot, creator.public_key(), draw, transactions),
        creator,
    )
}

// ============================================================================
// ADMISSION
// ============================================================================

/// Test: a funded transfer enters the pool once
#[tokio::test]
async fn test_admission_and_duplicate() {
    let engine = engine();
    let alice = Keypair::generate();
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &Keypair::generate().public_key(), 10);

    assert_eq!(
        engine.handle_transaction(tx.clone()).await,
        TransactionOutcome::Accepted
    );
    assert_eq!(
        engine.handle_transaction(tx.clone()).await,
        TransactionOutcome::AlreadyPending
    );
    assert_eq!(engine.pending_len().await, 1);
}

/// Test: zero-amount transfers never enter the pool
#[tokio::test]
async fn test_zero_amount_rejected() {
    let engine = engine();
    let alice = Keypair::generate();
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &Keypair::generate().public_key(), 0);

    assert_eq!(
        engine.handle_transaction(tx).await,
        TransactionOutcome::Rejected(ValidationError::InvalidAmount(0))
    );
    assert_eq!(engine.pending_len().await, 0);
}

/// Test: an executed id is not admitted again
#[tokio::test]
async fn test_executed_transaction_not_readmitted() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &Keypair::generate().public_key(), 10);

    engine.handle_block(&block(&creator, 1, vec![tx.clone()])).await;

    assert_eq!(
        engine.handle_transaction(tx).await,
        TransactionOutcome::AlreadyExecuted
    );
}

// ============================================================================
// BLOCK APPLICATION
// ============================================================================

/// Test: the creator earns one unit per transaction plus the bonus
#[tokio::test]
async fn test_block_reward() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    let bob = Keypair::generate().public_key();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;

    let txs = vec![
        transfer(&alice, &bob, 10),
        transfer(&alice, &bob, 20),
        transfer(&alice, &bob, 30),
    ];
    let outcome = engine.handle_block(&block(&creator, 1, txs)).await;

    match outcome {
        BlockOutcome::Accepted(report) => {
            assert_eq!(report.applied.len(), 3);
            assert_eq!(report.reward, 13);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(engine.balance(&creator.public_key()).await, 1013);
    assert_eq!(engine.balance(&alice.public_key()).await, 940);
    assert_eq!(engine.balance(&bob).await, 57);
}

/// Test: a transaction carried by two blocks executes once
#[tokio::test]
async fn test_transaction_executes_once_across_blocks() {
    let engine = engine();
    let first = Keypair::generate();
    let second = Keypair::generate();
    let alice = Keypair::generate();
    let bob = Keypair::generate().public_key();
    for key in [&first, &second, &alice] {
        engine.open_account(key.public_key()).await;
    }
    let tx = transfer(&alice, &bob, 100);

    engine.handle_block(&block(&first, 1, vec![tx.clone()])).await;
    let outcome = engine.handle_block(&block(&second, 2, vec![tx.clone()])).await;

    match outcome {
        BlockOutcome::Accepted(report) => {
            assert!(report.applied.is_empty());
            assert_eq!(report.skipped, vec![tx.id().clone()]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(engine.balance(&alice.public_key()).await, 900);
    assert_eq!(engine.balance(&bob).await, 99);
}

/// Test: an overdraft inside a valid block is skipped, the rest applies
#[tokio::test]
async fn test_overdraft_in_block_skipped() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    let bob = Keypair::generate().public_key();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;

    let spend = transfer(&alice, &bob, 800);
    let overdraft = transfer(&alice, &bob, 800);
    let outcome = engine
        .handle_block(&block(&creator, 1, vec![spend.clone(), overdraft.clone()]))
        .await;

    match outcome {
        BlockOutcome::Accepted(report) => {
            assert_eq!(report.applied, vec![spend.id().clone()]);
            assert_eq!(report.skipped, vec![overdraft.id().clone()]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(engine.balance(&alice.public_key()).await, 200);
    assert!(!engine.is_executed(overdraft.id()).await);
}

/// Test: a forged transaction inside a valid block is skipped
#[tokio::test]
async fn test_forged_transaction_in_block_skipped() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;

    let honest = transfer(&alice, &creator.public_key(), 5);
    let forged_body = transfer(&alice, &creator.public_key(), 500).transaction().clone();
    let forged = SignedTransaction::from_parts(forged_body, honest.signature().clone());

    engine.handle_block(&block(&creator, 1, vec![forged])).await;

    assert_eq!(engine.balance(&alice.public_key()).await, 1000);
}

/// Test: a draw for the wrong slot costs the penalty and applies nothing
#[tokio::test]
async fn test_invalid_draw_penalized() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &creator.public_key(), 50);

    let draw = Lottery::draw(&creator, easy_params().seed, 6);
    let forged = SignedBlock::sign(
        Block::new(7, creator.public_key(), draw, vec![tx.clone()]),
        &creator,
    );

    assert_eq!(
        engine.handle_block(&forged).await,
        BlockOutcome::Rejected {
            error: BlockError::InvalidDraw { slot: 7 },
            penalty: 10
        }
    );
    assert_eq!(engine.balance(&creator.public_key()).await, 990);
    assert_eq!(engine.balance(&alice.public_key()).await, 1000);
    assert!(!engine.is_executed(tx.id()).await);
}

/// Test: a block signed by someone other than its creator is rejected
#[tokio::test]
async fn test_block_signature_mismatch() {
    let engine = engine();
    let creator = Keypair::generate();
    engine.open_account(creator.public_key()).await;

    let draw = Lottery::draw(&creator, easy_params().seed, 2);
    let forged = SignedBlock::sign(
        Block::new(2, creator.public_key(), draw, vec![]),
        &Keypair::generate(),
    );

    assert!(matches!(
        engine.handle_block(&forged).await,
        BlockOutcome::Rejected {
            error: BlockError::InvalidSignature,
            ..
        }
    ));
}

/// Test: a creator cannot mint twice for one slot by re-signing other contents
#[tokio::test]
async fn test_second_block_for_slot_rejected() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    engine.open_account(creator.public_key()).await;
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &creator.public_key(), 30);

    assert!(matches!(
        engine.handle_block(&block(&creator, 5, vec![])).await,
        BlockOutcome::Accepted(_)
    ));
    assert_eq!(
        engine.handle_block(&block(&creator, 5, vec![tx.clone()])).await,
        BlockOutcome::Rejected {
            error: BlockError::DuplicateSlot { slot: 5 },
            penalty: 10
        }
    );
    assert_eq!(engine.balance(&creator.public_key()).await, 1000);
    assert!(!engine.is_executed(tx.id()).await);

    // Other creators and other slots are unaffected
    let other = Keypair::generate();
    engine.open_account(other.public_key()).await;
    assert!(matches!(
        engine.handle_block(&block(&other, 5, vec![])).await,
        BlockOutcome::Accepted(_)
    ));
    assert!(matches!(
        engine.handle_block(&block(&creator, 6, vec![])).await,
        BlockOutcome::Accepted(_)
    ));
}

/// Test: the supply moves only by rewards, penalties and burned fees
#[tokio::test]
async fn test_supply_accounting() {
    let engine = engine();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    let bob = Keypair::generate();
    for key in [&creator, &alice, &bob] {
        engine.open_account(key.public_key()).await;
    }
    let genesis = engine.total_supply().await;

    let txs = vec![
        transfer(&alice, &bob.public_key(), 100),
        transfer(&bob, &alice.public_key(), 40),
    ];
    engine.handle_block(&block(&creator, 1, txs)).await;
    let stranger = Keypair::generate();
    engine.handle_block(&block(&stranger, 2, vec![])).await;

    let minted = 12i128;
    let penalties = 10i128;
    assert_eq!(engine.burned().await, 2);
    assert_eq!(
        engine.total_supply().await,
        genesis + minted - penalties - engine.burned().await as i128
    );
}

// ============================================================================
// PROPOSAL
// ============================================================================

/// Test: a winning proposal takes the pool and applies through the block path
#[tokio::test]
async fn test_won_block_carries_pool() {
    let engine = engine();
    engine.open_account(engine.public_key()).await;
    let alice = Keypair::generate();
    engine.open_account(alice.public_key()).await;
    let tx = transfer(&alice, &engine.public_key(), 100);
    engine.handle_transaction(tx.clone()).await;

    let signed = match engine.run_lottery(4).await {
        LotteryOutcome::Won(signed) => signed,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(signed.block().transactions(), &[tx.clone()]);
    assert_eq!(engine.pending_len().await, 0);

    assert!(matches!(
        engine.handle_block(&signed).await,
        BlockOutcome::Accepted(_)
    ));
    assert_eq!(engine.balance(&engine.public_key()).await, 1000 + 99 + 11);
}

/// Test: a slot earlier than the last proposal is not proposed
#[tokio::test]
async fn test_no_proposal_for_past_slot() {
    let engine = engine();
    engine.open_account(engine.public_key()).await;
    engine.run_lottery(10).await;

    assert_eq!(
        engine.run_lottery(9).await,
        LotteryOutcome::AlreadyProposed { slot: 9 }
    );
    assert!(matches!(engine.run_lottery(11).await, LotteryOutcome::Won(_)));
}

// ============================================================================
// GENESIS
// ============================================================================

/// Test: parameters load from a genesis file
#[test]
fn test_genesis_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"seed": 7, "hardness": "123456789012345678901234567890", "slot_length_secs": 5}}"#
    )
    .unwrap();

    let params = ConsensusParams::from_json_file(file.path()).unwrap();

    assert_eq!(params.seed, 7);
    assert_eq!(params.slot_length_secs, 5);
    assert_eq!(
        params.hardness.to_str_radix(10),
        "123456789012345678901234567890"
    );
}

/// Test: a genesis file with a zero slot length is refused
#[test]
fn test_genesis_file_invalid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"seed": 7, "hardness": "1", "slot_length_secs": 0}}"#).unwrap();

    assert!(matches!(
        ConsensusParams::from_json_file(file.path()),
        Err(ParamsError::ZeroSlotLength)
    ));

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    write!(bad, r#"{{"seed": 7, "hardness": "abc", "slot_length_secs": 3}}"#).unwrap();
    assert!(matches!(
        ConsensusParams::from_json_file(bad.path()),
        Err(ParamsError::Parse(_))
    ));
}

/// Test: a slot length long enough to overflow millisecond math is refused
#[test]
fn test_genesis_slot_length_capped() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"seed": 7, "hardness": "1", "slot_length_secs": 2305843009213693952}}"#
    )
    .unwrap();

    assert!(matches!(
        ConsensusParams::from_json_file(file.path()),
        Err(ParamsError::SlotLengthTooLarge { .. })
    ));
}
