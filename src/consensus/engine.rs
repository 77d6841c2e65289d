// Consensus Engine - slot lottery, block proposal and block application
//
// Owns the canonical ledger and pending pool. Every entry point takes the
// ledger lock before the pool lock or the claimed-slot record.

use crate::consensus::{
    Block, BlockError, BlockValidator, ConsensusParams, Lottery, SignedBlock, StakePolicy,
};
use crate::identity::{Keypair, PublicKey};
use crate::ledger::{Ledger, LedgerPolicy, PendingPool};
use crate::tx::{SignedTransaction, TransactionId, TransactionValidator, ValidationError};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the engine sits in the current slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusRole {
    Follower,
    /// Only held while building the block for a won slot
    Proposer { slot: u64 },
}

/// Result of admitting a gossiped transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Accepted,
    AlreadyPending,
    AlreadyExecuted,
    Rejected(ValidationError),
}

impl TransactionOutcome {
    /// Only freshly accepted transactions are re-broadcast
    pub fn should_forward(&self) -> bool {
        matches!(self, TransactionOutcome::Accepted)
    }
}

/// What a valid block did to the ledger
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub applied: Vec<TransactionId>,
    /// Already executed or overdrawn at application time
    pub skipped: Vec<TransactionId>,
    pub reward: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    Accepted(BlockReport),
    Rejected { error: BlockError, penalty: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotteryOutcome {
    Lost { slot: u64, stake: i64 },
    AlreadyProposed { slot: u64 },
    Won(SignedBlock),
}

pub struct ConsensusEngine {
    keypair: Keypair,
    params: ConsensusParams,
    stake_policy: StakePolicy,
    ledger: Mutex<Ledger>,
    pool: Mutex<PendingPool>,
    role: Mutex<ConsensusRole>,
    last_proposed_slot: Mutex<Option<u64>>,
    /// (creator, slot) of every accepted block
    claimed_slots: Mutex<HashSet<(PublicKey, u64)>>,
}

impl ConsensusEngine {
    pub fn new(
        keypair: Keypair,
        params: ConsensusParams,
        stake_policy: StakePolicy,
        ledger_policy: LedgerPolicy,
    ) -> Self {
        Self {
            keypair,
            params,
            stake_policy,
            ledger: Mutex::new(Ledger::new(ledger_policy)),
            pool: Mutex::new(PendingPool::new()),
            role: Mutex::new(ConsensusRole::Follower),
            last_proposed_slot: Mutex::new(None),
            claimed_slots: Mutex::new(HashSet::new()),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    // ========================================================================
    // LEDGER ACCESS
    // ========================================================================

    /// Credit the genesis stake to a newly learned key
    pub async fn open_account(&self, public_key: PublicKey) -> bool {
        let mut ledger = self.ledger.lock().await;
        let opened = ledger.open_account(public_key.clone(), self.stake_policy.initial_stake);
        if opened {
            debug!(account = %public_key.short(), stake = self.stake_policy.initial_stake, "opened account");
        }
        opened
    }

    pub async fn balance(&self, public_key: &PublicKey) -> i64 {
        self.ledger.lock().await.balance(public_key)
    }

    pub async fn ledger_snapshot(&self) -> Vec<(PublicKey, i64)> {
        self.ledger.lock().await.accounts()
    }

    pub async fn total_supply(&self) -> i128 {
        self.ledger.lock().await.total_supply()
    }

    pub async fn burned(&self) -> u64 {
        self.ledger.lock().await.burned()
    }

    pub async fn is_executed(&self, id: &TransactionId) -> bool {
        self.ledger.lock().await.is_executed(id)
    }

    pub async fn pending_len(&self) -> usize {
        self.pool.lock().await.len()
    }

    pub async fn pending_contains(&self, id: &TransactionId) -> bool {
        self.pool.lock().await.contains(id)
    }

    pub async fn role(&self) -> ConsensusRole {
        *self.role.lock().await
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Admit a transaction into the pending pool
    ///
    /// The caller has already recorded the id in its seen-set.
    pub async fn handle_transaction(&self, tx: SignedTransaction) -> TransactionOutcome {
        let ledger = self.ledger.lock().await;

        if ledger.is_executed(tx.id()) {
            return TransactionOutcome::AlreadyExecuted;
        }

        let sender_balance = ledger.balance(tx.transaction().from());
        if let Err(e) = TransactionValidator::validate_with_balance(&tx, sender_balance) {
            warn!(tx_id = %tx.id(), error = %e, "rejected transaction");
            return TransactionOutcome::Rejected(e);
        }

        let mut pool = self.pool.lock().await;
        let id = tx.id().clone();
        if !pool.insert(tx) {
            return TransactionOutcome::AlreadyPending;
        }

        debug!(tx_id = %id, pending = pool.len(), "accepted transaction");
        TransactionOutcome::Accepted
    }

    // ========================================================================
    // BLOCKS
    // ========================================================================

    /// Validate and apply a block seen for the first time
    ///
    /// A valid block executes every transaction not executed before and mints
    /// the creator's reward. An invalid block burns the penalty from its
    /// purported creator and touches no transaction. A winner gets one block
    /// per slot; a second, differently signed block for the same slot counts
    /// as invalid.
    pub async fn handle_block(&self, signed: &SignedBlock) -> BlockOutcome {
        let block = signed.block();
        let creator = block.creator();

        let mut ledger = self.ledger.lock().await;
        let stake = ledger.balance(creator);

        let mut verdict = BlockValidator::validate(signed, &self.params, stake);
        if verdict.is_ok()
            && !self
                .claimed_slots
                .lock()
                .await
                .insert((creator.clone(), block.slot()))
        {
            verdict = Err(BlockError::DuplicateSlot { slot: block.slot() });
        }

        if let Err(error) = verdict {
            let penalty = self.stake_policy.invalid_block_penalty;
            ledger.debit(creator, penalty);
            warn!(
                slot = block.slot(),
                creator = %creator.short(),
                error = %error,
                penalty,
                "rejected block"
            );
            return BlockOutcome::Rejected { error, penalty };
        }

        let mut report = BlockReport::default();
        for tx in block.transactions() {
            if let Err(e) = TransactionValidator::validate(tx) {
                warn!(tx_id = %tx.id(), slot = block.slot(), error = %e, "skipped invalid transaction in block");
                report.skipped.push(tx.id().clone());
                continue;
            }
            match ledger.execute_once(tx) {
                Ok(true) => report.applied.push(tx.id().clone()),
                Ok(false) => report.skipped.push(tx.id().clone()),
                Err(e) => {
                    warn!(tx_id = %tx.id(), slot = block.slot(), error = %e, "skipped transaction in block");
                    report.skipped.push(tx.id().clone());
                }
            }
        }

        report.reward = self.stake_policy.block_reward(block.transactions().len());
        ledger.credit(creator, report.reward);

        let mut pool = self.pool.lock().await;
        for tx in block.transactions() {
            pool.remove(tx.id());
        }

        info!(
            slot = block.slot(),
            creator = %creator.short(),
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            reward = report.reward,
            "accepted block"
        );
        BlockOutcome::Accepted(report)
    }

    // ========================================================================
    // LOTTERY
    // ========================================================================

    /// Draw for `slot` and, on a win, build a block from the whole pending pool
    ///
    /// A slot is proposed at most once; the returned block still has to be
    /// delivered through the normal block path to take effect locally.
    pub async fn run_lottery(&self, slot: u64) -> LotteryOutcome {
        let mut last = self.last_proposed_slot.lock().await;
        if last.map_or(false, |s| s >= slot) {
            return LotteryOutcome::AlreadyProposed { slot };
        }

        let own_key = self.keypair.public_key();
        let stake = self.balance(&own_key).await;
        let draw = Lottery::draw(&self.keypair, self.params.seed, slot);

        if !Lottery::is_winner(&draw, stake, &self.params.hardness) {
            debug!(slot, stake, "lost lottery");
            return LotteryOutcome::Lost { slot, stake };
        }

        *self.role.lock().await = ConsensusRole::Proposer { slot };
        *last = Some(slot);

        let transactions = self.pool.lock().await.take_all();
        let block = Block::new(slot, own_key, draw, transactions);
        let signed = SignedBlock::sign(block, &self.keypair);

        *self.role.lock().await = ConsensusRole::Follower;

        info!(
            slot,
            stake,
            transactions = signed.block().transactions().len(),
            "won lottery"
        );
        LotteryOutcome::Won(signed)
    }
}
