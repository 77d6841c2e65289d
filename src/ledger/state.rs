// Ledger State - account balances keyed by public key
//
// Balances are signed: rewards mint, penalties burn, and a penalty may push
// an account below zero. Transfers never may. A non-positive balance holds no
// lottery stake.

use crate::identity::PublicKey;
use crate::tx::{covers, SignedTransaction, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Fee burned from every applied transfer
pub const DEFAULT_TRANSACTION_FEE: u64 = 1;

/// Errors that can occur while mutating the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: balance {balance}, amount {amount}")]
    InsufficientFunds { balance: i64, amount: u64 },

    #[error("Amount {0} does not fit a ledger balance")]
    AmountTooLarge(u64),
}

/// Fee policy applied by [`Ledger::apply_transaction`]
///
/// The receiver is credited `amount - transaction_fee` (never below zero) and
/// the difference is burned. Overdrafts are always rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub transaction_fee: u64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            transaction_fee: DEFAULT_TRANSACTION_FEE,
        }
    }
}

impl LedgerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction_fee(mut self, fee: u64) -> Self {
        self.transaction_fee = fee;
        self
    }

    /// No fee: transfers conserve the total supply exactly
    pub fn fee_free() -> Self {
        Self { transaction_fee: 0 }
    }
}

/// Mapping of public key to balance
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    accounts: HashMap<PublicKey, i64>,
    /// Ids of transactions already applied, whichever block carried them
    executed: HashSet<TransactionId>,
    policy: LedgerPolicy,
    burned: u64,
}

impl Ledger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self {
            accounts: HashMap::new(),
            executed: HashSet::new(),
            policy,
            burned: 0,
        }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Current balance, `0` if the key has no account
    pub fn balance(&self, public_key: &PublicKey) -> i64 {
        self.accounts.get(public_key).copied().unwrap_or(0)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Open an account with its genesis stake
    ///
    /// Only the first call for a key has an effect, so learning the same
    /// peer from several sources never mints twice.
    pub fn open_account(&mut self, public_key: PublicKey, initial: u64) -> bool {
        if self.accounts.contains_key(&public_key) {
            return false;
        }
        let initial = i64::try_from(initial).unwrap_or(i64::MAX);
        self.accounts.insert(public_key, initial);
        true
    }

    /// Mint `amount` into an account (block rewards)
    pub fn credit(&mut self, public_key: &PublicKey, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        let balance = self.accounts.entry(public_key.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Burn `amount` from an account (penalties); may go negative
    pub fn debit(&mut self, public_key: &PublicKey, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        let balance = self.accounts.entry(public_key.clone()).or_insert(0);
        *balance = balance.saturating_sub(amount);
    }

    /// Apply a pre-validated transfer
    ///
    /// Debits the sender by `amount`, credits the receiver by
    /// `amount - fee` and burns the fee. An overdraft leaves every balance
    /// untouched.
    pub fn apply_transaction(&mut self, tx: &SignedTransaction) -> Result<(), LedgerError> {
        let transaction = tx.transaction();
        let amount = transaction.amount();
        let signed_amount =
            i64::try_from(amount).map_err(|_| LedgerError::AmountTooLarge(amount))?;

        let sender_balance = self.balance(transaction.from());
        if !covers(sender_balance, amount) {
            return Err(LedgerError::InsufficientFunds {
                balance: sender_balance,
                amount,
            });
        }

        let credited = amount.saturating_sub(self.policy.transaction_fee);
        let fee = amount - credited;

        *self.accounts.entry(transaction.from().clone()).or_insert(0) -= signed_amount;
        // credited <= amount, so the cast is lossless
        let receiver = self.accounts.entry(transaction.to().clone()).or_insert(0);
        *receiver = receiver.saturating_add(credited as i64);
        self.burned = self.burned.saturating_add(fee);

        debug!(
            tx_id = %transaction.id(),
            from = %transaction.from().short(),
            to = %transaction.to().short(),
            amount,
            fee,
            "applied transaction"
        );
        Ok(())
    }

    /// Apply a transaction unless its id was already executed
    ///
    /// Returns `Ok(true)` when applied now, `Ok(false)` when it had already
    /// been executed. A rejected transfer is not recorded as executed.
    pub fn execute_once(&mut self, tx: &SignedTransaction) -> Result<bool, LedgerError> {
        if self.executed.contains(tx.id()) {
            return Ok(false);
        }
        self.apply_transaction(tx)?;
        self.executed.insert(tx.id().clone());
        Ok(true)
    }

    pub fn is_executed(&self, id: &TransactionId) -> bool {
        self.executed.contains(id)
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> i128 {
        self.accounts.values().map(|b| *b as i128).sum()
    }

    /// Total fees burned so far
    pub fn burned(&self) -> u64 {
        self.burned
    }

    /// Point-in-time copy of every account, ordered by key
    pub fn accounts(&self) -> Vec<(PublicKey, i64)> {
        let mut accounts: Vec<(PublicKey, i64)> = self
            .accounts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        accounts.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        accounts
    }
}
