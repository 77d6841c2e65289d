use crate::tx::SignedTransaction;
use thiserror::Error;

/// Smallest transferable amount
pub const MIN_AMOUNT: u64 = 1;

/// Errors that can occur when validating a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid signature: signature does not verify under the sender key")]
    InvalidSignature,

    #[error("Invalid amount: transactions must move at least {MIN_AMOUNT} unit(s), got {0}")]
    InvalidAmount(u64),

    #[error("Insufficient funds: sender holds {balance}, transaction moves {amount}")]
    InsufficientFunds { balance: i64, amount: u64 },
}

/// Admission checks applied to every transaction a node receives
pub struct TransactionValidator;

impl TransactionValidator {
    /// Validate the signature and the minimum amount
    ///
    /// Signature is checked first so that a forged transaction is always
    /// reported as a signature failure.
    pub fn validate(tx: &SignedTransaction) -> Result<(), ValidationError> {
        if !tx.verify() {
            return Err(ValidationError::InvalidSignature);
        }

        let amount = tx.transaction().amount();
        if amount < MIN_AMOUNT {
            return Err(ValidationError::InvalidAmount(amount));
        }

        Ok(())
    }

    /// Full admission check against the sender's current balance
    pub fn validate_with_balance(
        tx: &SignedTransaction,
        sender_balance: i64,
    ) -> Result<(), ValidationError> {
        Self::validate(tx)?;

        let amount = tx.transaction().amount();
        if !covers(sender_balance, amount) {
            return Err(ValidationError::InsufficientFunds {
                balance: sender_balance,
                amount,
            });
        }

        Ok(())
    }
}

/// Whether `balance` can pay `amount` without going negative
pub(crate) fn covers(balance: i64, amount: u64) -> bool {
    balance >= 0 && (balance as u64) >= amount
}
