use crate::identity::{Keypair, PublicKey, Signer};
use crate::tx::{SignedTransaction, Transaction, TransactionId};
use rand::Rng;
use thiserror::Error;

/// Errors that can occur when building a transaction
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Missing sender: sender keypair is required")]
    MissingSender,

    #[error("Missing recipient: recipient public key is required")]
    MissingRecipient,

    #[error("Missing amount: transfer amount is required")]
    MissingAmount,
}

/// Builder for creating signed transactions
///
/// The builder does not apply admission rules (minimum amount, funds); those
/// belong to [`TransactionValidator`](crate::tx::TransactionValidator) on the
/// receiving side.
pub struct TransactionBuilder<'a> {
    sender: Option<&'a Keypair>,
    recipient: Option<PublicKey>,
    amount: Option<u64>,
    id: Option<TransactionId>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new() -> Self {
        Self {
            sender: None,
            recipient: None,
            amount: None,
            id: None,
        }
    }

    /// Set the sender (required)
    pub fn sender(mut self, keypair: &'a Keypair) -> Self {
        self.sender = Some(keypair);
        self
    }

    /// Set the recipient (required)
    pub fn recipient(mut self, public_key: PublicKey) -> Self {
        self.recipient = Some(public_key);
        self
    }

    /// Set the amount (required)
    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the id (optional - a random 128-bit hex id otherwise)
    pub fn id(mut self, id: impl Into<TransactionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Build and sign the transaction
    pub fn build(self) -> Result<SignedTransaction, TransactionError> {
        let sender = self.sender.ok_or(TransactionError::MissingSender)?;
        let recipient = self.recipient.ok_or(TransactionError::MissingRecipient)?;
        let amount = self.amount.ok_or(TransactionError::MissingAmount)?;

        let id = self.id.unwrap_or_else(|| {
            let raw: [u8; 16] = rand::thread_rng().gen();
            TransactionId::new(hex::encode(raw))
        });

        let transaction = Transaction::new(id, sender.public_key(), recipient, amount);
        let signature = Signer::sign(sender, &transaction.to_signing_bytes());

        Ok(SignedTransaction::from_parts(transaction, signature))
    }
}

impl<'a> Default for TransactionBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}
