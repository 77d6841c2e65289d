use crate::identity::{PublicKey, Signature, Signer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-assigned transaction identifier
///
/// Uniqueness is a protocol obligation of the issuer, not something the
/// network coordinates. Two transactions sharing an id are treated as the
/// same transaction by every seen-set and by the executed set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An unsigned transfer of `amount` from one public key to another
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    from: PublicKey,
    to: PublicKey,
    amount: u64,
}

impl Transaction {
    pub fn new(id: TransactionId, from: PublicKey, to: PublicKey, amount: u64) -> Self {
        Self { id, from, to, amount }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn from(&self) -> &PublicKey {
        &self.from
    }

    pub fn to(&self) -> &PublicKey {
        &self.to
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Get the bytes that should be signed
    pub fn to_signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.id.0.len() + 32 + 32 + 8 + 3);
        bytes.extend_from_slice(b"tx:");

        bytes.extend_from_slice(&(self.id.0.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.id.0.as_bytes());

        bytes.extend_from_slice(self.from.as_bytes());
        bytes.extend_from_slice(self.to.as_bytes());

        bytes.extend_from_slice(&self.amount.to_le_bytes());

        bytes
    }
}

/// A transaction together with the sender's signature over it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    transaction: Transaction,
    signature: Signature,
}

impl SignedTransaction {
    pub fn from_parts(transaction: Transaction, signature: Signature) -> Self {
        Self { transaction, signature }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn id(&self) -> &TransactionId {
        self.transaction.id()
    }

    /// Verify the signature under `transaction.from`
    pub fn verify(&self) -> bool {
        let bytes = self.transaction.to_signing_bytes();
        Signer::verify(self.transaction.from(), &bytes, &self.signature)
    }
}
