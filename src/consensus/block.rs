// Blocks - a slot winner's batch of transactions, signed by its creator

use crate::consensus::{ConsensusParams, Lottery};
use crate::identity::{Keypair, PublicKey, Signature, Signer};
use crate::tx::SignedTransaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reasons a received block is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Block hash does not match its contents")]
    InvalidHash,

    #[error("Block signature does not verify under the creator key")]
    InvalidSignature,

    #[error("Draw does not verify for slot {slot} under the creator key")]
    InvalidDraw { slot: u64 },

    #[error("Draw does not win slot {slot} with stake {stake}")]
    NotWinner { slot: u64, stake: i64 },

    #[error("Creator already has a block for slot {slot}")]
    DuplicateSlot { slot: u64 },
}

/// A proposed batch of transactions for one slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    slot: u64,
    creator: PublicKey,
    draw: Signature,
    transactions: Vec<SignedTransaction>,
    hash: String,
}

impl Block {
    /// Assemble a block and compute its hash
    pub fn new(
        slot: u64,
        creator: PublicKey,
        draw: Signature,
        transactions: Vec<SignedTransaction>,
    ) -> Self {
        let mut block = Self {
            slot,
            creator,
            draw,
            transactions,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn creator(&self) -> &PublicKey {
        &self.creator
    }

    pub fn draw(&self) -> &Signature {
        &self.draw
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Canonical bytes of everything except the hash
    fn content_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"block:");
        bytes.extend_from_slice(&self.slot.to_le_bytes());
        bytes.extend_from_slice(self.creator.as_bytes());
        bytes.extend_from_slice(self.draw.as_bytes());

        bytes.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            let signing = tx.transaction().to_signing_bytes();
            bytes.extend_from_slice(&(signing.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&signing);
            bytes.extend_from_slice(tx.signature().as_bytes());
        }

        bytes
    }

    /// Hex SHA-256 of the content bytes
    pub fn compute_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content_bytes()))
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Bytes the creator signs: content followed by the hash
    pub fn to_signing_bytes(&self) -> Vec<u8> {
        let mut bytes = self.content_bytes();
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes
    }
}

/// A block with its creator's signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    block: Block,
    signature: Signature,
}

impl SignedBlock {
    /// Sign a block with the creator's keypair
    pub fn sign(block: Block, keypair: &Keypair) -> Self {
        let signature = Signer::sign(keypair, &block.to_signing_bytes());
        Self { block, signature }
    }

    pub fn from_parts(block: Block, signature: Signature) -> Self {
        Self { block, signature }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn verify_signature(&self) -> bool {
        Signer::verify(
            self.block.creator(),
            &self.block.to_signing_bytes(),
            &self.signature,
        )
    }
}

/// Consensus checks on a received block
pub struct BlockValidator;

impl BlockValidator {
    /// Validate a block given the creator's stake as read from the local ledger
    ///
    /// Checks run cheapest first: hash, block signature, draw signature,
    /// then the win predicate.
    pub fn validate(
        signed: &SignedBlock,
        params: &ConsensusParams,
        creator_stake: i64,
    ) -> Result<(), BlockError> {
        let block = signed.block();

        if !block.has_valid_hash() {
            return Err(BlockError::InvalidHash);
        }

        if !signed.verify_signature() {
            return Err(BlockError::InvalidSignature);
        }

        if !Lottery::verify_draw(block.creator(), params.seed, block.slot(), block.draw()) {
            return Err(BlockError::InvalidDraw { slot: block.slot() });
        }

        if !Lottery::is_winner(block.draw(), creator_stake, &params.hardness) {
            return Err(BlockError::NotWinner {
                slot: block.slot(),
                stake: creator_stake,
            });
        }

        Ok(())
    }
}
