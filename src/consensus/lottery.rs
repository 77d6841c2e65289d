// Lottery - per-slot draws and the stake-weighted win predicate

use crate::identity::{Keypair, PublicKey, Signature, Signer};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Domain tag mixed into every draw
pub const LOTTERY_TAG: &[u8] = b"lottery";

/// Draw construction and evaluation
pub struct Lottery;

impl Lottery {
    /// Bytes a node signs to draw for `slot`
    pub fn draw_message(seed: u64, slot: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(LOTTERY_TAG.len() + 16);
        bytes.extend_from_slice(LOTTERY_TAG);
        bytes.extend_from_slice(&seed.to_le_bytes());
        bytes.extend_from_slice(&slot.to_le_bytes());
        bytes
    }

    /// Sign `(lottery, seed, slot)`; identical inputs give identical draws
    pub fn draw(keypair: &Keypair, seed: u64, slot: u64) -> Signature {
        Signer::sign(keypair, &Self::draw_message(seed, slot))
    }

    pub fn verify_draw(creator: &PublicKey, seed: u64, slot: u64, draw: &Signature) -> bool {
        Signer::verify(creator, &Self::draw_message(seed, slot), draw)
    }

    /// SHA-256 of the draw, read as a big-endian integer
    pub fn draw_value(draw: &Signature) -> BigUint {
        BigUint::from_bytes_be(&Sha256::digest(draw.as_bytes()))
    }

    /// `draw_value * stake >= hardness`, never true without positive stake
    pub fn is_winner(draw: &Signature, stake: i64, hardness: &BigUint) -> bool {
        Self::is_winning_value(&Self::draw_value(draw), stake, hardness)
    }

    /// Win predicate on an already hashed draw
    pub fn is_winning_value(value: &BigUint, stake: i64, hardness: &BigUint) -> bool {
        if stake <= 0 {
            return false;
        }
        value * BigUint::from(stake as u64) >= *hardness
    }
}
