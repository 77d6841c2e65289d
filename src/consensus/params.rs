// Consensus Parameters - network-wide constants fixed at genesis

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SEED: u64 = 3;
pub const DEFAULT_SLOT_LENGTH_SECS: u64 = 3;
/// One day
pub const MAX_SLOT_LENGTH_SECS: u64 = 86_400;
/// Scaled against SHA-256 draw values: a stake of 1000 wins about 15% of slots
pub const DEFAULT_HARDNESS: &str =
    "98101277522421650198781678972208785932907589725093492146067428082680095847419000";

pub const DEFAULT_INITIAL_STAKE: u64 = 1000;
pub const DEFAULT_BLOCK_BONUS: u64 = 10;
pub const DEFAULT_INVALID_BLOCK_PENALTY: u64 = 10;

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Slot length must be at least one second")]
    ZeroSlotLength,

    #[error("Slot length must be at most {max} seconds")]
    SlotLengthTooLarge { max: u64 },

    #[error("Invalid hardness: {0}")]
    InvalidHardness(String),

    #[error("Failed to read genesis file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse genesis file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters shared by every node of a network
///
/// Never mutated at runtime; two nodes with different parameters will reject
/// each other's blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub seed: u64,
    #[serde(with = "decimal")]
    pub hardness: BigUint,
    pub slot_length_secs: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            hardness: parse_hardness(DEFAULT_HARDNESS).unwrap_or_default(),
            slot_length_secs: DEFAULT_SLOT_LENGTH_SECS,
        }
    }
}

impl ConsensusParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hardness(mut self, hardness: BigUint) -> Self {
        self.hardness = hardness;
        self
    }

    pub fn with_slot_length_secs(mut self, secs: u64) -> Self {
        self.slot_length_secs = secs;
        self
    }

    /// Validate the parameters
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.slot_length_secs == 0 {
            return Err(ParamsError::ZeroSlotLength);
        }
        if self.slot_length_secs > MAX_SLOT_LENGTH_SECS {
            return Err(ParamsError::SlotLengthTooLarge {
                max: MAX_SLOT_LENGTH_SECS,
            });
        }
        Ok(())
    }

    /// Load a genesis JSON file (`{"seed":..,"hardness":"..","slot_length_secs":..}`)
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let raw = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Slot number containing the given unix time in milliseconds
    pub fn slot_at(&self, unix_millis: i64) -> u64 {
        let secs = unix_millis.max(0) as u64 / 1000;
        secs / self.slot_length_secs.max(1)
    }

    /// Slot number for the current wall-clock time
    pub fn current_slot(&self) -> u64 {
        self.slot_at(chrono::Utc::now().timestamp_millis())
    }

    /// Time left until the slot after the one containing `unix_millis` begins
    pub fn until_next_slot(&self, unix_millis: i64) -> Duration {
        let slot_millis = self.slot_length_secs.clamp(1, MAX_SLOT_LENGTH_SECS) * 1000;
        let now = unix_millis.max(0) as u64;
        Duration::from_millis(slot_millis - now % slot_millis)
    }
}

/// Parse a decimal hardness threshold
pub fn parse_hardness(s: &str) -> Result<BigUint, ParamsError> {
    BigUint::parse_bytes(s.trim().as_bytes(), 10)
        .ok_or_else(|| ParamsError::InvalidHardness(s.to_string()))
}

/// Stake economics: genesis stake, block reward and invalid-block penalty
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePolicy {
    /// Balance credited to each account the first time a node learns of it
    pub initial_stake: u64,
    /// Minted for the creator on top of one unit per transaction in the block
    pub block_bonus: u64,
    /// Burned from the purported creator of a block that fails validation
    pub invalid_block_penalty: u64,
}

impl Default for StakePolicy {
    fn default() -> Self {
        Self {
            initial_stake: DEFAULT_INITIAL_STAKE,
            block_bonus: DEFAULT_BLOCK_BONUS,
            invalid_block_penalty: DEFAULT_INVALID_BLOCK_PENALTY,
        }
    }
}

impl StakePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_stake(mut self, stake: u64) -> Self {
        self.initial_stake = stake;
        self
    }

    pub fn with_block_bonus(mut self, bonus: u64) -> Self {
        self.block_bonus = bonus;
        self
    }

    pub fn with_invalid_block_penalty(mut self, penalty: u64) -> Self {
        self.invalid_block_penalty = penalty;
        self
    }

    /// Reward for a valid block carrying `transactions` transactions
    pub fn block_reward(&self, transactions: usize) -> u64 {
        (transactions as u64).saturating_add(self.block_bonus)
    }
}

mod decimal {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_hardness(&s).map_err(serde::de::Error::custom)
    }
}
