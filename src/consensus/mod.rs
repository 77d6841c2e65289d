// Consensus module - THE LOTTERY
// Slot-based, stake-weighted leader election and block validation

mod block;
mod engine;
mod lottery;
mod params;

pub use block::{Block, BlockError, BlockValidator, SignedBlock};
pub use engine::{
    BlockOutcome, BlockReport, ConsensusEngine, ConsensusRole, LotteryOutcome, TransactionOutcome,
};
pub use lottery::{Lottery, LOTTERY_TAG};
pub use params::{
    parse_hardness, ConsensusParams, ParamsError, StakePolicy, DEFAULT_BLOCK_BONUS,
    DEFAULT_HARDNESS, DEFAULT_INITIAL_STAKE, DEFAULT_INVALID_BLOCK_PENALTY, DEFAULT_SEED,
    DEFAULT_SLOT_LENGTH_SECS,
};
