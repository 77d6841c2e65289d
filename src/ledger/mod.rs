// Ledger module - THE SHARED BALANCES
// Account balances (which double as lottery stake) and the pending pool

mod pool;
mod state;

pub use pool::PendingPool;
pub use state::{Ledger, LedgerError, LedgerPolicy, DEFAULT_TRANSACTION_FEE};
