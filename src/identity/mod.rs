// Identity module - Ed25519 keypairs, signatures and the local node identity

mod keypair;
mod local;
mod signer;

pub use keypair::*;
pub use local::*;
pub use signer::*;
