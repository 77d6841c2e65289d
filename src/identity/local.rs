use crate::identity::{Keypair, PublicKey, Signature, Signer};
use std::net::SocketAddr;

/// The identity a node runs under: its keypair and the address it listens on.
///
/// Created once at startup, after the listener is bound, and never mutated.
#[derive(Clone, Debug)]
pub struct LocalIdentity {
    keypair: Keypair,
    address: String,
}

impl LocalIdentity {
    pub fn new(keypair: Keypair, address: SocketAddr) -> Self {
        Self {
            keypair,
            address: address.to_string(),
        }
    }

    /// Identity with a fresh random keypair
    pub fn generate(address: SocketAddr) -> Self {
        Self::new(Keypair::generate(), address)
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Listening address in `host:port` form, as stored in peer directories
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signer::sign(&self.keypair, message)
    }
}
