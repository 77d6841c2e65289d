// Peer Directory - address to public key membership
//
// Adopted wholesale from the first snapshot a node receives, then grown one
// entry at a time by NewPeer announcements. Entries are never removed.

use crate::identity::PublicKey;
use crate::sync::Message;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Upper bound on connections opened when adopting a snapshot
pub const MAX_CON: usize = 10;

/// Peer-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),
}

/// Outcome of adopting a directory snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adoption {
    /// Addresses to connect to, never including our own
    pub dial_targets: Vec<String>,
    /// Keys learned from the snapshot that were not known before
    pub new_keys: Vec<PublicKey>,
    /// Our own NewPeer announcement, to broadcast once connected
    pub announcement: Message,
}

#[derive(Clone, Debug, Default)]
pub struct PeerDirectory {
    peers: BTreeMap<String, PublicKey>,
    adopted: bool,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot has already been adopted
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// Adopt the first snapshot received; later snapshots are ignored
    ///
    /// Dials every listed address when there are at most [`MAX_CON`] of them,
    /// otherwise the last `MAX_CON` in address order.
    pub fn adopt(
        &mut self,
        snapshot: BTreeMap<String, PublicKey>,
        self_address: &str,
        self_key: &PublicKey,
    ) -> Option<Adoption> {
        if self.adopted {
            return None;
        }
        self.adopted = true;

        let skip = snapshot.len().saturating_sub(MAX_CON);
        let dial_targets: Vec<String> = snapshot
            .keys()
            .skip(skip)
            .filter(|address| address.as_str() != self_address)
            .cloned()
            .collect();

        let mut new_keys = Vec::new();
        for (address, public_key) in snapshot {
            if address == self_address {
                continue;
            }
            if self.add_if_absent(address, public_key.clone()) {
                new_keys.push(public_key);
            }
        }

        self.add_if_absent(self_address.to_string(), self_key.clone());

        Some(Adoption {
            dial_targets,
            new_keys,
            announcement: Message::NewPeer {
                address: self_address.to_string(),
                public_key: self_key.clone(),
            },
        })
    }

    /// Insert an entry unless the address is already known
    pub fn add_if_absent(&mut self, address: String, public_key: PublicKey) -> bool {
        if self.peers.contains_key(&address) {
            return false;
        }
        self.peers.insert(address, public_key);
        true
    }

    /// Reverse lookup, used to name block creators in logs
    pub fn resolve_address(&self, public_key: &PublicKey) -> Option<String> {
        self.peers
            .iter()
            .find(|(_, pk)| *pk == public_key)
            .map(|(address, _)| address.clone())
    }

    pub fn public_key_of(&self, address: &str) -> Option<&PublicKey> {
        self.peers.get(address)
    }

    /// Like [`public_key_of`](Self::public_key_of) but with an error for unknown addresses
    pub fn lookup(&self, address: &str) -> Result<PublicKey, PeerError> {
        self.peers
            .get(address)
            .cloned()
            .ok_or_else(|| PeerError::UnknownPeer(address.to_string()))
    }

    /// Point-in-time copy, as sent to a newly accepted connection
    pub fn snapshot(&self) -> BTreeMap<String, PublicKey> {
        self.peers.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Parse a directory address into a socket address for dialing
pub fn parse_peer_address(address: &str) -> Result<SocketAddr, PeerError> {
    address
        .parse()
        .map_err(|_| PeerError::InvalidAddress(address.to_string()))
}
