// Protocol - Message types exchanged between nodes
//
// Every frame on the wire is one JSON object tagged by "type":
// - PeersMap: directory snapshot sent by an acceptor to a new connection
// - NewPeer: announcement of a node that just joined
// - SignedTransaction: a transfer to admit into pending pools
// - SignedBlock: a slot winner's block

use crate::consensus::SignedBlock;
use crate::identity::PublicKey;
use crate::tx::SignedTransaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Discriminant of a [`Message`], for logging and stats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    PeersMap,
    NewPeer,
    SignedTransaction,
    SignedBlock,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::PeersMap => "PeersMap",
            MessageType::NewPeer => "NewPeer",
            MessageType::SignedTransaction => "SignedTransaction",
            MessageType::SignedBlock => "SignedBlock",
        };
        f.write_str(name)
    }
}

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

/// Wrapper for all message types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    PeersMap { peers: BTreeMap<String, PublicKey> },
    NewPeer { address: String, public_key: PublicKey },
    SignedTransaction(SignedTransaction),
    SignedBlock(SignedBlock),
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::PeersMap { .. } => MessageType::PeersMap,
            Message::NewPeer { .. } => MessageType::NewPeer,
            Message::SignedTransaction(_) => MessageType::SignedTransaction,
            Message::SignedBlock(_) => MessageType::SignedBlock,
        }
    }

    /// Serialize to a single-line JSON object
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Deserialize one complete JSON object
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }
}
