// Transport Types - connection identity, events and errors

use crate::sync::Message;
use rand::Rng;
use std::fmt;
use thiserror::Error;

/// Random per-connection key into the connection set
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Which side opened the connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionDirection {
    Inbound,
    Outbound,
}

/// Events delivered by connection reader tasks
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A decoded message arrived
    MessageReceived {
        connection_id: ConnectionId,
        message: Message,
    },

    /// The connection was removed from the set
    Disconnected {
        connection_id: ConnectionId,
        reason: String,
    },
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
