// Connection Set - live connections and their outbound queues
//
// One mutex guards the whole set. Broadcast copies the writer handles out
// under the lock and queues outside it. Queuing never waits: a peer whose
// queue is full has stopped reading and is dropped from the set.

use crate::transport::{ConnectionDirection, ConnectionId, TransportError};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
struct ConnectionHandle {
    address: String,
    direction: ConnectionDirection,
    writer: mpsc::Sender<Vec<u8>>,
}

/// Summary of a live connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub address: String,
    pub direction: ConnectionDirection,
}

#[derive(Debug, Default)]
pub struct ConnectionSet {
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        id: ConnectionId,
        address: String,
        direction: ConnectionDirection,
        writer: mpsc::Sender<Vec<u8>>,
    ) {
        self.connections.lock().await.insert(
            id,
            ConnectionHandle {
                address,
                direction,
                writer,
            },
        );
    }

    /// Remove a connection by id; dropping its writer ends the writer task
    pub async fn remove(&self, id: &ConnectionId) -> bool {
        self.connections.lock().await.remove(id).is_some()
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().await.contains_key(id)
    }

    /// Whether an outbound connection to `address` already exists
    pub async fn contains_address(&self, address: &str) -> bool {
        self.connections
            .lock()
            .await
            .values()
            .any(|h| h.direction == ConnectionDirection::Outbound && h.address == address)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|(id, h)| ConnectionInfo {
                id: id.clone(),
                address: h.address.clone(),
                direction: h.direction,
            })
            .collect()
    }

    /// Queue bytes on one connection
    pub async fn send(&self, id: &ConnectionId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let writer = self
            .connections
            .lock()
            .await
            .get(id)
            .map(|h| h.writer.clone())
            .ok_or(TransportError::NotConnected)?;

        match writer.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, "write queue full, dropping lagging connection");
                self.remove(id).await;
                Err(TransportError::SendFailed("Write queue full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                self.remove(id).await;
                Err(TransportError::SendFailed("Channel closed".to_string()))
            }
        }
    }

    /// Queue the same payload on every connection present right now
    ///
    /// Returns how many connections accepted it. Connections whose queue is
    /// full or closed are removed.
    pub async fn broadcast(&self, bytes: &[u8]) -> usize {
        let writers: Vec<(ConnectionId, mpsc::Sender<Vec<u8>>)> = self
            .connections
            .lock()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.writer.clone()))
            .collect();

        let mut count = 0;
        let mut lagging = Vec::new();
        for (id, writer) in writers {
            match writer.try_send(bytes.to_vec()) {
                Ok(()) => count += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection = %id, "write queue full, dropping lagging connection");
                    lagging.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %id, "writer closed during broadcast");
                    lagging.push(id);
                }
            }
        }

        if !lagging.is_empty() {
            let mut connections = self.connections.lock().await;
            for id in &lagging {
                connections.remove(id);
            }
        }
        count
    }
}
