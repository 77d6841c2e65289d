// TCP Transport Implementation
// One reader task and one writer task per connection. The reader decodes
// frames into events; either task removes the connection when its half of
// the stream fails.

use crate::sync::Message;
use crate::transport::{
    encode, ConnectionDirection, ConnectionId, ConnectionSet, FrameDecoder, TransportError,
    TransportEvent, DEFAULT_MAX_FRAME_BYTES,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Dial timeout in seconds
    pub connect_timeout_secs: u64,
    /// Outbound frames buffered per connection; a peer this far behind is dropped
    pub write_queue_size: usize,
    /// Largest frame a reader accepts
    pub max_frame_bytes: usize,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            write_queue_size: 256,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_write_queue_size(mut self, size: usize) -> Self {
        self.write_queue_size = size;
        self
    }

    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connect_timeout_secs == 0 {
            return Err(TransportError::InvalidConfig(
                "connect timeout must be positive".to_string(),
            ));
        }
        if self.write_queue_size == 0 {
            return Err(TransportError::InvalidConfig(
                "write queue size must be positive".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(TransportError::InvalidConfig(
                "max frame size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

pub struct TcpTransport {
    config: TcpTransportConfig,
    connections: Arc<ConnectionSet>,
    events: mpsc::Sender<TransportEvent>,
}

impl TcpTransport {
    /// Create a transport whose readers deliver into `events`
    pub fn new(config: TcpTransportConfig, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            connections: Arc::new(ConnectionSet::new()),
            events,
        }
    }

    /// Bind a listener
    pub async fn bind(address: &str) -> Result<TcpListener, TransportError> {
        TcpListener::bind(address)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", address, e)))
    }

    pub fn connections(&self) -> &Arc<ConnectionSet> {
        &self.connections
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    /// Dial a peer and start its reader and writer tasks
    pub async fn dial(&self, address: &str) -> Result<ConnectionId, TransportError> {
        let target: SocketAddr = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;

        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let stream = timeout(connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let id = self
            .spawn_connection(stream, address.to_string(), ConnectionDirection::Outbound, None)
            .await;
        debug!(connection = %id, peer = %address, "dialed peer");
        Ok(id)
    }

    /// Register an accepted stream
    ///
    /// `greeting` is queued before the connection joins the set, so it is the
    /// first frame the peer receives ahead of any broadcast.
    pub async fn accept(&self, stream: TcpStream, peer: SocketAddr, greeting: Vec<u8>) -> ConnectionId {
        let id = self
            .spawn_connection(
                stream,
                peer.to_string(),
                ConnectionDirection::Inbound,
                Some(greeting),
            )
            .await;
        debug!(connection = %id, peer = %peer, "accepted peer");
        id
    }

    /// Encode once and queue on every connection
    pub async fn broadcast(&self, message: &Message) -> Result<usize, TransportError> {
        let bytes = encode(message).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(self.connections.broadcast(&bytes).await)
    }

    pub async fn send(&self, id: &ConnectionId, message: &Message) -> Result<(), TransportError> {
        let bytes = encode(message).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.connections.send(id, bytes).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    async fn spawn_connection(
        &self,
        stream: TcpStream,
        address: String,
        direction: ConnectionDirection,
        greeting: Option<Vec<u8>>,
    ) -> ConnectionId {
        stream.set_nodelay(self.config.nodelay).ok();

        let id = ConnectionId::generate();
        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(self.config.write_queue_size);
        if let Some(greeting) = greeting {
            // Fresh channel with spare capacity
            let _ = write_tx.try_send(greeting);
        }

        let (reader, writer) = stream.into_split();

        self.connections
            .insert(id.clone(), address, direction, write_tx)
            .await;

        tokio::spawn(write_loop(
            id.clone(),
            writer,
            write_rx,
            Arc::clone(&self.connections),
        ));

        tokio::spawn(read_loop(
            id.clone(),
            reader,
            Arc::clone(&self.connections),
            self.events.clone(),
            self.config.max_frame_bytes,
        ));

        id
    }
}

/// Drain the write queue into the socket
///
/// Ends when the connection leaves the set (its queue sender is dropped) or
/// a write fails, in which case the connection is removed here.
async fn write_loop<W>(
    id: ConnectionId,
    mut writer: W,
    mut queue: mpsc::Receiver<Vec<u8>>,
    connections: Arc<ConnectionSet>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = queue.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(connection = %id, error = %e, "write failed, closing connection");
            connections.remove(&id).await;
            return;
        }
    }
}

/// Decode frames until the stream closes or turns unreadable
async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    connections: Arc<ConnectionSet>,
    events: mpsc::Sender<TransportEvent>,
    max_frame_bytes: usize,
) {
    let mut decoder = FrameDecoder::new(max_frame_bytes);
    let mut buf = vec![0u8; 8192];

    let reason = 'read: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break 'read "stream closed".to_string(),
            Ok(n) => n,
            Err(e) => break 'read e.to_string(),
        };
        decoder.extend(&buf[..n]);

        loop {
            match decoder.next_frame() {
                Ok(Some(message)) => {
                    let event = TransportEvent::MessageReceived {
                        connection_id: id.clone(),
                        message,
                    };
                    if events.send(event).await.is_err() {
                        break 'read "node stopped".to_string();
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    warn!(connection = %id, error = %e, "dropping malformed frame");
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "closing connection");
                    break 'read e.to_string();
                }
            }
        }
    };

    connections.remove(&id).await;
    debug!(connection = %id, reason = %reason, "connection removed");
    let _ = events
        .send(TransportEvent::Disconnected {
            connection_id: id,
            reason,
        })
        .await;
}
