// Node - composes identity, gossip, consensus and transport
//
// Tasks: accept loop, dispatcher (transport events into the gossip engine),
// broadcaster (outgoing queue onto every connection) and the slot loop.
// Connection readers and writers are spawned by the transport.

use crate::consensus::{ConsensusEngine, LotteryOutcome, ParamsError};
use crate::identity::{Keypair, LocalIdentity, PublicKey};
use crate::node::NodeConfig;
use crate::sync::{parse_peer_address, GossipEngine, GossipEvent, Message, PeerError};
use crate::transport::{encode, TcpTransport, TransportError, TransportEvent};
use crate::tx::{
    SignedTransaction, TransactionBuilder, TransactionError, TransactionValidator, ValidationError,
};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Consensus parameters: {0}")]
    Params(#[from] ParamsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Transaction rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the node entered the network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    /// Joined through a reachable bootstrap peer
    Member,
    /// Started a new network, possibly after the bootstrap peer was unreachable
    Seed,
}

struct NodeShared {
    identity: LocalIdentity,
    gossip: Arc<GossipEngine>,
    transport: Arc<TcpTransport>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl NodeShared {
    /// Handle a message as if it had arrived from a peer
    async fn deliver(&self, message: Message) {
        let events = self.gossip.process_message(message).await;
        self.apply_events(events);
    }

    /// Dials run off the dispatcher
    ///
    /// Forwards produced alongside dials wait for those dials to finish, so
    /// a fresh announcement also reaches the new links.
    fn apply_events(&self, events: Vec<GossipEvent>) {
        let mut dials = Vec::new();
        let mut forwards = Vec::new();
        for event in events {
            match event {
                GossipEvent::Dial(address) => dials.push(address),
                GossipEvent::Forward(message) => forwards.push(message),
            }
        }

        if dials.is_empty() {
            forward_all(&self.outgoing, forwards);
            return;
        }

        let transport = Arc::clone(&self.transport);
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            let mut pending = JoinSet::new();
            for address in dials {
                let transport = Arc::clone(&transport);
                pending.spawn(async move {
                    if transport.connections().contains_address(&address).await {
                        debug!(peer = %address, "already connected");
                        return;
                    }
                    if let Err(e) = transport.dial(&address).await {
                        warn!(peer = %address, error = %e, "failed to dial peer");
                    }
                });
            }
            while pending.join_next().await.is_some() {}
            forward_all(&outgoing, forwards);
        });
    }

    async fn propose(&self, slot: u64) -> LotteryOutcome {
        let outcome = self.gossip.consensus().run_lottery(slot).await;
        if let LotteryOutcome::Won(block) = &outcome {
            self.deliver(Message::SignedBlock(block.clone())).await;
        }
        outcome
    }
}

fn forward_all(outgoing: &mpsc::UnboundedSender<Message>, messages: Vec<Message>) {
    for message in messages {
        if outgoing.send(message).is_err() {
            warn!("broadcast queue closed");
        }
    }
}

pub struct Node;

impl Node {
    /// Bind, join the network and start every background task
    pub async fn start(config: NodeConfig) -> Result<NodeHandle, NodeError> {
        config.validate()?;

        let listener = TcpTransport::bind(&config.listen_address).await?;
        let bound = listener.local_addr()?;
        let advertised = match &config.advertise_address {
            Some(address) => parse_peer_address(address)?,
            None => advertise_from(bound),
        };

        let keypair = config.keypair.clone().unwrap_or_else(Keypair::generate);
        let identity = LocalIdentity::new(keypair.clone(), advertised);

        let consensus = Arc::new(ConsensusEngine::new(
            keypair,
            config.params.clone(),
            config.stake_policy.clone(),
            config.ledger_policy.clone(),
        ));
        consensus.open_account(identity.public_key()).await;

        let gossip = Arc::new(GossipEngine::new(
            identity.address(),
            Arc::clone(&consensus),
            config.gossip.clone(),
        ));

        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size);
        let transport = Arc::new(TcpTransport::new(config.tcp.clone(), event_tx));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(NodeShared {
            identity,
            gossip,
            transport: Arc::clone(&transport),
            outgoing: outgoing_tx,
        });

        info!(
            address = %shared.identity.address(),
            key = %shared.identity.public_key().short(),
            "node listening"
        );

        let mut tasks = vec![
            tokio::spawn(accept_loop(listener, Arc::clone(&shared))),
            tokio::spawn(broadcast_loop(outgoing_rx, transport)),
            tokio::spawn(dispatch_loop(event_rx, Arc::clone(&shared))),
        ];

        let role = join_network(&shared, &config).await;

        if config.run_slot_loop {
            tasks.push(tokio::spawn(slot_loop(Arc::clone(&shared))));
        }

        Ok(NodeHandle {
            shared,
            role,
            tasks,
        })
    }
}

/// Handle to a running node
pub struct NodeHandle {
    shared: Arc<NodeShared>,
    role: NodeRole,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn public_key(&self) -> PublicKey {
        self.shared.identity.public_key()
    }

    /// Address this node is known by in peer directories
    pub fn local_address(&self) -> &str {
        self.shared.identity.address()
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn gossip(&self) -> &Arc<GossipEngine> {
        &self.shared.gossip
    }

    pub fn consensus(&self) -> &Arc<ConsensusEngine> {
        self.shared.gossip.consensus()
    }

    pub async fn balance(&self, public_key: &PublicKey) -> i64 {
        self.consensus().balance(public_key).await
    }

    pub async fn own_balance(&self) -> i64 {
        self.balance(&self.public_key()).await
    }

    pub async fn peers(&self) -> BTreeMap<String, PublicKey> {
        self.shared.gossip.peers().await
    }

    pub async fn ledger(&self) -> Vec<(PublicKey, i64)> {
        self.consensus().ledger_snapshot().await
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.transport.connection_count().await
    }

    pub async fn pending_len(&self) -> usize {
        self.consensus().pending_len().await
    }

    /// Sign a transfer from this node's account and flood it
    pub async fn submit_transaction(
        &self,
        to: PublicKey,
        amount: u64,
    ) -> Result<SignedTransaction, NodeError> {
        let tx = TransactionBuilder::new()
            .sender(self.shared.identity.keypair())
            .recipient(to)
            .amount(amount)
            .build()?;
        self.submit(tx.clone()).await?;
        Ok(tx)
    }

    /// Transfer to the node listening at `address`
    pub async fn send_to_address(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<SignedTransaction, NodeError> {
        let to = self.shared.gossip.lookup_peer(address).await?;
        self.submit_transaction(to, amount).await
    }

    /// Flood an already signed transaction after checking it against the local ledger
    pub async fn submit(&self, tx: SignedTransaction) -> Result<(), NodeError> {
        let balance = self.balance(tx.transaction().from()).await;
        TransactionValidator::validate_with_balance(&tx, balance)?;
        self.shared.deliver(Message::SignedTransaction(tx)).await;
        Ok(())
    }

    /// Process a message as if a peer had sent it
    pub async fn deliver(&self, message: Message) {
        self.shared.deliver(message).await;
    }

    /// Run the lottery for `slot` now, delivering and flooding a won block
    pub async fn propose(&self, slot: u64) -> LotteryOutcome {
        self.shared.propose(slot).await
    }

    /// Stop the node's own tasks; connection tasks end with their sockets
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

fn advertise_from(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

/// Dial the bootstrap peer with bounded retries, else become the seed
async fn join_network(shared: &NodeShared, config: &NodeConfig) -> NodeRole {
    if let Some(bootstrap) = &config.bootstrap {
        for attempt in 1..=config.bootstrap_attempts {
            match shared.transport.dial(bootstrap).await {
                Ok(_) => {
                    info!(peer = %bootstrap, "joined through bootstrap peer");
                    return NodeRole::Member;
                }
                Err(e) => {
                    warn!(peer = %bootstrap, attempt, error = %e, "bootstrap dial failed");
                    if attempt < config.bootstrap_attempts {
                        tokio::time::sleep(config.bootstrap_backoff()).await;
                    }
                }
            }
        }
        warn!(peer = %bootstrap, "bootstrap unreachable, starting a new network");
    }

    // The seed adopts its own (empty) directory through a loopback connection
    let own_address = shared.identity.address().to_string();
    if let Err(e) = shared.transport.dial(&own_address).await {
        error!(error = %e, "seed loopback dial failed, adopting empty directory");
        shared
            .deliver(Message::PeersMap {
                peers: BTreeMap::new(),
            })
            .await;
    }

    info!(address = %own_address, "running as seed");
    NodeRole::Seed
}

async fn accept_loop(listener: TcpListener, shared: Arc<NodeShared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let snapshot = shared.gossip.directory_snapshot().await;
                match encode(&snapshot) {
                    Ok(greeting) => {
                        shared.transport.accept(stream, peer, greeting).await;
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "failed to encode directory snapshot"),
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn dispatch_loop(mut events: mpsc::Receiver<TransportEvent>, shared: Arc<NodeShared>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::MessageReceived {
                connection_id,
                message,
            } => {
                debug!(connection = %connection_id, kind = %message.message_type(), "received message");
                shared.deliver(message).await;
            }
            TransportEvent::Disconnected {
                connection_id,
                reason,
            } => {
                debug!(connection = %connection_id, reason = %reason, "peer disconnected");
            }
        }
    }
}

async fn broadcast_loop(mut outgoing: mpsc::UnboundedReceiver<Message>, transport: Arc<TcpTransport>) {
    while let Some(message) = outgoing.recv().await {
        match transport.broadcast(&message).await {
            Ok(count) => debug!(kind = %message.message_type(), connections = count, "broadcast"),
            Err(e) => warn!(kind = %message.message_type(), error = %e, "broadcast failed"),
        }
    }
}

async fn slot_loop(shared: Arc<NodeShared>) {
    let params = shared.gossip.consensus().params().clone();
    loop {
        let slot = params.current_slot();
        if let LotteryOutcome::Won(block) = shared.propose(slot).await {
            info!(slot, hash = %block.block().hash(), "proposed block");
        }
        let wait = params.until_next_slot(chrono::Utc::now().timestamp_millis());
        tokio::time::sleep(wait).await;
    }
}
