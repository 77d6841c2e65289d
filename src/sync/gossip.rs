// Gossip Engine - message-type dispatch with at-most-once forwarding
//
// Membership messages go to the peer directory, transactions and blocks go
// to the consensus engine. The engine never writes to the network itself:
// it returns events the node turns into broadcasts and dials.

use crate::consensus::{BlockOutcome, ConsensusEngine, SignedBlock};
use crate::identity::{PublicKey, Signature};
use crate::sync::{Message, PeerDirectory, PeerError, SeenSet};
use crate::tx::{SignedTransaction, TransactionId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for the gossip engine
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Re-flood NewPeer announcements that add a directory entry
    pub forward_new_peers: bool,
    /// Re-flood blocks that fail validation
    pub forward_rejected_blocks: bool,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            forward_new_peers: true,
            forward_rejected_blocks: true,
        }
    }
}

impl GossipConfig {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forward_new_peers(mut self, forward: bool) -> Self {
        self.forward_new_peers = forward;
        self
    }

    pub fn with_forward_rejected_blocks(mut self, forward: bool) -> Self {
        self.forward_rejected_blocks = forward;
        self
    }
}

/// Events produced by the gossip engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipEvent {
    /// Broadcast a message to every connection
    Forward(Message),
    /// Open a connection to a directory address
    Dial(String),
}

/// Statistics about the gossip engine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub messages_processed: u64,
    pub messages_forwarded: u64,
    pub duplicates_dropped: u64,
    pub transactions_accepted: u64,
    pub transactions_rejected: u64,
    pub blocks_accepted: u64,
    pub blocks_rejected: u64,
    pub peers_learned: u64,
}

pub struct GossipEngine {
    local_address: String,
    public_key: PublicKey,
    consensus: Arc<ConsensusEngine>,
    config: GossipConfig,
    seen_transactions: Mutex<SeenSet<TransactionId>>,
    seen_blocks: Mutex<SeenSet<Signature>>,
    directory: Mutex<PeerDirectory>,
    stats: Mutex<GossipStats>,
}

impl GossipEngine {
    pub fn new(
        local_address: impl Into<String>,
        consensus: Arc<ConsensusEngine>,
        config: GossipConfig,
    ) -> Self {
        Self {
            local_address: local_address.into(),
            public_key: consensus.public_key(),
            consensus,
            config,
            seen_transactions: Mutex::new(SeenSet::new()),
            seen_blocks: Mutex::new(SeenSet::new()),
            directory: Mutex::new(PeerDirectory::new()),
            stats: Mutex::new(GossipStats::default()),
        }
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    pub fn consensus(&self) -> &Arc<ConsensusEngine> {
        &self.consensus
    }

    pub async fn stats(&self) -> GossipStats {
        self.stats.lock().await.clone()
    }

    // ========================================================================
    // DIRECTORY
    // ========================================================================

    /// Snapshot message queued on every accepted connection
    pub async fn directory_snapshot(&self) -> Message {
        Message::PeersMap {
            peers: self.directory.lock().await.snapshot(),
        }
    }

    pub async fn peers(&self) -> BTreeMap<String, PublicKey> {
        self.directory.lock().await.snapshot()
    }

    pub async fn lookup_peer(&self, address: &str) -> Result<PublicKey, PeerError> {
        self.directory.lock().await.lookup(address)
    }

    pub async fn resolve_address(&self, public_key: &PublicKey) -> Option<String> {
        self.directory.lock().await.resolve_address(public_key)
    }

    pub async fn is_adopted(&self) -> bool {
        self.directory.lock().await.is_adopted()
    }

    // ========================================================================
    // MESSAGE PROCESSING
    // ========================================================================

    /// Process an incoming message
    ///
    /// Locally originated transactions and blocks go through here too, so
    /// their ids are in the seen-sets before the first broadcast.
    pub async fn process_message(&self, msg: Message) -> Vec<GossipEvent> {
        self.stats.lock().await.messages_processed += 1;

        let events = match msg {
            Message::PeersMap { peers } => self.handle_peers_map(peers).await,
            Message::NewPeer {
                address,
                public_key,
            } => self.handle_new_peer(address, public_key).await,
            Message::SignedTransaction(tx) => self.handle_transaction(tx).await,
            Message::SignedBlock(block) => self.handle_block(block).await,
        };

        let forwarded = events
            .iter()
            .filter(|e| matches!(e, GossipEvent::Forward(_)))
            .count() as u64;
        self.stats.lock().await.messages_forwarded += forwarded;

        events
    }

    async fn handle_peers_map(&self, peers: BTreeMap<String, PublicKey>) -> Vec<GossipEvent> {
        let adoption = {
            let mut directory = self.directory.lock().await;
            directory.adopt(peers, &self.local_address, &self.public_key)
        };

        let Some(adoption) = adoption else {
            debug!("ignoring directory snapshot, already adopted");
            return vec![];
        };

        self.consensus.open_account(self.public_key.clone()).await;
        for key in &adoption.new_keys {
            self.consensus.open_account(key.clone()).await;
        }
        self.stats.lock().await.peers_learned += adoption.new_keys.len() as u64;

        info!(
            peers = adoption.new_keys.len(),
            dialing = adoption.dial_targets.len(),
            "adopted directory snapshot"
        );

        let mut events: Vec<GossipEvent> = adoption
            .dial_targets
            .into_iter()
            .map(GossipEvent::Dial)
            .collect();
        events.push(GossipEvent::Forward(adoption.announcement));
        events
    }

    async fn handle_new_peer(&self, address: String, public_key: PublicKey) -> Vec<GossipEvent> {
        let added = self
            .directory
            .lock()
            .await
            .add_if_absent(address.clone(), public_key.clone());

        if !added {
            self.stats.lock().await.duplicates_dropped += 1;
            return vec![];
        }

        self.consensus.open_account(public_key.clone()).await;
        self.stats.lock().await.peers_learned += 1;
        info!(peer = %address, key = %public_key.short(), "new peer joined");

        if self.config.forward_new_peers {
            vec![GossipEvent::Forward(Message::NewPeer {
                address,
                public_key,
            })]
        } else {
            vec![]
        }
    }

    async fn handle_transaction(&self, tx: SignedTransaction) -> Vec<GossipEvent> {
        if !self.seen_transactions.lock().await.mark(tx.id()) {
            self.stats.lock().await.duplicates_dropped += 1;
            return vec![];
        }

        let outcome = self.consensus.handle_transaction(tx.clone()).await;
        let mut stats = self.stats.lock().await;
        if outcome.should_forward() {
            stats.transactions_accepted += 1;
            vec![GossipEvent::Forward(Message::SignedTransaction(tx))]
        } else {
            stats.transactions_rejected += 1;
            debug!(tx_id = %tx.id(), outcome = ?outcome, "not forwarding transaction");
            vec![]
        }
    }

    async fn handle_block(&self, signed: SignedBlock) -> Vec<GossipEvent> {
        if !self.seen_blocks.lock().await.mark(signed.signature()) {
            self.stats.lock().await.duplicates_dropped += 1;
            return vec![];
        }

        let creator = self
            .resolve_address(signed.block().creator())
            .await
            .unwrap_or_else(|| signed.block().creator().short());

        let outcome = self.consensus.handle_block(&signed).await;
        let accepted = matches!(outcome, BlockOutcome::Accepted(_));
        {
            let mut stats = self.stats.lock().await;
            if accepted {
                stats.blocks_accepted += 1;
            } else {
                stats.blocks_rejected += 1;
            }
        }

        match &outcome {
            BlockOutcome::Accepted(report) => info!(
                slot = signed.block().slot(),
                transactions = report.applied.len(),
                "block from {} applied",
                creator
            ),
            BlockOutcome::Rejected { error, .. } => warn!(
                slot = signed.block().slot(),
                error = %error,
                "block from {} rejected",
                creator
            ),
        }

        if accepted || self.config.forward_rejected_blocks {
            vec![GossipEvent::Forward(Message::SignedBlock(signed))]
        } else {
            vec![]
        }
    }
}
