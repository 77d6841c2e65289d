// Gossip Tests
// Dispatch, at-most-once forwarding and membership handling

use num_bigint::BigUint;
use stakemesh::consensus::{
    Block, ConsensusEngine, ConsensusParams, Lottery, SignedBlock, StakePolicy,
};
use stakemesh::identity::{Keypair, PublicKey};
use stakemesh::ledger::LedgerPolicy;
use stakemesh::sync::{GossipConfig, GossipEngine, GossipEvent, Message};
use stakemesh::tx::{SignedTransaction, TransactionBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;

const LOCAL: &str = "127.0.0.1:7000";

fn gossip_with(config: GossipConfig) -> GossipEngine {
    let consensus = Arc::new(ConsensusEngine::new(
        Keypair::generate(),
        ConsensusParams::new().with_hardness(BigUint::from(1u32)),
        StakePolicy::default(),
        LedgerPolicy::default(),
    ));
    GossipEngine::new(LOCAL, consensus, config)
}

fn gossip() -> GossipEngine {
    gossip_with(GossipConfig::default())
}

async fn announce(gossip: &GossipEngine, address: &str, key: &PublicKey) {
    gossip
        .process_message(Message::NewPeer {
            address: address.to_string(),
            public_key: key.clone(),
        })
        .await;
}

fn transfer(from: &Keypair, to: &PublicKey, amount: u64) -> SignedTransaction {
    TransactionBuilder::new()
        .sender(from)
        .recipient(to.clone())
        .amount(amount)
        .build()
        .unwrap()
}

fn block(creator: &Keypair, slot: u64, transactions: Vec<SignedTransaction>) -> SignedBlock {
    let draw = Lottery::draw(creator, ConsensusParams::default().seed, slot);
    SignedBlock::sign(
        Block::new(slot, creator.public_key(), draw, transactions),
        creator,
    )
}

// ============================================================================
// MEMBERSHIP
// ============================================================================

/// Test: adopting a snapshot dials its entries before announcing ourselves
#[tokio::test]
async fn test_snapshot_dials_then_announces() {
    let gossip = gossip();
    let mut peers = BTreeMap::new();
    peers.insert("127.0.0.1:7001".to_string(), Keypair::generate().public_key());
    peers.insert("127.0.0.1:7002".to_string(), Keypair::generate().public_key());

    let events = gossip.process_message(Message::PeersMap { peers }).await;

    assert_eq!(
        &events[..2],
        &[
            GossipEvent::Dial("127.0.0.1:7001".to_string()),
            GossipEvent::Dial("127.0.0.1:7002".to_string()),
        ]
    );
    assert!(matches!(
        &events[2],
        GossipEvent::Forward(Message::NewPeer { address, .. }) if address == LOCAL
    ));
    assert!(gossip.is_adopted().await);
    assert_eq!(gossip.peers().await.len(), 3);
}

/// Test: every learned key receives the genesis stake
#[tokio::test]
async fn test_snapshot_opens_accounts() {
    let gossip = gossip();
    let peer = Keypair::generate().public_key();
    let mut peers = BTreeMap::new();
    peers.insert("127.0.0.1:7001".to_string(), peer.clone());

    gossip.process_message(Message::PeersMap { peers }).await;

    let consensus = gossip.consensus();
    assert_eq!(consensus.balance(&peer).await, 1000);
    assert_eq!(consensus.balance(&consensus.public_key()).await, 1000);
    assert_eq!(gossip.stats().await.peers_learned, 1);
}

/// Test: later snapshots neither dial nor announce
#[tokio::test]
async fn test_second_snapshot_ignored() {
    let gossip = gossip();
    gossip
        .process_message(Message::PeersMap {
            peers: BTreeMap::new(),
        })
        .await;

    let mut peers = BTreeMap::new();
    peers.insert("127.0.0.1:7009".to_string(), Keypair::generate().public_key());
    let events = gossip.process_message(Message::PeersMap { peers }).await;

    assert!(events.is_empty());
    assert_eq!(gossip.peers().await.len(), 1);
}

/// Test: announcements are not re-flooded when disabled
#[tokio::test]
async fn test_new_peer_forwarding_disabled() {
    let gossip = gossip_with(GossipConfig::new().with_forward_new_peers(false));
    let key = Keypair::generate().public_key();

    let events = gossip
        .process_message(Message::NewPeer {
            address: "127.0.0.1:7005".to_string(),
            public_key: key.clone(),
        })
        .await;

    assert!(events.is_empty());
    assert_eq!(gossip.lookup_peer("127.0.0.1:7005").await, Ok(key.clone()));
    assert_eq!(
        gossip.resolve_address(&key).await,
        Some("127.0.0.1:7005".to_string())
    );
}

/// Test: the snapshot sent to new connections lists us after adoption
#[tokio::test]
async fn test_directory_snapshot_message() {
    let gossip = gossip();
    gossip
        .process_message(Message::PeersMap {
            peers: BTreeMap::new(),
        })
        .await;

    match gossip.directory_snapshot().await {
        Message::PeersMap { peers } => {
            assert_eq!(peers.get(LOCAL), Some(&gossip.consensus().public_key()));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Test: a valid transaction is forwarded exactly once
#[tokio::test]
async fn test_transaction_forwarded_once() {
    let gossip = gossip();
    let alice = Keypair::generate();
    announce(&gossip, "127.0.0.1:7001", &alice.public_key()).await;
    let tx = transfer(&alice, &Keypair::generate().public_key(), 25);

    let first = gossip
        .process_message(Message::SignedTransaction(tx.clone()))
        .await;
    let second = gossip
        .process_message(Message::SignedTransaction(tx.clone()))
        .await;

    assert_eq!(first, vec![GossipEvent::Forward(Message::SignedTransaction(tx.clone()))]);
    assert!(second.is_empty());
    assert!(gossip.consensus().pending_contains(tx.id()).await);

    let stats = gossip.stats().await;
    assert_eq!(stats.transactions_accepted, 1);
    assert_eq!(stats.duplicates_dropped, 1);
}

/// Test: an overdraft is dropped and stays dropped
#[tokio::test]
async fn test_overdraft_not_forwarded() {
    let gossip = gossip();
    let alice = Keypair::generate();
    announce(&gossip, "127.0.0.1:7001", &alice.public_key()).await;
    let tx = transfer(&alice, &Keypair::generate().public_key(), 1001);

    assert!(gossip
        .process_message(Message::SignedTransaction(tx.clone()))
        .await
        .is_empty());
    assert!(gossip
        .process_message(Message::SignedTransaction(tx.clone()))
        .await
        .is_empty());

    assert_eq!(gossip.consensus().pending_len().await, 0);
    let stats = gossip.stats().await;
    assert_eq!(stats.transactions_rejected, 1);
    assert_eq!(stats.duplicates_dropped, 1);
}

// ============================================================================
// BLOCKS
// ============================================================================

/// Test: a winning block is applied and forwarded
#[tokio::test]
async fn test_valid_block_applied_and_forwarded() {
    let gossip = gossip();
    let creator = Keypair::generate();
    let alice = Keypair::generate();
    let bob = Keypair::generate().public_key();
    announce(&gossip, "127.0.0.1:7001", &creator.public_key()).await;
    announce(&gossip, "127.0.0.1:7002", &alice.public_key()).await;

    let tx = transfer(&alice, &bob, 100);
    gossip
        .process_message(Message::SignedTransaction(tx.clone()))
        .await;
    let signed = block(&creator, 12, vec![tx.clone()]);

    let events = gossip
        .process_message(Message::SignedBlock(signed.clone()))
        .await;

    assert_eq!(events, vec![GossipEvent::Forward(Message::SignedBlock(signed))]);
    let consensus = gossip.consensus();
    assert_eq!(consensus.balance(&creator.public_key()).await, 1011);
    assert_eq!(consensus.balance(&alice.public_key()).await, 900);
    assert_eq!(consensus.balance(&bob).await, 99);
    assert!(consensus.is_executed(tx.id()).await);
    assert_eq!(consensus.pending_len().await, 0);
    assert_eq!(gossip.stats().await.blocks_accepted, 1);
}

/// Test: the same block delivered twice is applied once
#[tokio::test]
async fn test_block_redelivery_dropped() {
    let gossip = gossip();
    let creator = Keypair::generate();
    announce(&gossip, "127.0.0.1:7001", &creator.public_key()).await;
    let signed = block(&creator, 3, vec![]);

    gossip
        .process_message(Message::SignedBlock(signed.clone()))
        .await;
    let again = gossip.process_message(Message::SignedBlock(signed)).await;

    assert!(again.is_empty());
    assert_eq!(
        gossip.consensus().balance(&creator.public_key()).await,
        1010
    );
}

/// Test: an invalid block is penalized and, by default, still flooded
#[tokio::test]
async fn test_invalid_block_penalized_and_forwarded() {
    let gossip = gossip();
    let creator = Keypair::generate();
    announce(&gossip, "127.0.0.1:7001", &creator.public_key()).await;

    // Draw made for a different slot
    let draw = Lottery::draw(&creator, ConsensusParams::default().seed, 8);
    let forged = SignedBlock::sign(Block::new(9, creator.public_key(), draw, vec![]), &creator);

    let events = gossip
        .process_message(Message::SignedBlock(forged))
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(gossip.consensus().balance(&creator.public_key()).await, 990);
    assert_eq!(gossip.stats().await.blocks_rejected, 1);
}

/// Test: rejected blocks stop here when forwarding them is disabled
#[tokio::test]
async fn test_invalid_block_not_forwarded_when_disabled() {
    let gossip = gossip_with(GossipConfig::new().with_forward_rejected_blocks(false));
    let stranger = Keypair::generate();

    // No stake in this node's ledger, so the draw cannot win
    let events = gossip
        .process_message(Message::SignedBlock(block(&stranger, 4, vec![])))
        .await;

    assert!(events.is_empty());
    assert_eq!(gossip.consensus().balance(&stranger.public_key()).await, -10);
}
