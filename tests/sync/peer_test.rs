// Peer Tests
// Tests for the peer directory and snapshot adoption

use stakemesh::identity::{Keypair, PublicKey};
use stakemesh::sync::{parse_peer_address, Message, PeerDirectory, PeerError, MAX_CON};
use std::collections::BTreeMap;

const SELF_ADDRESS: &str = "127.0.0.1:7000";

fn snapshot(n: usize) -> BTreeMap<String, PublicKey> {
    (0..n)
        .map(|i| {
            (
                format!("127.0.0.1:{}", 8000 + i),
                Keypair::generate().public_key(),
            )
        })
        .collect()
}

// ============================================================================
// ADOPTION
// ============================================================================

/// Test: a seed adopting an empty snapshot dials nobody and lists only itself
#[test]
fn test_adopt_empty_snapshot() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();

    let adoption = dir.adopt(BTreeMap::new(), SELF_ADDRESS, &me).unwrap();

    assert!(adoption.dial_targets.is_empty());
    assert!(adoption.new_keys.is_empty());
    assert!(dir.is_adopted());
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.public_key_of(SELF_ADDRESS), Some(&me));
}

/// Test: a small snapshot is dialed in full
#[test]
fn test_adopt_dials_every_entry_below_limit() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();
    let snap = snapshot(4);
    let expected: Vec<String> = snap.keys().cloned().collect();

    let adoption = dir.adopt(snap, SELF_ADDRESS, &me).unwrap();

    assert_eq!(adoption.dial_targets, expected);
    assert_eq!(adoption.new_keys.len(), 4);
}

/// Test: exactly MAX_CON entries are all dialed
#[test]
fn test_adopt_at_connection_limit() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();

    let adoption = dir.adopt(snapshot(MAX_CON), SELF_ADDRESS, &me).unwrap();

    assert_eq!(adoption.dial_targets.len(), MAX_CON);
}

/// Test: a large snapshot dials only the last MAX_CON addresses
#[test]
fn test_adopt_caps_dial_targets() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();
    let snap = snapshot(MAX_CON + 7);
    let expected: Vec<String> = snap.keys().skip(7).cloned().collect();

    let adoption = dir.adopt(snap, SELF_ADDRESS, &me).unwrap();

    assert_eq!(adoption.dial_targets, expected);
    assert_eq!(dir.len(), MAX_CON + 8);
}

/// Test: our own address in the snapshot is never a dial target
#[test]
fn test_adopt_skips_self() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();
    let mut snap = snapshot(2);
    snap.insert(SELF_ADDRESS.to_string(), me.clone());

    let adoption = dir.adopt(snap, SELF_ADDRESS, &me).unwrap();

    assert!(!adoption.dial_targets.contains(&SELF_ADDRESS.to_string()));
    assert_eq!(adoption.new_keys.len(), 2);
    assert_eq!(dir.len(), 3);
}

/// Test: the announcement names our address and key
#[test]
fn test_adopt_announcement() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();

    let adoption = dir.adopt(snapshot(1), SELF_ADDRESS, &me).unwrap();

    assert_eq!(
        adoption.announcement,
        Message::NewPeer {
            address: SELF_ADDRESS.to_string(),
            public_key: me,
        }
    );
}

/// Test: a second snapshot is ignored
#[test]
fn test_second_snapshot_ignored() {
    let mut dir = PeerDirectory::new();
    let me = Keypair::generate().public_key();
    dir.adopt(snapshot(1), SELF_ADDRESS, &me);

    assert!(dir.adopt(snapshot(5), SELF_ADDRESS, &me).is_none());
    assert_eq!(dir.len(), 2);
}

// ============================================================================
// ANNOUNCEMENTS AND LOOKUPS
// ============================================================================

/// Test: an address is bound to the first key announced for it
#[test]
fn test_add_if_absent_keeps_first_key() {
    let mut dir = PeerDirectory::new();
    let first = Keypair::generate().public_key();
    let second = Keypair::generate().public_key();

    assert!(dir.add_if_absent("127.0.0.1:9000".to_string(), first.clone()));
    assert!(!dir.add_if_absent("127.0.0.1:9000".to_string(), second));

    assert_eq!(dir.lookup("127.0.0.1:9000"), Ok(first));
}

/// Test: lookups of unknown addresses fail
#[test]
fn test_lookup_unknown() {
    let dir = PeerDirectory::new();
    assert_eq!(
        dir.lookup("127.0.0.1:1"),
        Err(PeerError::UnknownPeer("127.0.0.1:1".to_string()))
    );
    assert!(dir.public_key_of("127.0.0.1:1").is_none());
}

/// Test: reverse lookup finds the address of a key
#[test]
fn test_resolve_address() {
    let mut dir = PeerDirectory::new();
    let key = Keypair::generate().public_key();
    dir.add_if_absent("127.0.0.1:9100".to_string(), key.clone());

    assert_eq!(dir.resolve_address(&key), Some("127.0.0.1:9100".to_string()));
    assert_eq!(dir.resolve_address(&Keypair::generate().public_key()), None);
}

/// Test: snapshot is a detached copy
#[test]
fn test_snapshot_is_copy() {
    let mut dir = PeerDirectory::new();
    dir.add_if_absent("127.0.0.1:9000".to_string(), Keypair::generate().public_key());
    let snap = dir.snapshot();

    dir.add_if_absent("127.0.0.1:9001".to_string(), Keypair::generate().public_key());

    assert_eq!(snap.len(), 1);
    assert_eq!(dir.len(), 2);
}

/// Test: address parsing
#[test]
fn test_parse_peer_address() {
    assert_eq!(
        parse_peer_address("127.0.0.1:9000").unwrap().port(),
        9000
    );
    assert!(parse_peer_address("[::1]:9000").is_ok());
    assert!(matches!(
        parse_peer_address("localhost"),
        Err(PeerError::InvalidAddress(_))
    ));
}
