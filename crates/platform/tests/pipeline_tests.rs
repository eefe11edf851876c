//! End-to-end tests of the assembled intake pipeline.

mod fixtures;

use braid_intake::NoTransactions;
use braid_platform::{PlatformConfig, PlatformHooks, PlatformStatus, PlatformWiring};
use braid_types::{ConsensusRound, GossipEvent, Hash, NodeId};
use fixtures::{wait_until, TestNetwork};
use std::sync::{Arc, Mutex};
use tracing_test::traced_test;

struct TestNode {
    wiring: PlatformWiring,
    rounds: Arc<Mutex<Vec<ConsensusRound>>>,
    events_seen: Arc<Mutex<Vec<Hash>>>,
    _pces_dir: tempfile::TempDir,
}

/// Build a platform around a fresh PCES directory, with taps on the round
/// and event outputs, replayed to activate the writer.
fn test_node(network: &TestNetwork, self_id: u64) -> TestNode {
    let pces_dir = tempfile::tempdir().unwrap();
    test_node_in(network, self_id, pces_dir)
}

fn test_node_in(network: &TestNetwork, self_id: u64, pces_dir: tempfile::TempDir) -> TestNode {
    let config = PlatformConfig::new(pces_dir.path());
    let wiring = PlatformWiring::new(
        config,
        network.address_book(),
        NodeId(self_id),
        network.signer(self_id),
        Arc::new(NoTransactions),
        PlatformHooks::default(),
    )
    .unwrap();

    let rounds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rounds);
    wiring
        .consensus_round_output()
        .solder_fn("test rounds", move |round| {
            sink.lock().unwrap().push(round);
        });

    let events_seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events_seen);
    wiring
        .event_output()
        .solder_fn("test events", move |event: Arc<GossipEvent>| {
            sink.lock().unwrap().push(event.hash());
        });

    wiring.replay_pces(0).unwrap();
    assert_eq!(wiring.status(), PlatformStatus::Active);

    TestNode {
        wiring,
        rounds,
        events_seen,
        _pces_dir: pces_dir,
    }
}

#[test]
#[traced_test]
fn test_pipeline_reaches_consensus_and_preserves_order() {
    let mut network = TestNetwork::new(4, 4);
    let node = test_node(&network, 0);

    let events = network.events(60);
    let expected_hashes: Vec<Hash> = events
        .iter()
        .map(|e| {
            let bytes = braid_types::encode(e.core()).unwrap();
            Hash::from_bytes(&bytes)
        })
        .collect();
    for event in events {
        node.wiring.gossip_input().put(event);
    }
    node.wiring.flush_intake_pipeline();

    // Nothing was malformed, duplicated, orphaned or mislinked.
    assert_eq!(node.wiring.validator_dropped(), 0);
    assert_eq!(node.wiring.duplicates_dropped(), 0);
    assert_eq!(node.wiring.orphans_held(), 0);
    assert_eq!(node.wiring.linker_invariant_violations(), 0);

    // End-to-end FIFO: the pre-consensus event stream replays the gossip
    // input order exactly, despite the concurrent hasher.
    assert_eq!(*node.events_seen.lock().unwrap(), expected_hashes);

    // Consensus advanced, with strictly increasing round numbers.
    let rounds = node.rounds.lock().unwrap();
    assert!(rounds.len() >= 3, "expected rounds, got {}", rounds.len());
    for (i, round) in rounds.iter().enumerate() {
        assert_eq!(round.round, i as u64 + 1);
        assert!(!round.events.is_empty());
    }
    drop(rounds);

    node.wiring.stop();
}

#[test]
fn test_rounds_become_durable_before_release() {
    let mut network = TestNetwork::new(4, 4);
    let node = test_node(&network, 0);

    for event in network.events(60) {
        node.wiring.gossip_input().put(event);
    }
    node.wiring.flush_intake_pipeline();

    let keystones: Vec<u64> = node
        .rounds
        .lock()
        .unwrap()
        .iter()
        .filter_map(|round| round.keystone_sequence_number())
        .collect();
    assert!(!keystones.is_empty());

    // The writer syncs on each keystone flush request; once it catches up,
    // every emitted round's keystone must be durable. The application gate
    // is durability().is_durable(keystone).
    let last = *keystones.last().unwrap();
    let durability = node.wiring.durability().clone();
    wait_until("keystone durability", move || durability.is_durable(last));
    for keystone in keystones {
        assert!(node.wiring.durability().is_durable(keystone));
    }

    node.wiring.stop();
}

#[test]
fn test_replay_reproduces_the_same_rounds() {
    let pces_dir = tempfile::tempdir().unwrap();

    // Original run: 60 gossip events, rounds recorded, PCES written.
    let mut network = TestNetwork::new(4, 4);
    let original = test_node_in(&network, 0, pces_dir);
    for event in network.events(60) {
        original.wiring.gossip_input().put(event);
    }
    original.wiring.flush_intake_pipeline();
    let original_rounds: Vec<Vec<u8>> = original
        .rounds
        .lock()
        .unwrap()
        .iter()
        .map(|round| round.encoded().unwrap())
        .collect();
    assert!(!original_rounds.is_empty());
    original.wiring.stop();
    let pces_dir = original._pces_dir;

    // Restart: replay the PCES from the same directory into a fresh
    // pipeline. The consensus round sequence must be byte-identical.
    let replayed = test_node_in(&network, 0, pces_dir);
    let replayed_rounds: Vec<Vec<u8>> = replayed
        .rounds
        .lock()
        .unwrap()
        .iter()
        .map(|round| round.encoded().unwrap())
        .collect();

    assert_eq!(original_rounds, replayed_rounds);
    assert_eq!(replayed.wiring.duplicates_dropped(), 0);
    replayed.wiring.stop();
}

#[test]
fn test_duplicate_event_emitted_once() {
    let mut network = TestNetwork::new(4, 4);
    let node = test_node(&network, 0);

    let event = network.next_event();
    let duplicate = event.clone();
    node.wiring.gossip_input().put(event);
    node.wiring.gossip_input().put(duplicate);
    node.wiring.flush_intake_pipeline();

    assert_eq!(node.wiring.duplicates_dropped(), 1);
    assert_eq!(node.events_seen.lock().unwrap().len(), 1);
    node.wiring.stop();
}

#[test]
fn test_orphaned_child_waits_for_parent() {
    let mut network = TestNetwork::new(4, 4);
    let node = test_node(&network, 0);

    let mut events = network.events(6);
    let hashes: Vec<Hash> = events
        .iter()
        .map(|e| {
            let bytes = braid_types::encode(e.core()).unwrap();
            Hash::from_bytes(&bytes)
        })
        .collect();
    let parent_hash = hashes[4];
    let child_hash = hashes[5];

    // Deliver the child (events[5], whose other parent is events[4])
    // before its parent.
    events.swap(4, 5);
    for event in events {
        node.wiring.gossip_input().put(event);
    }
    node.wiring.flush_intake_pipeline();

    let seen = node.events_seen.lock().unwrap();
    assert_eq!(seen.len(), 6);
    // Parent first, then the child that arrived before it.
    assert_eq!(&seen[4..], &[parent_hash, child_hash]);
    drop(seen);
    assert_eq!(node.wiring.orphans_held(), 0);
    node.wiring.stop();
}

#[test]
fn test_self_events_rejoin_the_pipeline() {
    // Nodes 0..3 gossip; node 4 only creates its own events.
    let mut network = TestNetwork::new(5, 4);
    let node = test_node(&network, 4);

    for event in network.events(12) {
        node.wiring.gossip_input().put(event);
    }
    node.wiring.flush_intake_pipeline();
    let before = node.events_seen.lock().unwrap().len();
    assert_eq!(before, 12);

    // A creation tick produces a signed self event that re-enters the
    // pipeline through the inject solder and survives every validator.
    node.wiring.creation_tick_input().put(());
    node.wiring.flush_intake_pipeline();

    let events_seen = Arc::clone(&node.events_seen);
    wait_until("self event emission", move || {
        events_seen.lock().unwrap().len() == 13
    });
    assert_eq!(node.wiring.validator_dropped(), 0);
    node.wiring.stop();
}

#[test]
fn test_hasher_unprocessed_gauge_settles_to_zero() {
    let mut network = TestNetwork::new(4, 4);
    let node = test_node(&network, 0);

    for event in network.events(20) {
        node.wiring.gossip_input().put(event);
    }
    node.wiring.flush_intake_pipeline();
    assert_eq!(node.wiring.hasher_unprocessed_task_count(), 0);
    node.wiring.stop();
}
