//! Integration tests for the APKES/EBEAP/Trickle core, driven the way the
//! teacher drives its own integration tests (`tests/net_test.rs`,
//! `tests/rate_limit_test.rs`): plain `#[test]` functions against the public
//! surface, no test-only macros.

use apkes_core::addr::{ExtAddr, ShortAddr};
use apkes_core::apkes::{Apkes, HandshakeOutcome};
use apkes_core::collaborators::software::{SoftwareAes, SoftwareCcm, SoftwarePrng};
use apkes_core::config::SecurityParams;
use apkes_core::ebeap::{self, StoredMicRing};
use apkes_core::error::CoreError;
use apkes_core::frame;
use apkes_core::keying::{KeyingScheme, LeapScheme};
use apkes_core::neighbor::record::NeighborStatus;
use apkes_core::neighbor::NeighborTable;
use rand::SeedableRng;

const MASTER_KEY: [u8; 16] = [
    0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22, 0x33, 0x33, 0x33, 0x33, 0x44, 0x44, 0x44, 0x44,
];

fn addr(n: u8) -> ExtAddr {
    ExtAddr([0, 0, 0, 0, 0, 0, 0, n])
}

struct Node {
    apkes: Apkes,
    table: NeighborTable,
    keying: LeapScheme,
    cipher: SoftwareAes,
    ccm: SoftwareCcm,
    prng: SoftwarePrng,
}

fn make_node(id: u8, params: SecurityParams, seed: [u8; 16]) -> Node {
    let our_addr = addr(id);
    Node {
        apkes: Apkes::new(params, our_addr, ShortAddr(id as u16)),
        table: NeighborTable::new(params.neighbor_max, params.max_tentative_neighbors),
        keying: LeapScheme::new(MASTER_KEY, our_addr, Box::new(SoftwareAes::default())),
        cipher: SoftwareAes::default(),
        ccm: SoftwareCcm::default(),
        prng: SoftwarePrng::new(seed),
    }
}

/// Scenario 1 (spec §8): key agreement between two nodes sharing a LEAP
/// master key ends with both sides PERMANENT and matching pairwise keys.
#[test]
fn key_agreement_reaches_permanent_on_both_sides() {
    let params = SecurityParams::classic();
    let mut a = make_node(1, params, [0xAA; 16]);
    let mut b = make_node(2, params, [0xBB; 16]);
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let hello = a.apkes.broadcast_hello(&mut a.prng);
    assert_eq!(hello[0], frame::COMMAND_HELLO);

    let waiting = b
        .apkes
        .on_hello(&mut b.table, 0, addr(1), &hello, &mut b.prng, &mut rng)
        .unwrap();
    assert!(waiting.is_some());
    assert_eq!(b.table.get(addr(1)).unwrap().status, NeighborStatus::Tentative);

    let outcome = b
        .apkes
        .on_waiting_period_expired(&mut b.table, &mut b.keying, &mut b.cipher, &mut b.ccm, addr(1))
        .unwrap();
    let helloack = match outcome {
        HandshakeOutcome::SendHelloAck { payload, .. } => payload,
        _ => panic!("expected SendHelloAck"),
    };
    assert_eq!(b.table.get(addr(1)).unwrap().status, NeighborStatus::AwaitingAck);

    let outcome = a
        .apkes
        .on_helloack(
            &mut a.table,
            0,
            &mut a.keying,
            &mut a.cipher,
            &mut a.ccm,
            addr(2),
            None,
            &helloack,
        )
        .unwrap();
    let ack = match outcome {
        HandshakeOutcome::SendAck { payload, .. } => payload,
        _ => panic!("expected SendAck"),
    };
    assert_eq!(a.table.get(addr(2)).unwrap().status, NeighborStatus::Permanent);

    let outcome = b
        .apkes
        .on_ack(&mut b.table, &mut b.ccm, addr(1), &ack)
        .unwrap();
    assert!(matches!(outcome, HandshakeOutcome::Promoted));
    assert_eq!(b.table.get(addr(1)).unwrap().status, NeighborStatus::Permanent);

    let key_a = a.table.get(addr(2)).unwrap().pairwise_key().unwrap().to_vec();
    let key_b = b.table.get(addr(1)).unwrap().pairwise_key().unwrap().to_vec();
    assert_eq!(key_a, key_b, "both sides must derive the same pairwise key");
}

/// Scenario 4: a duplicate HELLO from the same unknown sender within the
/// waiting period is dropped, not a second TENTATIVE allocation.
#[test]
fn duplicate_hello_is_dropped() {
    let params = SecurityParams::classic();
    let mut node = make_node(1, params, [0xCC; 16]);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let hello = frame::encode_hello(&[1, 2, 3, 4, 5, 6, 7, 8], 99);

    let first = node
        .apkes
        .on_hello(&mut node.table, 0, addr(9), &hello, &mut node.prng, &mut rng)
        .unwrap();
    assert!(first.is_some());
    assert_eq!(node.table.len(), 1);

    let second = node
        .apkes
        .on_hello(&mut node.table, 0, addr(9), &hello, &mut node.prng, &mut rng)
        .unwrap();
    assert!(second.is_none(), "duplicate HELLO must be dropped");
    assert_eq!(node.table.len(), 1);
}

/// I5: an expired TENTATIVE slot is reclaimed before a new allocation.
#[test]
fn expired_tentative_is_reclaimed() {
    let params = SecurityParams::classic();
    let mut node = make_node(1, params, [0xDD; 16]);
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let hello = frame::encode_hello(&[1, 2, 3, 4, 5, 6, 7, 8], 50);

    node.apkes
        .on_hello(&mut node.table, 0, addr(5), &hello, &mut node.prng, &mut rng)
        .unwrap();
    let expiry = node.table.get(addr(5)).unwrap().expiration;
    assert_eq!(node.table.len(), 1);

    node.table.remove_expired_tentatives(expiry);
    assert!(node.table.get(addr(5)).is_none(), "expired slot must be reclaimed");
}

/// I1: local_index is densely packed, filling gaps before appending.
#[test]
fn local_index_fills_gaps() {
    let params = SecurityParams::classic();
    let mut node = make_node(1, params, [0xEE; 16]);
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);

    for n in 10..14u8 {
        let hello = frame::encode_hello(&[0; 8], n as u16);
        node.apkes
            .on_hello(&mut node.table, 0, addr(n), &hello, &mut node.prng, &mut rng)
            .unwrap();
    }
    let indices: Vec<u8> = node.table.iter().map(|r| r.local_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    node.table.remove(addr(11)); // drop the record at local_index 1
    let hello = frame::encode_hello(&[0; 8], 99);
    node.apkes
        .on_hello(&mut node.table, 0, addr(99), &hello, &mut node.prng, &mut rng)
        .unwrap();
    let indices: Vec<u8> = node.table.iter().map(|r| r.local_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3], "new neighbor must reuse the freed index 1");
}

/// Scenario 2: replay of a unicast frame counter is rejected.
#[test]
fn replay_is_rejected() {
    let mut info = apkes_core::replay::AntiReplayInfo::default();
    assert!(!info.was_replayed(5));
    assert!(info.was_replayed(5), "same counter must be rejected as replay");
    assert!(info.was_replayed(3), "lower counter must be rejected as replay");
    assert!(!info.was_replayed(6));
}

/// Scenario 3: EBEAP broadcast — announce + verify round-trip across a
/// gapped local_index table, and R2 (duplicate ANNOUNCE is a no-op).
#[test]
fn ebeap_broadcast_round_trip_with_gap() {
    let params = SecurityParams::classic();
    let mut ccm = SoftwareCcm::default();
    let sender_addr = addr(1);

    let mut table = NeighborTable::new(params.neighbor_max, params.max_tentative_neighbors);
    // Populate three PERMANENT neighbors at local_index 0, 1, 3 (2 is a gap)
    // by inserting four and removing the third.
    for (n, key_byte) in [(10u8, 1u8), (11, 2), (12, 3), (13, 4)] {
        table
            .insert(0, false, |local_index| apkes_core::neighbor::record::NeighborRecord {
                extended_addr: addr(n),
                short_addr: ShortAddr(n as u16),
                local_index,
                status: NeighborStatus::Permanent,
                foreign_index: 1,
                anti_replay: Default::default(),
                expiration: 0,
                payload: apkes_core::neighbor::record::NeighborPayload::Keyed {
                    pairwise_key: vec![key_byte; 16],
                    broadcast_key: None,
                },
            })
            .unwrap();
    }
    table.remove(addr(12)); // frees local_index 2, leaving 0,1,3

    let frame_bytes = b"hello-data-frame".to_vec();
    let announce = ebeap::build_announce(
        &table,
        &mut ccm,
        sender_addr,
        &frame_bytes,
        params.broadcast_mic_len as usize,
    )
    .expect("at least one PERMANENT neighbor");

    assert_eq!(
        announce.len(),
        2 + 4 * params.broadcast_mic_len as usize,
        "payload covers indices 0..=3 even though index 2 is a gap"
    );

    // Neighbor B (foreign_index = 1 on A's table, per the test fixture)
    // extracts MIC[1] and stores it.
    let mut ring = StoredMicRing::new(params.max_buffered_mics as usize);
    ebeap::on_announce(&mut ring, &announce, 1, params.broadcast_mic_len as usize).unwrap();
    assert_eq!(ring.len(), 1);

    // Re-deliver the identical ANNOUNCE: must be a no-op (R2).
    ebeap::on_announce(&mut ring, &announce, 1, params.broadcast_mic_len as usize).unwrap();
    assert_eq!(ring.len(), 1, "duplicate ANNOUNCE must not grow the ring");

    // B verifies the broadcast data frame using the pairwise key A used for
    // local_index 1 (key_byte = 2 in the fixture above).
    ccm.set_key(&[2u8; 16]);
    let ok = ebeap::verify_broadcast(
        &ring,
        &mut ccm,
        sender_addr,
        &[2u8; 16],
        &frame_bytes,
        params.broadcast_mic_len as usize,
    );
    assert!(ok, "MIC at foreign_index 1 must verify against the matching pairwise key");
}

/// EBEAP receive: an out-of-bounds foreign_index is rejected, not panicked.
#[test]
fn ebeap_announce_out_of_bounds_is_rejected() {
    let params = SecurityParams::classic();
    let mut ring = StoredMicRing::new(params.max_buffered_mics as usize);
    let short_announce = vec![frame::COMMAND_ANNOUNCE, 0x00, 1, 2, 3, 4];
    let err = ebeap::on_announce(&mut ring, &short_announce, 5, params.broadcast_mic_len as usize)
        .unwrap_err();
    assert_eq!(err, CoreError::OutOfBounds);
}

/// Scenario 5: Trickle doubles while acquisitions stay below K, then holds.
#[test]
fn trickle_doubles_then_holds() {
    let params = SecurityParams::classic();
    let mut trickle = apkes_core::trickle::Trickle::new(&params);
    trickle.start();

    trickle.on_interval_expired(0); // 0 acquisitions this interval -> double
    assert_eq!(trickle.doublings(), 1);

    trickle.on_new_neighbor();
    trickle.on_new_neighbor();
    trickle.on_new_neighbor(); // 3 acquisitions >= K=2 -> keep
    trickle.on_interval_expired(0);
    assert_eq!(trickle.doublings(), 1, "doublings must be held, not incremented, once >= K");
}

/// Scenario 6: the bootstrap callback condition fires at most once.
#[test]
fn bootstrap_fires_at_most_once() {
    let params = SecurityParams::classic();
    let mut trickle = apkes_core::trickle::Trickle::new(&params);
    trickle.start();
    assert!(!trickle.is_bootstrapped());

    trickle.on_new_neighbor();
    trickle.on_interval_expired(0);
    assert!(trickle.is_bootstrapped());

    trickle.on_new_neighbor();
    trickle.on_interval_expired(0);
    assert!(trickle.is_bootstrapped(), "stays true, callback does not re-fire");
}

/// LEAP key erasure halts new handshakes without disturbing existing state.
#[test]
fn leap_erasure_disables_new_secrets() {
    let mut scheme = LeapScheme::new(MASTER_KEY, addr(1), Box::new(SoftwareAes::default()));
    assert!(scheme.secret_with_hello_sender(addr(2)).is_some());
    scheme.erase();
    assert!(scheme.erased());
    assert!(scheme.secret_with_hello_sender(addr(2)).is_none());
    assert!(scheme.secret_with_helloack_sender(addr(2)).is_none());
}
