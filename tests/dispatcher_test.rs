//! Integration tests for the `Core` dispatcher: secured unicast DATA frame
//! verification, replay rejection, and broadcast DATA frame verification
//! through a full two-node handshake, driven the way the teacher drives its
//! own integration tests (`tests/net_test.rs`): plain `#[test]` functions
//! against the public surface, no test-only macros.

use std::cell::RefCell;
use std::rc::Rc;

use apkes_core::addr::{ExtAddr, ShortAddr};
use apkes_core::collaborators::software::{SoftwareAes, SoftwareCcm, SoftwareKeyStore, SoftwarePrng};
use apkes_core::collaborators::MacDriver;
use apkes_core::config::SecurityParams;
use apkes_core::dispatcher::{Core, Destination, InboundFrame};
use apkes_core::error::CoreError;
use apkes_core::frame;
use apkes_core::keying::LeapScheme;

const MASTER_KEY: [u8; 16] = [
    0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22, 0x33, 0x33, 0x33, 0x33, 0x44, 0x44, 0x44, 0x44,
];

fn addr(n: u8) -> ExtAddr {
    ExtAddr([0, 0, 0, 0, 0, 0, 0, n])
}

struct CapturingMac {
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MacDriver for CapturingMac {
    fn transmit(&mut self, _dst_short_addr: Option<u16>, frame: &[u8]) -> Result<(), ()> {
        self.sent.borrow_mut().push(frame.to_vec());
        Ok(())
    }
}

fn make_core(id: u8, params: SecurityParams, prng_seed: [u8; 16]) -> (Core, Rc<RefCell<Vec<Vec<u8>>>>) {
    let our_addr = addr(id);
    let key_store = SoftwareKeyStore::new(vec![0u8; 4]);
    let keying = LeapScheme::new(MASTER_KEY, our_addr, Box::new(SoftwareAes::default()));
    let sent = Rc::new(RefCell::new(Vec::new()));
    let core = Core::new(
        params,
        our_addr,
        ShortAddr(id as u16),
        &key_store,
        Box::new(SoftwareAes::default()),
        Box::new(SoftwareCcm::default()),
        Box::new(SoftwarePrng::new(prng_seed)),
        Box::new(keying),
        Box::new(CapturingMac { sent: sent.clone() }),
    );
    (core, sent)
}

/// Drives a full HELLO/HELLOACK/ACK handshake between two bootstrapped
/// `Core` instances and returns them once both sides are PERMANENT.
fn handshake(params: SecurityParams) -> (Core, Rc<RefCell<Vec<Vec<u8>>>>, Core, Rc<RefCell<Vec<Vec<u8>>>>) {
    let (mut a, a_sent) = make_core(1, params, [0xAA; 16]);
    let (mut b, b_sent) = make_core(2, params, [0xBB; 16]);

    let (hello, _) = a.bootstrap();
    b.bootstrap();

    b.input(
        0,
        addr(1),
        None,
        InboundFrame::Command {
            id: frame::COMMAND_HELLO,
            payload: &hello,
        },
    )
    .unwrap();

    b.on_waiting_period_expired(addr(1)).unwrap();
    let helloack = b_sent.borrow_mut().pop().expect("HELLOACK must have been sent");

    a.input(
        0,
        addr(2),
        None,
        InboundFrame::Command {
            id: frame::COMMAND_HELLOACK,
            payload: &helloack,
        },
    )
    .unwrap();
    let ack = a_sent.borrow_mut().pop().expect("ACK must have been sent");
    assert!(a.is_bootstrapped(), "A must bootstrap once it sends the ACK");

    b.input(
        0,
        addr(1),
        None,
        InboundFrame::Command {
            id: frame::COMMAND_ACK,
            payload: &ack,
        },
    )
    .unwrap();
    assert!(b.is_bootstrapped(), "B must bootstrap once it receives the ACK");

    (a, a_sent, b, b_sent)
}

/// A unicast DATA frame built by `send`+`on_frame_created` verifies on the
/// receiving side and is returned with its MIC stripped.
#[test]
fn unicast_data_frame_round_trips_through_core() {
    let params = SecurityParams::classic();
    let (mut a, _a_sent, mut b, _b_sent) = handshake(params);

    let plaintext = b"a real unicast payload".to_vec();
    let mut header_and_payload = a.send(Destination::Unicast(addr(2)), &plaintext).unwrap();
    header_and_payload.extend_from_slice(&plaintext);
    a.on_frame_created(addr(2), &mut header_and_payload).unwrap();

    let (security_header, ciphertext_and_mic) = header_and_payload.split_at(5);
    let received = b
        .input(
            0,
            addr(1),
            None,
            InboundFrame::UnicastData {
                security_header,
                ciphertext_and_mic,
            },
        )
        .unwrap();
    assert_eq!(received, Some(plaintext));
}

/// A replayed unicast frame counter is rejected on redelivery.
#[test]
fn unicast_replay_is_rejected_by_core() {
    let params = SecurityParams::classic();
    let (mut a, _a_sent, mut b, _b_sent) = handshake(params);

    let plaintext = b"only once".to_vec();
    let mut header_and_payload = a.send(Destination::Unicast(addr(2)), &plaintext).unwrap();
    header_and_payload.extend_from_slice(&plaintext);
    a.on_frame_created(addr(2), &mut header_and_payload).unwrap();
    let (security_header, ciphertext_and_mic) = header_and_payload.split_at(5);

    let first = b.input(
        0,
        addr(1),
        None,
        InboundFrame::UnicastData {
            security_header,
            ciphertext_and_mic,
        },
    );
    assert!(first.is_ok());

    let second = b.input(
        0,
        addr(1),
        None,
        InboundFrame::UnicastData {
            security_header,
            ciphertext_and_mic,
        },
    );
    assert_eq!(second.unwrap_err(), CoreError::Replayed);
}

/// A tampered MIC is rejected rather than silently accepted.
#[test]
fn unicast_mic_tamper_is_rejected_by_core() {
    let params = SecurityParams::classic();
    let (mut a, _a_sent, mut b, _b_sent) = handshake(params);

    let plaintext = b"tamper me".to_vec();
    let mut header_and_payload = a.send(Destination::Unicast(addr(2)), &plaintext).unwrap();
    header_and_payload.extend_from_slice(&plaintext);
    a.on_frame_created(addr(2), &mut header_and_payload).unwrap();

    let last = header_and_payload.len() - 1;
    header_and_payload[last] ^= 0xFF;
    let (security_header, ciphertext_and_mic) = header_and_payload.split_at(5);

    let result = b.input(
        0,
        addr(1),
        None,
        InboundFrame::UnicastData {
            security_header,
            ciphertext_and_mic,
        },
    );
    assert_eq!(result.unwrap_err(), CoreError::MicMismatch);
}

/// A broadcast DATA frame announced then sent is CTR-decrypted (encryption
/// enabled) and verified against the announced MIC vector on the other side.
#[test]
fn broadcast_data_round_trips_through_core() {
    let params = SecurityParams::with_broadcast_encryption();
    let (mut a, a_sent, mut b, _b_sent) = handshake(params);

    let frame_bytes = b"broadcast-payload".to_vec();
    a.send(Destination::Broadcast, &frame_bytes).unwrap();

    let mut sent = a_sent.borrow_mut();
    let broadcast_frame = sent.pop().expect("broadcast data frame must have been sent");
    let announce = sent.pop().expect("ANNOUNCE must have been sent first");
    drop(sent);
    assert_eq!(announce[0], frame::COMMAND_ANNOUNCE);

    b.input(
        0,
        addr(1),
        None,
        InboundFrame::Command {
            id: frame::COMMAND_ANNOUNCE,
            payload: &announce,
        },
    )
    .unwrap();

    let received = b
        .input(
            0,
            addr(1),
            None,
            InboundFrame::BroadcastData {
                frame: &broadcast_frame,
            },
        )
        .unwrap();
    assert_eq!(received, Some(frame_bytes));
}
