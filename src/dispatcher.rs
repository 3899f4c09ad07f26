//! Core dispatcher (C5): the single ingress/egress funnel, grounded in
//! `coresec.c`'s `send`/`on_frame_created`/`input`/`get_overhead`.
//!
//! `Core` owns every collaborator and sub-component instance for one node;
//! it is the crate's top-level type, the way the teacher's `Peer` struct in
//! `net/peer.rs` is the hub that owns connection/rate-limit/inventory state
//! for one remote endpoint.

use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::addr::{ClockSeconds, ExtAddr, ShortAddr};
use crate::apkes::{Apkes, HandshakeOutcome};
use crate::collaborators::{BlockCipher, Ccm, KeyStore, MacDriver, Prng};
use crate::config::{self, SecurityParams};
use crate::ebeap::{self, StoredMicRing};
use crate::error::{CoreError, Result};
use crate::frame::{self, SecurityHeader};
use crate::keying::KeyingScheme;
use crate::neighbor::record::NeighborStatus;
use crate::neighbor::NeighborTable;
use crate::replay::FrameCounter;
use crate::trickle::{Trickle, TrickleAction};

/// `LLSEC802154_SECURITY_LEVEL`: authentication only, no encryption.
pub const SECURITY_LEVEL_MIC_ONLY: u8 = 0b001;
/// Level with bit 2 set requests CTR-mode encryption in addition to the MIC.
pub const SECURITY_LEVEL_ENC_BIT: u8 = 1 << 2;

pub enum Destination {
    Broadcast,
    Unicast(ExtAddr),
}

/// A classified inbound frame, handed to [`Core::input`] once the caller has
/// separated command frames from secured DATA frames and located the
/// security header / MIC trailer within them.
pub enum InboundFrame<'a> {
    /// An APKES/EBEAP command frame (HELLO/HELLOACK/ACK/ANNOUNCE); `payload`
    /// starts at the command-id byte.
    Command { id: u8, payload: &'a [u8] },
    /// A secured unicast DATA frame. `security_header` is the raw 5-byte
    /// auxiliary security header; `ciphertext_and_mic` is the payload
    /// (CTR-encrypted if the header's encryption bit is set) with the
    /// trailing CCM*-MIC appended, exactly as [`Core::on_frame_created`]
    /// built it on the sending side.
    UnicastData {
        security_header: &'a [u8],
        ciphertext_and_mic: &'a [u8],
    },
    /// A broadcast DATA frame, already stripped of its MAC sequence number
    /// (zeroed) and frame-pending bit by the caller, per the "sequence-number
    /// zeroing" design note (spec §9 / `ebeap.rs`'s doc comments).
    BroadcastData { frame: &'a [u8] },
}

pub struct Core {
    params: SecurityParams,
    our_addr: ExtAddr,
    our_short_addr: ShortAddr,

    table: NeighborTable,
    mic_ring: StoredMicRing,
    apkes: Apkes,
    trickle: Trickle,
    counter: FrameCounter,
    /// A reschedule delay produced when a Trickle reset fires mid-dispatch
    /// (`apkes_trickle_reset`'s immediate `on_interval_expired` call). The
    /// caller drains this with [`Core::take_pending_reschedule`] after every
    /// `input` call and re-arms its interval timer to it when `Some`.
    pending_reschedule_ms: Option<u32>,

    cipher: Box<dyn BlockCipher>,
    ccm: Box<dyn Ccm>,
    prng: Box<dyn Prng>,
    keying: Box<dyn KeyingScheme>,
    mac: Box<dyn MacDriver>,
}

#[allow(clippy::too_many_arguments)]
impl Core {
    pub fn new(
        params: SecurityParams,
        our_addr: ExtAddr,
        our_short_addr: ShortAddr,
        key_store: &dyn KeyStore,
        cipher: Box<dyn BlockCipher>,
        ccm: Box<dyn Ccm>,
        prng: Box<dyn Prng>,
        keying: Box<dyn KeyingScheme>,
        mac: Box<dyn MacDriver>,
    ) -> Self {
        let trickle = Trickle::new(&params);
        let table = NeighborTable::new(params.neighbor_max, params.max_tentative_neighbors);
        let mic_ring = StoredMicRing::new(params.max_buffered_mics as usize);
        let apkes = Apkes::new(params, our_addr, our_short_addr);
        let counter = FrameCounter::new_from_store(key_store, config::FRAME_COUNTER_STORE_OFFSET);
        Self {
            params,
            our_addr,
            our_short_addr,
            table,
            mic_ring,
            apkes,
            trickle,
            counter,
            pending_reschedule_ms: None,
            cipher,
            ccm,
            prng,
            keying,
            mac,
        }
    }

    /// `get_overhead`: 5 bytes (security header), plus `UNICAST_MIC` for
    /// unicast frames.
    pub fn get_overhead(&self, dest: Destination) -> usize {
        SecurityHeader::LEN
            + match dest {
                Destination::Broadcast => 0,
                Destination::Unicast(_) => self.params.unicast_mic_len as usize,
            }
    }

    /// `bootstrap`: initialises EBEAP's broadcast key and kicks off Trickle.
    /// Returns the first HELLO payload to transmit and the delay (ms) until
    /// the next timer callback is due.
    pub fn bootstrap(&mut self) -> (Vec<u8>, u32) {
        self.apkes.init_broadcast_key(self.prng.as_mut());
        match self.trickle.start() {
            TrickleAction::BroadcastHello { next_delay_ms } => {
                let payload = self.apkes.broadcast_hello(self.prng.as_mut());
                debug!("bootstrap: broadcasting first HELLO");
                (payload, next_delay_ms)
            }
            TrickleAction::IntervalExpired { .. } => unreachable!("start() always broadcasts"),
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.trickle.is_bootstrapped()
    }

    /// Call when the Trickle interval timer fires (not the HELLO-emission
    /// sub-timer). `jitter_ms` must be a fresh random value in `[0, I/2)`.
    pub fn on_trickle_interval_expired(&mut self, jitter_ms: u32) -> u32 {
        match self.trickle.on_interval_expired(jitter_ms) {
            TrickleAction::IntervalExpired { next_delay_ms } => next_delay_ms,
            TrickleAction::BroadcastHello { .. } => unreachable!(),
        }
    }

    /// Call when the HELLO sub-timer fires.
    pub fn on_trickle_hello_due(&mut self) -> (Vec<u8>, u32) {
        let payload = self.apkes.broadcast_hello(self.prng.as_mut());
        match self.trickle.broadcast_hello(0) {
            TrickleAction::BroadcastHello { next_delay_ms } => (payload, next_delay_ms),
            TrickleAction::IntervalExpired { .. } => unreachable!(),
        }
    }

    /// Drains a pending Trickle reschedule triggered by a just-processed
    /// acquisition (see [`Core::pending_reschedule_ms`]). `Some(delay)` means
    /// the caller must cancel its current interval timer and re-arm it for
    /// `delay` milliseconds from now.
    pub fn take_pending_reschedule(&mut self) -> Option<u32> {
        self.pending_reschedule_ms.take()
    }

    /// Registers a completed handshake with Trickle (`apkes_trickle_on_new_neighbor`).
    /// When that pushes the acquisition count past the reset threshold,
    /// Trickle resets its interval and this immediately recomputes the next
    /// delay (`apkes_trickle_reset`'s direct call into `on_interval_expired`),
    /// stashing it for the caller to pick up via `take_pending_reschedule`.
    fn register_new_neighbor(&mut self) {
        if self.trickle.on_new_neighbor() {
            let jitter = rand::thread_rng().next_u32();
            match self.trickle.on_interval_expired(jitter) {
                TrickleAction::IntervalExpired { next_delay_ms } => {
                    self.pending_reschedule_ms = Some(next_delay_ms);
                }
                TrickleAction::BroadcastHello { .. } => unreachable!(),
            }
        }
    }

    fn security_level(&self) -> u8 {
        let mut level = SECURITY_LEVEL_MIC_ONLY;
        if self.params.broadcast_encryption_enabled() {
            level |= SECURITY_LEVEL_ENC_BIT;
        }
        level
    }

    /// `send`: prepares an outbound DATA frame.
    ///
    /// For broadcast, builds and transmits the ANNOUNCE command, then
    /// transmits `frame_without_security` itself (optionally CTR-encrypted
    /// under this node's own EBEAP broadcast key) — both steps happen here
    /// since EBEAP has no deferred `on_frame_created` stage of its own.
    ///
    /// For unicast, returns the security header to prepend; the MIC (and any
    /// CTR encryption) is added by [`Core::on_frame_created`] once the MAC
    /// header exists.
    pub fn send(&mut self, dest: Destination, frame_without_security: &[u8]) -> Result<Vec<u8>> {
        match dest {
            Destination::Broadcast => {
                let announce = ebeap::build_announce(
                    &self.table,
                    self.ccm.as_mut(),
                    self.our_addr,
                    frame_without_security,
                    self.params.broadcast_mic_len as usize,
                )
                .ok_or(CoreError::NoNeighbor)?;
                self.mac
                    .transmit(None, &announce)
                    .map_err(|_| CoreError::Tx)?;

                let mut frame = frame_without_security.to_vec();
                if let Some(bk) = self.apkes.our_broadcast_key() {
                    self.ccm.set_key(bk);
                    self.ccm.ctr(&self.our_addr.0, &mut frame);
                }
                self.mac.transmit(None, &frame).map_err(|_| CoreError::Tx)?;
                Ok(Vec::new())
            }
            Destination::Unicast(peer) => {
                if self.table.get(peer).is_none() {
                    return Err(CoreError::NoNeighbor);
                }
                let header = SecurityHeader {
                    security_level: self.security_level(),
                    key_id_mode: 0,
                    frame_counter: self.counter.next(),
                };
                Ok(header.encode().to_vec())
            }
        }
    }

    /// `on_frame_created`: appends the MIC (and, when the security level
    /// requests it, CTR-encrypts the plaintext first) to a unicast data
    /// frame once its MAC header is finalised.
    pub fn on_frame_created(&mut self, dest: ExtAddr, header_and_payload: &mut Vec<u8>) -> Result<()> {
        let record = self.table.get(dest).ok_or(CoreError::NoNeighbor)?;
        let key = record.pairwise_key().ok_or(CoreError::NoSecret)?.to_vec();
        self.ccm.set_key(&key);

        let mut mic = vec![0u8; self.params.unicast_mic_len as usize];
        self.ccm.mic(&self.our_addr.0, header_and_payload, &mut mic);

        if self.security_level() & SECURITY_LEVEL_ENC_BIT != 0 {
            self.ccm.ctr(&self.our_addr.0, header_and_payload);
        }

        header_and_payload.extend_from_slice(&mic);
        Ok(())
    }

    /// `input`: classify and dispatch one inbound frame.
    pub fn input(
        &mut self,
        now: ClockSeconds,
        sender_addr: ExtAddr,
        key_source_short_addr: Option<u16>,
        frame: InboundFrame,
    ) -> Result<Option<Vec<u8>>> {
        if sender_addr == self.our_addr {
            return Err(CoreError::SelfSender);
        }

        match frame {
            InboundFrame::Command { id, payload } => {
                self.dispatch_command(now, sender_addr, key_source_short_addr, id, payload)
            }
            InboundFrame::UnicastData {
                security_header,
                ciphertext_and_mic,
            } => self.input_unicast_data(sender_addr, security_header, ciphertext_and_mic),
            InboundFrame::BroadcastData { frame } => self.input_broadcast_data(sender_addr, frame),
        }
    }

    /// Verifies a secured unicast DATA frame: decodes the security header,
    /// checks the security level, recomputes the CCM*-MIC under the sender's
    /// pairwise key (CTR-decrypting first if the header requests it), and
    /// rejects a replayed frame counter (spec §1/§4.5, P2, R1, scenario 2).
    fn input_unicast_data(
        &mut self,
        sender_addr: ExtAddr,
        security_header: &[u8],
        ciphertext_and_mic: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        if !self.is_bootstrapped() {
            return Err(CoreError::NotBootstrapped);
        }

        let security = SecurityHeader::decode(security_header)?;
        if security.security_level != self.security_level() {
            return Err(CoreError::BadSecurityLevel);
        }

        let mic_len = self.params.unicast_mic_len as usize;
        if ciphertext_and_mic.len() < mic_len {
            return Err(CoreError::OutOfBounds);
        }
        let (ciphertext, mic) = ciphertext_and_mic.split_at(ciphertext_and_mic.len() - mic_len);

        let record = self.table.get(sender_addr).ok_or(CoreError::NoNeighbor)?;
        if record.status != NeighborStatus::Permanent {
            return Err(CoreError::NoNeighbor);
        }
        let key = record.pairwise_key().ok_or(CoreError::NoSecret)?.to_vec();

        let mut plaintext = ciphertext.to_vec();
        self.ccm.set_key(&key);
        if security.security_level & SECURITY_LEVEL_ENC_BIT != 0 {
            self.ccm.ctr(&sender_addr.0, &mut plaintext);
        }
        let mut expected_mic = vec![0u8; mic_len];
        self.ccm.mic(&sender_addr.0, &plaintext, &mut expected_mic);
        if expected_mic != mic {
            return Err(CoreError::MicMismatch);
        }

        let record = self.table.get_mut(sender_addr).ok_or(CoreError::NoNeighbor)?;
        if record.anti_replay.was_replayed(security.frame_counter) {
            return Err(CoreError::Replayed);
        }

        trace!(?sender_addr, "unicast data frame verified");
        Ok(Some(plaintext))
    }

    /// Verifies a broadcast DATA frame against EBEAP's stored-MIC ring
    /// (CTR-decrypting first under the sender's broadcast key, if any is on
    /// record for them).
    fn input_broadcast_data(&mut self, sender_addr: ExtAddr, frame: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.is_bootstrapped() {
            return Err(CoreError::NotBootstrapped);
        }
        let record = self.table.get(sender_addr).ok_or(CoreError::NoNeighbor)?;
        if record.status != NeighborStatus::Permanent {
            return Err(CoreError::NoNeighbor);
        }
        let pairwise_key = record.pairwise_key().ok_or(CoreError::NoSecret)?.to_vec();
        let broadcast_key = record.broadcast_key().map(|k| k.to_vec());

        let mut plaintext = frame.to_vec();
        if let Some(bk) = &broadcast_key {
            self.ccm.set_key(bk);
            self.ccm.ctr(&sender_addr.0, &mut plaintext);
        }

        let ok = ebeap::verify_broadcast(
            &self.mic_ring,
            self.ccm.as_mut(),
            sender_addr,
            &pairwise_key,
            &plaintext,
            self.params.broadcast_mic_len as usize,
        );
        if !ok {
            warn!(?sender_addr, "broadcast MIC did not verify");
            return Err(CoreError::MicMismatch);
        }
        Ok(Some(plaintext))
    }

    fn dispatch_command(
        &mut self,
        now: ClockSeconds,
        sender_addr: ExtAddr,
        key_source_short_addr: Option<u16>,
        command_id: u8,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        match command_id {
            frame::COMMAND_ANNOUNCE => {
                let record = self.table.get(sender_addr).ok_or(CoreError::NoNeighbor)?;
                if record.status != NeighborStatus::Permanent {
                    return Ok(None);
                }
                let foreign_index = record.foreign_index;
                ebeap::on_announce(
                    &mut self.mic_ring,
                    payload,
                    foreign_index,
                    self.params.broadcast_mic_len as usize,
                )?;
                Ok(None)
            }
            frame::COMMAND_HELLO => {
                match self.apkes.on_hello(
                    &mut self.table,
                    now,
                    sender_addr,
                    payload,
                    self.prng.as_mut(),
                    &mut rand::thread_rng(),
                )? {
                    Some(_waiting_period_ms) => {
                        debug!(?sender_addr, "HELLO accepted, TENTATIVE slot allocated");
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
            frame::COMMAND_HELLOACK => {
                match self.apkes.on_helloack(
                    &mut self.table,
                    now,
                    self.keying.as_mut(),
                    self.cipher.as_mut(),
                    self.ccm.as_mut(),
                    sender_addr,
                    key_source_short_addr,
                    payload,
                )? {
                    HandshakeOutcome::SendAck {
                        payload, new_neighbor, ..
                    } => {
                        if new_neighbor {
                            self.register_new_neighbor();
                        }
                        self.mac
                            .transmit(None, &payload)
                            .map_err(|_| CoreError::Tx)?;
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            frame::COMMAND_ACK => {
                match self
                    .apkes
                    .on_ack(&mut self.table, self.ccm.as_mut(), sender_addr, payload)?
                {
                    HandshakeOutcome::Promoted => {
                        warn!(?sender_addr, "neighbor promoted to PERMANENT via ACK");
                        self.register_new_neighbor();
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// Emits the HELLOACK for a neighbor whose waiting period has expired.
    pub fn on_waiting_period_expired(&mut self, sender_addr: ExtAddr) -> Result<()> {
        match self.apkes.on_waiting_period_expired(
            &mut self.table,
            self.keying.as_mut(),
            self.cipher.as_mut(),
            self.ccm.as_mut(),
            sender_addr,
        )? {
            HandshakeOutcome::SendHelloAck { payload, .. } => {
                self.mac
                    .transmit(None, &payload)
                    .map_err(|_| CoreError::Tx)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn table(&self) -> &NeighborTable {
        &self.table
    }

    pub fn mic_ring(&self) -> &StoredMicRing {
        &self.mic_ring
    }
}
