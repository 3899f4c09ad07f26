//! EBEAP (C3): broadcast authentication by per-recipient MIC vector.
//!
//! Grounded directly in `ebeap.c`: `prepare_announce`, `ebeap_on_announce`,
//! `ebeap_decrypt_verify_broadcast`. The stored-MIC ring is a bounded FIFO
//! (`MEMB`+`LIST` in the original), modelled here as a `VecDeque` capped at
//! construction, the same bounded-collection idiom as the teacher's
//! `BoundedInvSet` in `net/peer.rs`.

use std::collections::VecDeque;

use crate::addr::ExtAddr;
use crate::collaborators::Ccm;
use crate::error::{CoreError, Result};
use crate::frame::COMMAND_ANNOUNCE;
use crate::neighbor::record::NeighborStatus;
use crate::neighbor::NeighborTable;

pub const ANNOUNCE_RESERVED_BYTE: u8 = 0x00;

/// Bounded FIFO of recently-announced MICs awaiting a matching broadcast
/// data frame (`MAX_BUFFERED_CCM_MICS`).
pub struct StoredMicRing {
    mics: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl StoredMicRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            mics: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, mic: &[u8]) -> bool {
        self.mics.iter().any(|m| m.as_slice() == mic)
    }

    /// Inserts `mic`, evicting the oldest entry if the ring is full.
    /// No-op (but not an error) if `mic` is already present, matching
    /// `ebeap_on_announce`'s duplicate-ANNOUNCE handling (R2).
    pub fn insert(&mut self, mic: Vec<u8>) {
        if self.contains(&mic) {
            return;
        }
        if self.mics.len() >= self.capacity {
            self.mics.pop_front();
        }
        self.mics.push_back(mic);
    }

    pub fn len(&self) -> usize {
        self.mics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mics.is_empty()
    }
}

/// Builds the ANNOUNCE command payload (`0x0D | 0x00 | MIC[0..=max_index]`)
/// by computing, for every PERMANENT neighbor, a CCM*-MIC of `frame` under
/// that neighbor's pairwise key, placed at its `local_index`.
///
/// `frame` must already have its sequence-number byte forced to 0 by the
/// caller (spec §4.3 / the "sequence-number zeroing" design note, §9) before
/// this is invoked — the core dispatcher does so, since only it owns the MAC
/// header layout.
pub fn build_announce(
    table: &NeighborTable,
    ccm: &mut dyn Ccm,
    our_addr: ExtAddr,
    frame: &[u8],
    broadcast_mic_len: usize,
) -> Option<Vec<u8>> {
    let permanents: Vec<_> = table
        .iter()
        .filter(|r| r.status == NeighborStatus::Permanent)
        .collect();
    if permanents.is_empty() {
        return None;
    }
    let max_index = permanents.iter().map(|r| r.local_index).max().unwrap();
    let mut mics = vec![0u8; (max_index as usize + 1) * broadcast_mic_len];
    for r in &permanents {
        let key = r.pairwise_key().expect("PERMANENT implies keyed");
        ccm.set_key(key);
        let off = r.local_index as usize * broadcast_mic_len;
        ccm.mic(&our_addr.0, frame, &mut mics[off..off + broadcast_mic_len]);
    }
    let mut payload = Vec::with_capacity(2 + mics.len());
    payload.push(COMMAND_ANNOUNCE);
    payload.push(ANNOUNCE_RESERVED_BYTE);
    payload.extend_from_slice(&mics);
    Some(payload)
}

/// Processes a received ANNOUNCE: locates the MIC at the sender's
/// `foreign_index` and stores it if new. `sender` must already be resolved
/// to a PERMANENT neighbor record by the dispatcher (non-PERMANENT senders
/// are silently ignored per `ebeap_on_announce`).
pub fn on_announce(
    ring: &mut StoredMicRing,
    payload: &[u8],
    foreign_index: u8,
    broadcast_mic_len: usize,
) -> Result<()> {
    let off = 1 + foreign_index as usize * broadcast_mic_len;
    if off + broadcast_mic_len > payload.len() {
        return Err(CoreError::OutOfBounds);
    }
    let mic = payload[off..off + broadcast_mic_len].to_vec();
    ring.insert(mic);
    Ok(())
}

/// Verifies a received broadcast data frame: `frame` must already have had
/// its sequence-number byte zeroed and frame-pending bit cleared by the
/// caller, and CTR-decrypted if broadcast encryption is enabled.
pub fn verify_broadcast(
    ring: &StoredMicRing,
    ccm: &mut dyn Ccm,
    sender_addr: ExtAddr,
    sender_pairwise_key: &[u8],
    frame: &[u8],
    broadcast_mic_len: usize,
) -> bool {
    let mut mic = vec![0u8; broadcast_mic_len];
    ccm.set_key(sender_pairwise_key);
    ccm.mic(&sender_addr.0, frame, &mut mic);
    ring.contains(&mic)
}
