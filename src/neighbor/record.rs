//! Per-neighbor state (spec §3). `NeighborPayload` resolves the "tagged
//! neighbor union" design note (§9) as a Rust sum type instead of the
//! original's overlapping C union storage.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::addr::{ClockSeconds, ExtAddr, ShortAddr};
use crate::replay::AntiReplayInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStatus {
    Tentative,
    AwaitingAck,
    Permanent,
}

/// Zeroises on drop (spec §5: "all keys are held in... buffers; zeroise on
/// destruction"), so reclaiming a TENTATIVE slot (`NeighborTable::remove`,
/// the expiry sweep) or replacing a record's payload on promotion wipes the
/// superseded key material instead of leaving it in freed heap memory.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub enum NeighborPayload {
    /// TENTATIVE: challenges exchanged, no key yet.
    Tentative {
        peer_challenge: Vec<u8>,
        our_challenge: Vec<u8>,
    },
    /// AWAITING_ACK or PERMANENT: the derived pairwise key, plus the peer's
    /// broadcast key once learned (only meaningful once PERMANENT).
    Keyed {
        pairwise_key: Vec<u8>,
        broadcast_key: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone)]
pub struct NeighborRecord {
    pub extended_addr: ExtAddr,
    pub short_addr: ShortAddr,
    pub local_index: u8,
    pub status: NeighborStatus,
    /// Valid only once PERMANENT: the local_index the peer uses for us.
    pub foreign_index: u8,
    pub anti_replay: AntiReplayInfo,
    /// Absolute clock-seconds deadline; only meaningful while TENTATIVE.
    pub expiration: ClockSeconds,
    pub payload: NeighborPayload,
}

impl NeighborRecord {
    pub fn is_tentative_expired(&self, now: ClockSeconds) -> bool {
        self.status == NeighborStatus::Tentative && now >= self.expiration
    }

    pub fn pairwise_key(&self) -> Option<&[u8]> {
        match &self.payload {
            NeighborPayload::Keyed { pairwise_key, .. } => Some(pairwise_key),
            NeighborPayload::Tentative { .. } => None,
        }
    }

    pub fn broadcast_key(&self) -> Option<&[u8]> {
        match &self.payload {
            NeighborPayload::Keyed { broadcast_key, .. } => broadcast_key.as_deref(),
            NeighborPayload::Tentative { .. } => None,
        }
    }
}
