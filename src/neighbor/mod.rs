//! Neighbor Table (C1): dense, bounded, ordered-by-`local_index` storage.
//!
//! Grounded in `neighbor.c`'s `add()`/`neighbor_new()`/`remove_expired_tentatives()`.
//! The teacher's bounded-collection idiom (`net/peer.rs`'s `BoundedInvSet`,
//! `net/verified_peers.rs`'s bounded `HashMap` with eviction) is followed
//! here in spirit: a capacity fixed at construction, enforced on every
//! insert, with an explicit sweep-before-allocate step rather than silent
//! eviction (TENTATIVE records are not evicted early; I5 requires only
//! expired ones to be reclaimed).

pub mod record;

use crate::addr::{ClockSeconds, ExtAddr};
use crate::error::{CoreError, Result};
use record::{NeighborRecord, NeighborStatus};

pub struct NeighborTable {
    /// Kept sorted ascending by `local_index` at all times (I1).
    records: Vec<NeighborRecord>,
    neighbor_max: u8,
    max_tentative: u8,
}

impl NeighborTable {
    pub fn new(neighbor_max: u8, max_tentative: u8) -> Self {
        Self {
            records: Vec::new(),
            neighbor_max,
            max_tentative,
        }
    }

    pub fn head(&self) -> Option<&NeighborRecord> {
        self.records.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NeighborRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tentative_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == NeighborStatus::Tentative)
            .count()
    }

    /// `neighbor.c`'s `get()`: first match by extended address.
    pub fn get(&self, addr: ExtAddr) -> Option<&NeighborRecord> {
        self.records.iter().find(|r| r.extended_addr == addr)
    }

    pub fn get_mut(&mut self, addr: ExtAddr) -> Option<&mut NeighborRecord> {
        self.records.iter_mut().find(|r| r.extended_addr == addr)
    }

    pub fn get_by_local_index(&self, local_index: u8) -> Option<&NeighborRecord> {
        self.records.iter().find(|r| r.local_index == local_index)
    }

    /// Reclaims every TENTATIVE record whose expiration has lapsed (I5).
    pub fn remove_expired_tentatives(&mut self, now: ClockSeconds) {
        self.records.retain(|r| !r.is_tentative_expired(now));
    }

    /// Sweeps expired TENTATIVE records, then reserves the smallest unused
    /// local_index and inserts `build(local_index)`'s result in sorted
    /// position. Fails with `TableFull` if the table is saturated, or with
    /// `TableFull` if `tentative` and the tentative-slot slab is full (I4).
    pub fn insert(
        &mut self,
        now: ClockSeconds,
        tentative: bool,
        build: impl FnOnce(u8) -> NeighborRecord,
    ) -> Result<&NeighborRecord> {
        self.remove_expired_tentatives(now);

        if tentative && self.tentative_count() >= self.max_tentative as usize {
            return Err(CoreError::TableFull);
        }
        if self.records.len() >= self.neighbor_max as usize {
            return Err(CoreError::TableFull);
        }

        let local_index = self.smallest_unused_index();
        let record = build(local_index);
        let pos = self
            .records
            .iter()
            .position(|r| r.local_index > local_index)
            .unwrap_or(self.records.len());
        self.records.insert(pos, record);
        Ok(&self.records[pos])
    }

    /// `neighbor.c`'s `add()` gap-finding walk: first gap
    /// `next.local_index - current.local_index > 1`, else append after tail.
    fn smallest_unused_index(&self) -> u8 {
        if self.records.is_empty() {
            return 0;
        }
        if self.records[0].local_index > 0 {
            return 0;
        }
        for w in self.records.windows(2) {
            if w[1].local_index - w[0].local_index > 1 {
                return w[0].local_index + 1;
            }
        }
        self.records.last().unwrap().local_index + 1
    }

    /// `neighbor.c`'s `neighbor_update()`: promote to PERMANENT, reset
    /// anti-replay, set `foreign_index`, and (when enabled) adopt the peer's
    /// broadcast key. `pairwise_key` is supplied by the caller since it may
    /// already be present (AWAITING_ACK → PERMANENT) or freshly derived
    /// (HELLOACK → PERMANENT directly).
    pub fn promote(
        &mut self,
        addr: ExtAddr,
        foreign_index: u8,
        pairwise_key: Vec<u8>,
        broadcast_key: Option<Vec<u8>>,
    ) -> Result<()> {
        let record = self.get_mut(addr).ok_or(CoreError::NoNeighbor)?;
        record.status = NeighborStatus::Permanent;
        record.foreign_index = foreign_index;
        record.anti_replay = crate::replay::AntiReplayInfo::default();
        record.payload = record::NeighborPayload::Keyed {
            pairwise_key,
            broadcast_key,
        };
        Ok(())
    }

    pub fn remove(&mut self, addr: ExtAddr) {
        self.records.retain(|r| r.extended_addr != addr);
    }
}
