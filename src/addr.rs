//! Link-layer addressing and process-relative clock.
//!
//! `ExtAddr` mirrors `struct neighbor_ids.extended_addr` (8-byte EUI);
//! `ShortAddr` mirrors the 16-bit address assigned during association.

use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtAddr(pub [u8; 8]);

impl fmt::Debug for ExtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtAddr(")?;
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortAddr(pub u16);

impl ShortAddr {
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(b: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(b))
    }
}

/// Monotonic seconds since an arbitrary epoch, supplied by the embedder.
///
/// The core never reads the wall clock itself (no `std::time` dependency in
/// the protocol logic); callers advance it explicitly, the same way Contiki's
/// `clock_seconds()` is just a tick counter the platform maintains.
pub type ClockSeconds = u32;
