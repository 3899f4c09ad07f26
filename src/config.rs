//! Cipher-length parameters and resource bounds, fixed once at init time.
//!
//! Grounded in spec invariants I2/I3 and the Trickle/timing constants of
//! §4.4/§5; mirrors the teacher's habit (`net/types.rs`) of naming every
//! tunable as a documented constant plus a validated constructor.

use crate::error::CoreError;

/// Default Trickle `Imin`, expressed in whole seconds (`apkes-trickle.c`: `30 * CLOCK_SECOND`).
pub const DEFAULT_IMIN_SECS: u32 = 30;
/// Default Trickle doubling ceiling (`apkes-trickle.c`: `IMAX = 8`).
pub const DEFAULT_IMAX: u8 = 8;
/// Default Trickle keep-threshold (`apkes-trickle.c`: `KEEP_THRESHOLD = 2`).
pub const DEFAULT_KEEP_THRESHOLD: u8 = 2;
/// Default APKES tentative-slot ceiling (`apkes.h`: `APKES_MAX_TENTATIVE_NEIGHBORS`).
pub const DEFAULT_MAX_TENTATIVE_NEIGHBORS: u8 = 5;
/// Default bound on buffered EBEAP MICs (`ebeap.c`: `MAX_BUFFERED_CCM_MICS = 3`).
pub const DEFAULT_MAX_BUFFERED_MICS: u8 = 3;
/// Default maximum waiting period before a HELLOACK is sent, in milliseconds.
pub const DEFAULT_MAX_WAITING_PERIOD_MS: u32 = 2_000;
/// Default delay after a HELLOACK before an ACK must have arrived, in milliseconds.
pub const DEFAULT_ACK_DELAY_MS: u32 = 1_000;
/// Byte offset of the persisted frame counter within a `KeyStore`
/// (`node_id_restore_data`'s layout convention: the counter lives at the
/// start of the page, keying material follows it).
pub const FRAME_COUNTER_STORE_OFFSET: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityParams {
    pub pairwise_key_len: u8,
    pub broadcast_key_len: u8,
    pub unicast_mic_len: u8,
    pub broadcast_mic_len: u8,
    pub neighbor_max: u8,
    pub max_tentative_neighbors: u8,
    pub max_buffered_mics: u8,
    pub imin_secs: u32,
    pub imax: u8,
    pub keep_threshold: u8,
    pub reset_threshold: u8,
    pub max_waiting_period_ms: u32,
    pub ack_delay_ms: u32,
}

impl SecurityParams {
    /// Validates I2/I3 and derives `neighbor_max`/`broadcast_mic_len`/`reset_threshold`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pairwise_key_len: u8,
        broadcast_key_len: u8,
        unicast_mic_len: u8,
        max_tentative_neighbors: u8,
    ) -> Result<Self, CoreError> {
        if !matches!(pairwise_key_len, 10 | 12 | 16) {
            return Err(CoreError::BadParams);
        }
        if !matches!(broadcast_key_len, 0 | 8 | 12) {
            return Err(CoreError::BadParams);
        }
        if !matches!(unicast_mic_len, 4 | 6 | 8) {
            return Err(CoreError::BadParams);
        }
        let broadcast_mic_len = unicast_mic_len + 1;
        // NEIGHBOR_MAX = floor((127 - 19) / BROADCAST_MIC), spec I3.
        let neighbor_max = (127u32 - 19) / broadcast_mic_len as u32;
        let neighbor_max = neighbor_max.min(u8::MAX as u32) as u8;
        if neighbor_max == 0 || max_tentative_neighbors == 0 {
            return Err(CoreError::BadParams);
        }
        Ok(Self {
            pairwise_key_len,
            broadcast_key_len,
            unicast_mic_len,
            broadcast_mic_len,
            neighbor_max,
            max_tentative_neighbors,
            max_buffered_mics: DEFAULT_MAX_BUFFERED_MICS,
            imin_secs: DEFAULT_IMIN_SECS,
            imax: DEFAULT_IMAX,
            keep_threshold: DEFAULT_KEEP_THRESHOLD,
            reset_threshold: max_tentative_neighbors,
            max_waiting_period_ms: DEFAULT_MAX_WAITING_PERIOD_MS,
            ack_delay_ms: DEFAULT_ACK_DELAY_MS,
        })
    }

    /// Unicast-only MIC=4, no broadcast encryption; the common low-power default.
    pub fn classic() -> Self {
        Self::new(16, 0, 4, DEFAULT_MAX_TENTATIVE_NEIGHBORS).expect("built-in params are valid")
    }

    /// Broadcast encryption enabled (`EBEAP_WITH_ENCRYPTION`), MIC=8.
    pub fn with_broadcast_encryption() -> Self {
        Self::new(16, 12, 8, DEFAULT_MAX_TENTATIVE_NEIGHBORS).expect("built-in params are valid")
    }

    pub fn challenge_len(&self) -> u8 {
        self.pairwise_key_len / 2
    }

    pub fn broadcast_encryption_enabled(&self) -> bool {
        self.broadcast_key_len > 0
    }
}
