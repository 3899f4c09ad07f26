//! Trickle-driven bootstrap scheduler (C4, Trickle half), grounded directly
//! in `apkes-trickle.c`. The caller owns the actual timer; this type only
//! tracks the algorithm's state and tells the caller when to fire next and
//! what to do (`TrickleAction`), the way the teacher's `cooldown.rs`
//! separates its `AdaptiveCooldown` calculator from the surrounding
//! scheduling loop.

use crate::config::SecurityParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickleAction {
    /// Broadcast a HELLO now, then wait `next_delay_ms` before the interval
    /// is reconsidered.
    BroadcastHello { next_delay_ms: u32 },
    /// The interval elapsed: possibly doubled or kept, bootstrap callback
    /// may have fired, now wait `next_delay_ms` before the next HELLO.
    IntervalExpired { next_delay_ms: u32 },
}

pub struct Trickle {
    imin_ms: u32,
    imax: u8,
    keep_threshold: u8,
    reset_threshold: u8,
    max_waiting_period_ms: u32,
    ack_delay_ms: u32,
    doublings: u8,
    new_neighbors_count: u8,
    bootstrapped: bool,
    on_bootstrapped_pending: bool,
    interval_elapsed_since_set: bool,
}

impl Trickle {
    pub fn new(params: &SecurityParams) -> Self {
        Self {
            imin_ms: params.imin_secs * 1000,
            imax: params.imax,
            keep_threshold: params.keep_threshold,
            reset_threshold: params.reset_threshold,
            max_waiting_period_ms: params.max_waiting_period_ms,
            ack_delay_ms: params.ack_delay_ms,
            doublings: 0,
            new_neighbors_count: 0,
            bootstrapped: false,
            on_bootstrapped_pending: false,
            interval_elapsed_since_set: true,
        }
    }

    fn interval_size_ms(&self) -> u32 {
        self.imin_ms << self.doublings
    }

    /// `round_up`: the interval tail must be long enough for a full
    /// HELLO/HELLOACK/ACK cycle.
    fn round_up(&self, i_minus_t: u32) -> u32 {
        let min = self.max_waiting_period_ms + self.ack_delay_ms;
        i_minus_t.max(min)
    }

    /// Call once to start bootstrapping: registers interest in the
    /// bootstrap callback and returns the first `BroadcastHello` action.
    pub fn start(&mut self) -> TrickleAction {
        self.on_bootstrapped_pending = true;
        self.broadcast_hello(0)
    }

    /// `broadcast_hello`: call when the caller actually sends the HELLO
    /// (Rule 4 of Trickle); `elapsed_ms` is how long the current timer had
    /// already run before being fired early, if any (normally 0 at `start`).
    pub fn broadcast_hello(&mut self, elapsed_ms: u32) -> TrickleAction {
        let next = self.round_up(self.interval_size_ms().saturating_sub(elapsed_ms));
        TrickleAction::BroadcastHello {
            next_delay_ms: next,
        }
    }

    /// `on_interval_expired` (Rule 6 of Trickle): doubles or keeps the
    /// interval, runs the bootstrap check, resets the acquisition counter,
    /// and schedules `half + random(half)` until the next HELLO — the
    /// random component is supplied by the caller via `jitter_ms` (expected
    /// to already be in `[0, half)`), since this type does not own a PRNG.
    pub fn on_interval_expired(&mut self, jitter_ms: u32) -> TrickleAction {
        if self.doublings < self.imax && self.new_neighbors_count < self.keep_threshold {
            self.doublings += 1;
        }
        self.maybe_bootstrap();
        let half = self.interval_size_ms() / 2;
        self.new_neighbors_count = 0;
        self.interval_elapsed_since_set = true;
        TrickleAction::IntervalExpired {
            next_delay_ms: half + jitter_ms.min(half.max(1) - 1),
        }
    }

    /// `apkes_trickle_on_new_neighbor`: call on every PERMANENT promotion.
    /// Returns `true` if this triggered a reset (caller should immediately
    /// fire its interval-expiry path since `reset()` restarts the interval).
    pub fn on_new_neighbor(&mut self) -> bool {
        self.new_neighbors_count = self.new_neighbors_count.saturating_add(1);
        let hit_reset = self.new_neighbors_count >= self.reset_threshold;
        if hit_reset {
            self.reset();
        }
        self.maybe_bootstrap();
        hit_reset
    }

    /// `apkes_trickle_reset`: sets `doublings = keep_threshold` and restarts
    /// the interval immediately. The caller must follow this with an
    /// immediate `on_interval_expired(0)` to actually reschedule, mirroring
    /// `apkes_trickle_reset`'s direct call into `on_interval_expired(NULL)`.
    pub fn reset(&mut self) {
        self.doublings = self.keep_threshold;
    }

    /// Bootstrap fires at most once, and only once an interval has actually
    /// elapsed (not merely started) with at least one acquisition in it.
    fn maybe_bootstrap(&mut self) {
        if self.on_bootstrapped_pending
            && self.interval_elapsed_since_set
            && self.new_neighbors_count > 0
        {
            self.bootstrapped = true;
            self.on_bootstrapped_pending = false;
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn doublings(&self) -> u8 {
        self.doublings
    }
}
