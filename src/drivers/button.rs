//! ISR-side debounce for the push-button line.
//!
//! ## Hardware
//!
//! Momentary switch to 3V3 with a pull-down; the GPIO interrupts on the
//! rising edge.  Contact bounce produces a burst of edges within a few
//! milliseconds of the real press.
//!
//! The interrupt handler timestamps each edge and asks
//! [`EdgeDebouncer::accept`] whether it is far enough from the last accepted
//! one.  The check is a pair of atomic operations, so it is safe in interrupt
//! context and never blocks.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// Sentinel for "no edge accepted yet".
const NEVER: u64 = u64::MAX;

#[derive(Debug)]
pub struct EdgeDebouncer {
    window_us: u64,
    /// Timestamp of the last accepted edge (microseconds since boot).
    /// Written by the ISR only.
    last_accept_us: AtomicU64,
}

impl EdgeDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_us: window.as_micros().min(u128::from(u64::MAX - 1)) as u64,
            last_accept_us: AtomicU64::new(NEVER),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_micros(self.window_us)
    }

    /// Decide whether the edge seen at `now_us` is a real press.
    ///
    /// Call from the line's interrupt handler only (single writer).
    pub fn accept(&self, now_us: u64) -> bool {
        let last = self.last_accept_us.load(Ordering::Acquire);
        if last != NEVER && now_us.wrapping_sub(last) < self.window_us {
            return false;
        }
        self.last_accept_us.store(now_us, Ordering::Release);
        true
    }
}
