//! Blink modes and their cyclic order.
//!
//! ```text
//!  Off ──▶ Slow ──▶ Medium ──▶ Fast ──▶ VeryFast ──▶ SteadyOn ──┐
//!   ▲        1000ms    500ms    200ms     100ms                 │
//!   └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The four timed modes blink with a symmetric square wave whose
//! half-period is given by [`BlinkMode::half_period`].  `Off` and
//! `SteadyOn` hold the LED at a fixed level and leave the timer disarmed.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of modes in one cycle.
pub const MODE_COUNT: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlinkMode {
    #[default]
    Off = 0,
    Slow = 1,
    Medium = 2,
    Fast = 3,
    VeryFast = 4,
    SteadyOn = 5,
}

impl BlinkMode {
    pub const ALL: [Self; MODE_COUNT as usize] = [
        Self::Off,
        Self::Slow,
        Self::Medium,
        Self::Fast,
        Self::VeryFast,
        Self::SteadyOn,
    ];

    /// Position in the cycle (0..6).
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Mode at cycle position `index % 6`.
    pub const fn from_index(index: u8) -> Self {
        Self::ALL[(index % MODE_COUNT) as usize]
    }

    /// The mode one button press later.
    pub const fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    /// Mode reached after `presses` transitions from `self`.
    pub fn advanced_by(self, presses: usize) -> Self {
        let steps = (presses % MODE_COUNT as usize) as u8;
        Self::from_index(self.index() + steps)
    }

    /// Half-period of the square wave, or `None` for the fixed-level modes.
    pub const fn half_period(self) -> Option<Duration> {
        match self {
            Self::Slow => Some(Duration::from_millis(1000)),
            Self::Medium => Some(Duration::from_millis(500)),
            Self::Fast => Some(Duration::from_millis(200)),
            Self::VeryFast => Some(Duration::from_millis(100)),
            Self::Off | Self::SteadyOn => None,
        }
    }

    /// LED level forced on entry, for the fixed-level modes.
    pub const fn fixed_level(self) -> Option<bool> {
        match self {
            Self::Off => Some(false),
            Self::SteadyOn => Some(true),
            _ => None,
        }
    }

    /// Whether the periodic timer drives the LED in this mode.
    pub const fn is_timed(self) -> bool {
        self.half_period().is_some()
    }
}

impl fmt::Display for BlinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.half_period() {
            Some(p) => write!(f, "{:?}({}ms)", self, p.as_millis()),
            None => write!(f, "{:?}", self),
        }
    }
}
