//! Outbound application events.
//!
//! The controller and the lifecycle manager emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log to serial, forward to a test channel, etc.

use crate::config::Variant;
use crate::mode::BlinkMode;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlinkEvent {
    /// All resources are held and the variant is live.
    Started(Variant),

    /// A button press moved the blink mode.
    ModeChanged {
        from: BlinkMode,
        to: BlinkMode,
        /// Half-period armed for `to`, if it is a timed mode.
        half_period_ms: Option<u64>,
    },

    /// The LED toggler flipped the LED.
    Toggled { on: bool },

    /// The timer-only blinker's half-period attribute was written.
    PeriodChanged { period_ms: u64 },

    /// Teardown finished; every resource has been released.
    Stopped,
}
