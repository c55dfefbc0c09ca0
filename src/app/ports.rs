//! Port traits: the hexagonal boundary between the blink logic and the board.
//!
//! ```text
//!   Board adapter ──▶ Port traits ──▶ BlinkController / Blinker (domain)
//! ```
//!
//! The ESP-IDF GPIO/timer drivers and the host simulation board implement
//! these traits.  The domain never touches registers directly.
//!
//! ## Context rules
//!
//! - [`EdgeHandler`]s run in interrupt context: they must not block or
//!   allocate.
//! - [`TimerCallback`]s run in the timer service context.
//! - Everything else runs on the task that owns the value.

use core::time::Duration;
use std::sync::Arc;

use embedded_hal::digital::OutputPin;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::pins::LineId;

/// Interrupt-context callback installed on the button line.
pub type EdgeHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Callback invoked on every periodic timer fire.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

// ───────────────────────────────────────────────────────────────
// Output line (LED)
// ───────────────────────────────────────────────────────────────

/// An acquired LED-class output line.
///
/// Level changes go through the `embedded-hal` [`OutputPin`] methods.
pub trait OutputPort: OutputPin + Send + 'static {
    fn line(&self) -> LineId;

    /// Switch the line to output mode, driving `initial`.
    fn set_direction_output(&mut self, initial: bool) -> Result<()>;

    /// Give the line back to the platform.  Idempotent.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Input line (button)
// ───────────────────────────────────────────────────────────────

/// An acquired button-class input line.
pub trait InputPort: Send + 'static {
    type Subscription: EdgeSubscription;

    fn line(&self) -> LineId;

    /// Switch the line to input mode.
    fn set_direction_input(&mut self) -> Result<()>;

    /// Edges closer than `window` to the previously accepted edge are dropped
    /// before the handler runs.  Applies to subscriptions made afterwards.
    fn configure_debounce(&mut self, window: Duration);

    /// Route the line's rising-edge interrupt to `handler`.
    ///
    /// Fails with `InterruptMappingFailed` when the line has no interrupt
    /// source and with `InterruptRegistrationFailed` when the interrupt is
    /// already taken.
    fn subscribe_rising_edge(&mut self, handler: EdgeHandler) -> Result<Self::Subscription>;

    /// Give the line back to the platform.  Idempotent.
    fn release(&mut self);
}

/// A live rising-edge registration.
pub trait EdgeSubscription: Send + 'static {
    /// Remove the handler.  When this returns, the handler is not running and
    /// will not run again.  Idempotent.
    fn unsubscribe(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Periodic timer
// ───────────────────────────────────────────────────────────────

/// A re-armable monotonic timer bound to one callback.
///
/// Once armed, the callback fires every `period`; each re-arm is measured
/// from the previous deadline, so callback latency does not accumulate.
pub trait PeriodicTimer: Send + 'static {
    /// Start firing every `period`, first fire one `period` from now.
    /// Re-arming an armed timer replaces its program.
    ///
    /// Fails with `TimerArmFailed` when the timer service refuses the alarm;
    /// the timer is left disarmed.
    fn arm(&mut self, period: Duration) -> Result<()>;

    /// Stop firing.  When this returns no callback is running and none will
    /// run until the next [`arm`](Self::arm).  Idempotent.
    ///
    /// Must not be called from the timer's own callback.
    fn cancel(&mut self);

    /// Change the interval used for the next re-arm without touching the
    /// pending deadline.  Not synchronised with an in-flight fire.
    fn set_period(&mut self, period: Duration);

    /// Interval that the next re-arm will use.
    fn period(&self) -> Duration;

    fn is_armed(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Board (line + timer provider)
// ───────────────────────────────────────────────────────────────

/// Acquires lines and creates timers.
///
/// `acquire_*` fail with `InvalidLineIdentifier` for unknown lines and with
/// `ResourceUnavailable` for lines that are already owned.
pub trait Board {
    type Output: OutputPort;
    type Input: InputPort;
    type Timer: PeriodicTimer;

    fn acquire_output(&mut self, line: LineId) -> Result<Self::Output>;

    fn acquire_input(&mut self, line: LineId) -> Result<Self::Input>;

    /// Create a disarmed timer that runs `callback` on every fire.
    fn create_timer(&mut self, name: &'static str, callback: TimerCallback) -> Result<Self::Timer>;

    /// Start the deferred-work worker.  Fails with `DispatcherCreationFailed`.
    fn spawn_dispatcher<S, F>(&mut self, name: &'static str, state: S, body: F) -> Result<Dispatcher<S>>
    where
        S: Send + 'static,
        F: FnMut(&mut S) + Send + 'static,
    {
        Dispatcher::spawn(name, state, body)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`BlinkEvent`](super::events::BlinkEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink: Send {
    fn emit(&mut self, event: &super::events::BlinkEvent);
}
