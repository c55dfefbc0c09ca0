//! Blink controller (the mode state machine) and the LED toggler task.
//!
//! Both run exclusively on the dispatcher worker, so `&mut self` is all the
//! synchronisation the mode needs.  The only cross-context state is the
//! output line (shared with the timer callback) and the [`ModeStatus`] cell
//! that readers on other threads poll.
//!
//! ## Transition
//!
//! ```text
//!  cur ──▶ next = cur.next()
//!   │
//!   ├─ cur timed?   cancel timer (blocks until an in-flight fire returns)
//!   ├─ next fixed?  drive the level (Off → low, SteadyOn → high)
//!   └─ next timed?  arm timer at next's half-period
//!        commit cur = next
//! ```
//!
//! Cancelling before touching the line is what guarantees no stale toggle
//! lands after a direct set.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use log::{debug, error};

use crate::app::events::BlinkEvent;
use crate::app::ports::{EventSink, OutputPort, PeriodicTimer, TimerCallback};
use crate::drivers::output_line::SharedOutput;
use crate::mode::BlinkMode;

/// Work run by the dispatcher worker, one call per accepted edge.
pub trait DeferredTask {
    fn run(&mut self, sink: &mut dyn EventSink);

    /// Quiesce anything the task drives.  Called once, after the dispatcher
    /// has drained.
    fn shutdown(&mut self);
}

/// Lock-free snapshot of the controller, readable from any thread.
#[derive(Debug, Default)]
pub struct ModeStatus {
    mode: AtomicU8,
    transitions: AtomicU32,
}

impl ModeStatus {
    pub fn mode(&self) -> BlinkMode {
        BlinkMode::from_index(self.mode.load(Ordering::Acquire))
    }

    /// Deferred tasks completed so far.
    pub fn transitions(&self) -> u32 {
        self.transitions.load(Ordering::Acquire)
    }

    fn record(&self, mode: BlinkMode) {
        self.mode.store(mode.index(), Ordering::Release);
        self.transitions.fetch_add(1, Ordering::AcqRel);
    }
}

/// What one call to [`BlinkController::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BlinkMode,
    pub to: BlinkMode,
    /// The timer was cancelled because `from` was timed.
    pub cancelled: bool,
    /// Half-period the timer was armed with, for timed `to`.
    pub armed: Option<Duration>,
}

/// Timer callback for the timed modes: flip the LED.
pub fn toggle_on_fire<O: OutputPort>(output: SharedOutput<O>) -> TimerCallback {
    Box::new(move || {
        output.toggle();
    })
}

pub struct BlinkController<O, T> {
    mode: BlinkMode,
    output: SharedOutput<O>,
    timer: T,
    status: Arc<ModeStatus>,
}

impl<O: OutputPort, T: PeriodicTimer> BlinkController<O, T> {
    /// Start in `Off` with the timer disarmed.
    pub fn new(output: SharedOutput<O>, timer: T, status: Arc<ModeStatus>) -> Self {
        status.mode.store(BlinkMode::Off.index(), Ordering::Release);
        Self {
            mode: BlinkMode::Off,
            output,
            timer,
            status,
        }
    }

    pub fn mode(&self) -> BlinkMode {
        self.mode
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Move to the next mode in the cycle.
    ///
    /// If the timer refuses to arm, the controller settles in `Off` with the
    /// line low instead of claiming a timed mode it cannot drive.
    pub fn advance(&mut self) -> Transition {
        let from = self.mode;
        let mut to = from.next();

        let cancelled = from.is_timed();
        if cancelled {
            self.timer.cancel();
        }

        let armed = match (to.fixed_level(), to.half_period()) {
            (Some(level), _) => {
                self.output.set(level);
                None
            }
            (None, Some(half)) => match self.timer.arm(half) {
                Ok(()) => Some(half),
                Err(e) => {
                    error!("controller: {} needs the timer: {}, falling back to off", to, e);
                    self.output.set(false);
                    to = BlinkMode::Off;
                    None
                }
            },
            (None, None) => None,
        };

        self.mode = to;
        self.status.record(to);
        debug!("controller: {} -> {}", from, to);

        Transition {
            from,
            to,
            cancelled,
            armed,
        }
    }
}

impl<O: OutputPort, T: PeriodicTimer> DeferredTask for BlinkController<O, T> {
    fn run(&mut self, sink: &mut dyn EventSink) {
        let t = self.advance();
        sink.emit(&BlinkEvent::ModeChanged {
            from: t.from,
            to: t.to,
            half_period_ms: t.armed.map(|d| d.as_millis() as u64),
        });
    }

    fn shutdown(&mut self) {
        self.timer.cancel();
    }
}

/// Edge-driven toggler: every accepted press flips the LED.
pub struct Toggler<O> {
    output: SharedOutput<O>,
    status: Arc<ModeStatus>,
}

impl<O: OutputPort> Toggler<O> {
    pub fn new(output: SharedOutput<O>, status: Arc<ModeStatus>) -> Self {
        Self { output, status }
    }
}

impl<O: OutputPort> DeferredTask for Toggler<O> {
    fn run(&mut self, sink: &mut dyn EventSink) {
        let on = self.output.toggle();
        self.status.record(if on {
            BlinkMode::SteadyOn
        } else {
            BlinkMode::Off
        });
        sink.emit(&BlinkEvent::Toggled { on });
    }

    fn shutdown(&mut self) {}
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
