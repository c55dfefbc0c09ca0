//! Periodic timer engine.
//!
//! Drives the LED in the timed blink modes.  The timer knows nothing about
//! modes or LEDs; it runs an opaque [`TimerCallback`] on every fire and the
//! controller decides what that callback does.
//!
//! ```text
//!  arm(p) ──▶ deadline = now + p
//!                 │
//!                 ▼  (deadline reached)
//!          ┌──────────────┐
//!          │  callback()  │  toggle LED
//!          └──────┬───────┘
//!                 ▼
//!          Cadence::forward(invocation time, p)
//!          deadline += k·p   (smallest k that lands in the future)
//! ```
//!
//! Re-arming relative to the previous deadline keeps a steady square wave:
//! callback latency shifts individual edges but never accumulates.
//!
//! [`ThreadTimer`] is the std implementation (host simulation and any
//! target with threads).  The ESP-IDF build uses `esp_timer` instead, see
//! `drivers::hw_timer`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::app::ports::{PeriodicTimer, TimerCallback};
use crate::drivers::task_pin::{self, Core};
use crate::error::{Error, Result};

/// Shortest interval the engine will run at.
const MIN_PERIOD: Duration = Duration::from_micros(1);

const TIMER_STACK_KB: usize = 16;
const TIMER_PRIORITY: u8 = 22;

// ═══════════════════════════════════════════════════════════════
//  Cadence (pure deadline arithmetic)
// ═══════════════════════════════════════════════════════════════

/// Deadline bookkeeping for one armed program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    deadline: Instant,
}

impl Cadence {
    /// First fire one `period` after `now`.
    pub fn starting_at(now: Instant, period: Duration) -> Self {
        Self {
            deadline: now + period.max(MIN_PERIOD),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Push the deadline past `now` in whole multiples of `period`.
    ///
    /// Returns how many periods were skipped entirely (0 when the fire was
    /// on time).  A deadline already in the future is left alone.
    pub fn forward(&mut self, now: Instant, period: Duration) -> u32 {
        if self.deadline > now {
            return 0;
        }
        let period = period.max(MIN_PERIOD);
        let steps = forward_steps(now.duration_since(self.deadline), period);
        self.deadline += period * steps;
        steps - 1
    }
}

/// Whole periods to add to a deadline that is `behind` the current time so it
/// lands strictly in the future.  Always at least 1.
pub(crate) fn forward_steps(behind: Duration, period: Duration) -> u32 {
    let period = period.max(MIN_PERIOD).as_nanos();
    (behind.as_nanos() / period + 1).min(u128::from(u32::MAX)) as u32
}

/// Whether an alarm observed at `now_us` belongs to the program whose next
/// deadline is `deadline_us`.
///
/// A platform timer may hand out an expired alarm after the owner has already
/// cancelled and re-armed.  Re-arming moves the deadline one full period past
/// the re-arm instant, so the straggler always arrives early and is dropped.
pub(crate) fn fire_is_current(now_us: u64, deadline_us: u64) -> bool {
    now_us >= deadline_us
}

// ═══════════════════════════════════════════════════════════════
//  Thread-backed timer
// ═══════════════════════════════════════════════════════════════

struct TimerState {
    program: Option<Cadence>,
    /// Bumped on every arm/cancel so a fire that straddles a re-program
    /// does not forward the new program.
    generation: u64,
    in_callback: bool,
    shutdown: bool,
}

struct TimerShared {
    name: &'static str,
    state: Mutex<TimerState>,
    changed: Condvar,
    /// Interval for the next re-arm.  Read without the state lock.
    period_us: AtomicU64,
    fires: AtomicU64,
    overruns: AtomicU64,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, TimerState>) -> MutexGuard<'a, TimerState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for<'a>(
        &self,
        guard: MutexGuard<'a, TimerState>,
        timeout: Duration,
    ) -> MutexGuard<'a, TimerState> {
        match self.changed.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn period(&self) -> Duration {
        Duration::from_micros(self.period_us.load(Ordering::Relaxed))
    }

    fn store_period(&self, period: Duration) {
        let us = period.max(MIN_PERIOD).as_micros().min(u128::from(u64::MAX)) as u64;
        self.period_us.store(us, Ordering::Relaxed);
    }
}

/// Periodic timer running its callback on a dedicated thread.
pub struct ThreadTimer {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    /// Create a disarmed timer.  `name` must be null-terminated.
    pub fn spawn(name: &'static str, callback: TimerCallback) -> Result<Self> {
        let shared = Arc::new(TimerShared {
            name: name.trim_end_matches('\0'),
            state: Mutex::new(TimerState {
                program: None,
                generation: 0,
                in_callback: false,
                shutdown: false,
            }),
            changed: Condvar::new(),
            period_us: AtomicU64::new(0),
            fires: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = task_pin::spawn_on_core(Core::Pro, TIMER_PRIORITY, TIMER_STACK_KB, name, move || {
            run(&worker_shared, callback);
        })
        .map_err(|e| {
            log::error!("timer: cannot start '{}': {}", name.trim_end_matches('\0'), e);
            Error::TimerCreationFailed
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Callbacks run since creation.
    pub fn fires(&self) -> u64 {
        self.shared.fires.load(Ordering::Relaxed)
    }

    /// Periods skipped because a fire ran late.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

fn run(shared: &TimerShared, mut callback: TimerCallback) {
    let mut st = shared.lock();
    loop {
        if st.shutdown {
            break;
        }
        let Some(deadline) = st.program.map(|c| c.deadline()) else {
            st = shared.wait(st);
            continue;
        };
        let now = Instant::now();
        if now < deadline {
            st = shared.wait_for(st, deadline - now);
            continue;
        }

        let generation = st.generation;
        st.in_callback = true;
        drop(st);

        callback();
        shared.fires.fetch_add(1, Ordering::Relaxed);

        st = shared.lock();
        st.in_callback = false;
        if st.generation == generation {
            let period = shared.period();
            if let Some(cadence) = st.program.as_mut() {
                let missed = cadence.forward(now, period);
                if missed > 0 {
                    shared.overruns.fetch_add(u64::from(missed), Ordering::Relaxed);
                    warn!("timer '{}': overrun, skipped {} period(s)", shared.name, missed);
                }
            }
        }
        shared.changed.notify_all();
    }
}

impl PeriodicTimer for ThreadTimer {
    fn arm(&mut self, period: Duration) -> Result<()> {
        self.shared.store_period(period);
        let mut st = self.shared.lock();
        st.program = Some(Cadence::starting_at(Instant::now(), period));
        st.generation = st.generation.wrapping_add(1);
        self.shared.changed.notify_all();
        debug!("timer '{}': armed every {:?}", self.shared.name, period);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut st = self.shared.lock();
        if st.program.take().is_some() {
            debug!("timer '{}': cancelled", self.shared.name);
        }
        st.generation = st.generation.wrapping_add(1);
        self.shared.changed.notify_all();
        while st.in_callback {
            st = self.shared.wait(st);
        }
    }

    fn set_period(&mut self, period: Duration) {
        self.shared.store_period(period);
    }

    fn period(&self) -> Duration {
        self.shared.period()
    }

    fn is_armed(&self) -> bool {
        self.shared.lock().program.is_some()
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        {
            let mut st = self.shared.lock();
            st.shutdown = true;
            st.program = None;
            self.shared.changed.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("timer '{}': callback panicked", self.shared.name);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
