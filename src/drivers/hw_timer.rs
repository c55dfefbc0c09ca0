//! Blink timer on ESP-IDF's `esp_timer` API.
//!
//! Each fire is a one-shot alarm that re-arms itself from the previous
//! deadline, so the grid stays fixed and a late fire skips whole periods
//! instead of stretching the wave.  The interval is read from an atomic on
//! every re-arm; [`PeriodicTimer::set_period`] only stores it.
//!
//! Callbacks execute in the esp_timer task (not ISR), so they may take the
//! output mutex.  The callback body runs under `TimerCore::run`; cancel
//! clears `active` and then takes that lock, which is how it waits for an
//! in-flight fire without spinning.  An alarm the timer task dequeued just
//! before a cancel can still reach `on_fire` after the next `arm`; it finds a
//! deadline in the future and returns without touching the LED.

use core::ffi::c_void;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use esp_idf_svc::sys::*;
use log::{debug, error, warn};

use crate::app::ports::{PeriodicTimer, TimerCallback};
use crate::error::{Error, Result};
use crate::scheduler::{fire_is_current, forward_steps};

struct FireState {
    callback: TimerCallback,
    /// Scheduled deadline of the pending alarm, µs since boot.
    deadline_us: u64,
}

struct TimerCore {
    name: &'static str,
    handle: AtomicU64,
    active: AtomicBool,
    period_us: AtomicU64,
    run: Mutex<FireState>,
}

impl TimerCore {
    fn lock(&self) -> MutexGuard<'_, FireState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> esp_timer_handle_t {
        self.handle.load(Ordering::Acquire) as usize as esp_timer_handle_t
    }

    fn period(&self) -> Duration {
        Duration::from_micros(self.period_us.load(Ordering::Relaxed).max(1))
    }
}

fn now_us() -> u64 {
    // SAFETY: esp_timer_get_time only reads the system timer.
    unsafe { esp_timer_get_time() as u64 }
}

unsafe extern "C" fn on_fire(arg: *mut c_void) {
    // SAFETY: `arg` is the boxed TimerCore owned by the EspTimer, which
    // deletes the esp_timer before freeing the box.
    let core = unsafe { &*(arg as *const TimerCore) };
    let mut run = core.lock();
    if !core.active.load(Ordering::Acquire) {
        return;
    }
    let invoked = now_us();
    // The timer task dequeues an alarm before calling us, so an alarm from a
    // cancelled program can still arrive after `arm` installed a new one.
    if !fire_is_current(invoked, run.deadline_us) {
        debug!("timer '{}': dropped a stale alarm", core.name);
        return;
    }
    (run.callback)();

    let period = core.period();
    let behind = Duration::from_micros(invoked.saturating_sub(run.deadline_us));
    let steps = forward_steps(behind, period);
    if steps > 1 {
        warn!("timer '{}': overrun, skipped {} period(s)", core.name, steps - 1);
    }
    run.deadline_us += period.as_micros() as u64 * u64::from(steps);
    let delay = run.deadline_us.saturating_sub(now_us()).max(1);

    // SAFETY: the handle is valid while the core is alive.  Stopping first
    // clears an alarm that a straggler's successor may have left queued.
    let ret = unsafe {
        esp_timer_stop(core.handle());
        esp_timer_start_once(core.handle(), delay)
    };
    if ret != ESP_OK as i32 {
        core.active.store(false, Ordering::Release);
        error!("timer '{}': re-arm failed (rc={}), timer stopped", core.name, ret);
    }
}

/// `esp_timer`-backed [`PeriodicTimer`].
pub struct EspTimer {
    core: Box<TimerCore>,
}

// SAFETY: the raw esp_timer handle inside TimerCore is only used through the
// thread-safe esp_timer API.
unsafe impl Send for EspTimer {}

impl EspTimer {
    /// Create a disarmed timer.  `name` must be null-terminated.
    pub fn create(name: &'static str, callback: TimerCallback) -> Result<Self> {
        let core = Box::new(TimerCore {
            name: name.trim_end_matches('\0'),
            handle: AtomicU64::new(0),
            active: AtomicBool::new(false),
            period_us: AtomicU64::new(0),
            run: Mutex::new(FireState {
                callback,
                deadline_us: 0,
            }),
        });

        let args = esp_timer_create_args_t {
            callback: Some(on_fire),
            arg: &*core as *const TimerCore as *mut c_void,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: name.as_ptr() as *const _,
            skip_unhandled_events: false,
        };
        let mut handle: esp_timer_handle_t = core::ptr::null_mut();
        // SAFETY: args and the core it points at outlive the timer; see Drop.
        let ret = unsafe { esp_timer_create(&args, &mut handle) };
        if ret != ESP_OK as i32 {
            error!("timer '{}': esp_timer_create failed (rc={})", core.name, ret);
            return Err(Error::TimerCreationFailed);
        }
        core.handle.store(handle as usize as u64, Ordering::Release);
        debug!("timer '{}': created", core.name);
        Ok(Self { core })
    }

    fn stop(&self) {
        // SAFETY: valid handle; ESP_ERR_INVALID_STATE just means "not running".
        unsafe {
            esp_timer_stop(self.core.handle());
        }
    }
}

impl PeriodicTimer for EspTimer {
    fn arm(&mut self, period: Duration) -> Result<()> {
        let us = (period.as_micros() as u64).max(1);
        self.core.period_us.store(us, Ordering::Relaxed);

        let mut run = self.core.lock();
        self.stop();
        run.deadline_us = now_us() + us;
        self.core.active.store(true, Ordering::Release);
        // SAFETY: valid handle, timer stopped above.
        let ret = unsafe { esp_timer_start_once(self.core.handle(), us) };
        if ret != ESP_OK as i32 {
            self.core.active.store(false, Ordering::Release);
            error!("timer '{}': start failed (rc={})", self.core.name, ret);
            return Err(Error::TimerArmFailed(ret));
        }
        debug!("timer '{}': armed every {:?}", self.core.name, period);
        Ok(())
    }

    fn cancel(&mut self) {
        self.core.active.store(false, Ordering::Release);
        // Wait out a fire that passed the `active` check before we cleared it.
        drop(self.core.lock());
        // That fire may have re-armed the alarm.
        self.stop();
    }

    fn set_period(&mut self, period: Duration) {
        let us = (period.as_micros() as u64).max(1);
        self.core.period_us.store(us, Ordering::Relaxed);
    }

    fn period(&self) -> Duration {
        self.core.period()
    }

    fn is_armed(&self) -> bool {
        self.core.active.load(Ordering::Acquire)
    }
}

impl Drop for EspTimer {
    fn drop(&mut self) {
        self.cancel();
        // SAFETY: stopped and no callback in flight; the box outlives this call.
        let ret = unsafe { esp_timer_delete(self.core.handle()) };
        if ret != ESP_OK as i32 {
            error!("timer '{}': delete failed (rc={})", self.core.name, ret);
        }
    }
}
