//! Deferred work dispatcher: one worker, one pending slot.
//!
//! Interrupt handlers may not block, so the button ISR only calls
//! [`DispatchHandle::signal`].  The real work (a mode transition) runs later
//! on the dispatcher's own thread, which owns the state it mutates.
//!
//! ```text
//!  ISR ──signal()──▶ pending=true ──doorbell──▶ worker
//!                                                 │ pending.swap(false)
//!                                                 ▼
//!                                            body(&mut state)
//! ```
//!
//! Signals that arrive while a task is already pending collapse into it.
//! A signal that arrives while the body runs queues exactly one more run.
//!
//! The doorbell is the only platform-specific piece: an `embassy-sync`
//! [`Signal`](embassy_sync::signal::Signal) on the host, a FreeRTOS task
//! notification on ESP-IDF (safe to ring from an ISR without a lock).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::{Error, Result};

const WORKER_STACK_KB: usize = 8;
const WORKER_PRIORITY: u8 = 10;

struct DispatchShared {
    pending: AtomicBool,
    stopping: AtomicBool,
    /// `signal` calls between their `stopping` check and their return.
    signalling: AtomicU32,
    coalesced: AtomicU32,
    rejected: AtomicU32,
}

impl DispatchShared {
    /// Close the gate and wait out signals that got past it, so nothing
    /// rings the doorbell once the owner starts joining the worker.
    fn close(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        while self.signalling.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }
}

/// Interrupt-safe handle for queueing work.
#[derive(Clone)]
pub struct DispatchHandle {
    shared: Arc<DispatchShared>,
    bell: doorbell::Bell,
}

impl DispatchHandle {
    /// Queue the task.  Returns `true` only when this call made it pending;
    /// `false` when it was already pending or the dispatcher is stopping.
    ///
    /// Never blocks, never allocates, never logs.
    pub fn signal(&self) -> bool {
        let shared = &*self.shared;
        shared.signalling.fetch_add(1, Ordering::SeqCst);
        let queued = if shared.stopping.load(Ordering::SeqCst) {
            shared.rejected.fetch_add(1, Ordering::Relaxed);
            false
        } else if shared.pending.swap(true, Ordering::AcqRel) {
            shared.coalesced.fetch_add(1, Ordering::Relaxed);
            false
        } else {
            self.bell.ring();
            true
        };
        shared.signalling.fetch_sub(1, Ordering::SeqCst);
        queued
    }

    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }
}

/// Owner side of the dispatcher.  The worker holds `S` until
/// [`drain_and_stop`](Self::drain_and_stop) hands it back.
pub struct Dispatcher<S> {
    handle: DispatchHandle,
    worker: Option<JoinHandle<S>>,
    name: &'static str,
}

impl<S: Send + 'static> Dispatcher<S> {
    /// Start the worker thread.  `name` must be null-terminated.
    pub fn spawn<F>(name: &'static str, state: S, body: F) -> Result<Self>
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        let shared = Arc::new(DispatchShared {
            pending: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            signalling: AtomicU32::new(0),
            coalesced: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        });
        let display = name.trim_end_matches('\0');

        // The doorbell's waiting half has to be created on the worker itself
        // (a task notification targets the calling task), so the ringing half
        // comes back over a channel.
        let (bell_tx, bell_rx) = mpsc::sync_channel(1);
        let worker_shared = Arc::clone(&shared);
        let worker = task_pin::spawn_on_core(Core::App, WORKER_PRIORITY, WORKER_STACK_KB, name, move || {
            let waiter = doorbell::Waiter::new();
            if bell_tx.send(waiter.bell()).is_err() {
                return state;
            }
            work_loop(&worker_shared, &waiter, state, body)
        })
        .map_err(|e| {
            log::error!("dispatcher: cannot start '{}': {}", display, e);
            Error::DispatcherCreationFailed
        })?;

        let Ok(bell) = bell_rx.recv() else {
            log::error!("dispatcher: '{}' exited during start-up", display);
            let _ = worker.join();
            return Err(Error::DispatcherCreationFailed);
        };

        info!("dispatcher: '{}' running", display);
        Ok(Self {
            handle: DispatchHandle { shared, bell },
            worker: Some(worker),
            name: display,
        })
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Reject new signals, let a pending task run, wait for the worker and
    /// return its state.  `None` only if the body panicked.
    pub fn drain_and_stop(mut self) -> Option<S> {
        let shared = &self.handle.shared;
        shared.close();
        self.handle.bell.ring();

        let state = self.worker.take().and_then(|w| w.join().ok());
        if state.is_none() {
            log::error!("dispatcher: '{}' worker panicked", self.name);
        }

        let coalesced = shared.coalesced.load(Ordering::Relaxed);
        let rejected = shared.rejected.load(Ordering::Relaxed);
        if coalesced > 0 || rejected > 0 {
            warn!(
                "dispatcher: '{}' coalesced {} and rejected {} signal(s)",
                self.name, coalesced, rejected
            );
        }
        debug!("dispatcher: '{}' stopped", self.name);
        state
    }
}

fn work_loop<S, F>(shared: &DispatchShared, waiter: &doorbell::Waiter, mut state: S, mut body: F) -> S
where
    F: FnMut(&mut S),
{
    loop {
        waiter.wait();
        if shared.pending.swap(false, Ordering::AcqRel) {
            body(&mut state);
        }
        if shared.stopping.load(Ordering::Acquire) && !shared.pending.load(Ordering::Acquire) {
            return state;
        }
    }
}

impl<S> Drop for Dispatcher<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.handle.shared.close();
            self.handle.bell.ring();
            let _ = worker.join();
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Doorbell
// ═══════════════════════════════════════════════════════════════

#[cfg(not(target_os = "espidf"))]
mod doorbell {
    use std::sync::Arc;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::signal::Signal;

    type Slot = Signal<CriticalSectionRawMutex, ()>;

    #[derive(Clone)]
    pub struct Bell(Arc<Slot>);

    impl Bell {
        pub fn ring(&self) {
            self.0.signal(());
        }
    }

    pub struct Waiter(Arc<Slot>);

    impl Waiter {
        pub fn new() -> Self {
            Self(Arc::new(Signal::new()))
        }

        pub fn bell(&self) -> Bell {
            Bell(Arc::clone(&self.0))
        }

        pub fn wait(&self) {
            futures_lite::future::block_on(self.0.wait());
        }
    }
}

#[cfg(target_os = "espidf")]
mod doorbell {
    use core::num::NonZeroU32;
    use std::sync::Arc;

    use esp_idf_hal::delay::BLOCK;
    use esp_idf_hal::task::notification::{Notification, Notifier};

    #[derive(Clone)]
    pub struct Bell(Arc<Notifier>);

    impl Bell {
        pub fn ring(&self) {
            // SAFETY: the notifier targets the worker task.  Handles ring
            // only between a `stopping` check that saw it clear and the end
            // of `signal`, and the owner waits for every such call before it
            // rings and joins, so the task is alive whenever this runs.
            unsafe {
                self.0.notify_and_yield(NonZeroU32::MIN);
            }
        }
    }

    pub struct Waiter(Notification);

    impl Waiter {
        pub fn new() -> Self {
            Self(Notification::new())
        }

        pub fn bell(&self) -> Bell {
            Bell(self.0.notifier())
        }

        pub fn wait(&self) {
            let _ = self.0.wait(BLOCK);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
