//! Simulation board: the port traits without hardware.
//!
//! Backs the host binary and the integration tests.  Lines live in a shared
//! [`SimState`]; every acquire, release, direction change, subscription and
//! level write is appended to a journal so tests can assert on ordering.
//! Faults are injected per line ([`SimFault`]) and stay active until
//! [`SimBoard::clear_faults`].
//!
//! Rising edges are injected with [`SimBoard::rising_edge`].  The handler
//! runs on the injecting thread, under the subscription's slot lock, which
//! makes `unsubscribe` synchronous the same way removing a real ISR is.

use core::convert::Infallible;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::debug;

use crate::app::ports::{
    Board, EdgeHandler, EdgeSubscription, InputPort, OutputPort, TimerCallback,
};
use crate::dispatcher::Dispatcher;
use crate::drivers::button::EdgeDebouncer;
use crate::error::{Error, IrqError, Result};
use crate::pins::LineId;
use crate::scheduler::ThreadTimer;

/// GPIOs the simulated SoC exposes (0..=53).
pub const SIM_LINE_COUNT: LineId = 54;

/// Injectable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Direction configuration of this line fails.
    Direction(LineId),
    /// This line has no interrupt source.
    UnmappableIrq(LineId),
    /// Another driver already owns this line's interrupt.
    ForeignIrqOwner(LineId),
    /// The interrupt controller rejects registration with `code`.
    IrqRejected(LineId, i32),
    /// The timer service refuses new timers.
    TimerRefused,
    /// The scheduler refuses to start the dispatcher worker.
    WorkerRefused,
}

/// Journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOp {
    Acquired(LineId),
    Released(LineId),
    Direction { line: LineId, output: bool },
    Subscribed(LineId),
    Unsubscribed(LineId),
    Level { line: LineId, on: bool },
    TimerCreated(&'static str),
}

struct EdgeSlot {
    handler: Mutex<Option<EdgeHandler>>,
    debouncer: EdgeDebouncer,
}

#[derive(Default)]
pub struct SimState {
    claimed: u64,
    levels: u64,
    faults: Vec<SimFault>,
    journal: Vec<BoardOp>,
    slots: HashMap<LineId, Arc<EdgeSlot>>,
}

impl SimState {
    fn has(&self, fault: SimFault) -> bool {
        self.faults.contains(&fault)
    }

    fn write(&mut self, line: LineId, on: bool) {
        if on {
            self.levels |= 1 << line;
        } else {
            self.levels &= !(1 << line);
        }
    }
}

/// Cloneable handle to one simulated board.
#[derive(Clone)]
pub struct SimBoard {
    state: Arc<Mutex<SimState>>,
    epoch: Instant,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            epoch: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn inject(&self, fault: SimFault) {
        self.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Snapshot of the journal so far.
    pub fn journal(&self) -> Vec<BoardOp> {
        self.lock().journal.clone()
    }

    /// Journal without level writes.
    pub fn ownership_journal(&self) -> Vec<BoardOp> {
        self.lock()
            .journal
            .iter()
            .copied()
            .filter(|op| !matches!(op, BoardOp::Level { .. }))
            .collect()
    }

    /// Last level driven on `line`.  Unknown lines read low.
    pub fn level(&self, line: LineId) -> bool {
        line < SIM_LINE_COUNT && self.lock().levels & (1 << line) != 0
    }

    /// Unknown lines are never claimed.
    pub fn is_claimed(&self, line: LineId) -> bool {
        line < SIM_LINE_COUNT && self.lock().claimed & (1 << line) != 0
    }

    pub fn is_subscribed(&self, line: LineId) -> bool {
        self.lock().slots.contains_key(&line)
    }

    /// Inject a rising edge now.  Returns whether a handler ran.
    pub fn rising_edge(&self, line: LineId) -> bool {
        let now = self.epoch.elapsed().as_micros() as u64;
        self.rising_edge_at(line, now)
    }

    /// Inject a rising edge stamped `at_us` microseconds after boot.
    pub fn rising_edge_at(&self, line: LineId, at_us: u64) -> bool {
        let Some(slot) = self.lock().slots.get(&line).cloned() else {
            return false;
        };
        let handler = slot.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match handler.as_ref() {
            Some(h) if slot.debouncer.accept(at_us) => {
                h();
                true
            }
            _ => false,
        }
    }

    fn claim(&self, line: LineId) -> Result<()> {
        if line >= SIM_LINE_COUNT {
            return Err(Error::InvalidLineIdentifier(line));
        }
        let mut st = self.lock();
        if st.claimed & (1 << line) != 0 {
            return Err(Error::ResourceUnavailable(line));
        }
        st.claimed |= 1 << line;
        st.journal.push(BoardOp::Acquired(line));
        Ok(())
    }

    fn unclaim(&self, line: LineId) {
        let mut st = self.lock();
        st.claimed &= !(1 << line);
        st.journal.push(BoardOp::Released(line));
    }

    fn set_direction(&self, line: LineId, output: Option<bool>) -> Result<()> {
        let mut st = self.lock();
        if st.has(SimFault::Direction(line)) {
            return Err(Error::DirectionConfigurationFailed(line));
        }
        st.journal.push(BoardOp::Direction {
            line,
            output: output.is_some(),
        });
        if let Some(initial) = output {
            st.write(line, initial);
        }
        Ok(())
    }
}

impl Board for SimBoard {
    type Output = SimOutput;
    type Input = SimInput;
    type Timer = ThreadTimer;

    fn acquire_output(&mut self, line: LineId) -> Result<SimOutput> {
        self.claim(line)?;
        Ok(SimOutput {
            line,
            board: self.clone(),
            released: false,
        })
    }

    fn acquire_input(&mut self, line: LineId) -> Result<SimInput> {
        self.claim(line)?;
        Ok(SimInput {
            line,
            board: self.clone(),
            debounce: Duration::ZERO,
            released: false,
        })
    }

    fn create_timer(&mut self, name: &'static str, callback: TimerCallback) -> Result<ThreadTimer> {
        if self.lock().has(SimFault::TimerRefused) {
            return Err(Error::TimerCreationFailed);
        }
        let timer = ThreadTimer::spawn(name, callback)?;
        self.lock()
            .journal
            .push(BoardOp::TimerCreated(name.trim_end_matches('\0')));
        Ok(timer)
    }

    fn spawn_dispatcher<S, F>(&mut self, name: &'static str, state: S, body: F) -> Result<Dispatcher<S>>
    where
        S: Send + 'static,
        F: FnMut(&mut S) + Send + 'static,
    {
        if self.lock().has(SimFault::WorkerRefused) {
            debug!("sim: refusing worker '{}'", name.trim_end_matches('\0'));
            return Err(Error::DispatcherCreationFailed);
        }
        Dispatcher::spawn(name, state, body)
    }
}

// ── Output ────────────────────────────────────────────────────

pub struct SimOutput {
    line: LineId,
    board: SimBoard,
    released: bool,
}

impl ErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> core::result::Result<(), Infallible> {
        let mut st = self.board.lock();
        st.write(self.line, false);
        st.journal.push(BoardOp::Level {
            line: self.line,
            on: false,
        });
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Infallible> {
        let mut st = self.board.lock();
        st.write(self.line, true);
        st.journal.push(BoardOp::Level {
            line: self.line,
            on: true,
        });
        Ok(())
    }
}

impl OutputPort for SimOutput {
    fn line(&self) -> LineId {
        self.line
    }

    fn set_direction_output(&mut self, initial: bool) -> Result<()> {
        self.board.set_direction(self.line, Some(initial))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.board.unclaim(self.line);
        }
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Input ─────────────────────────────────────────────────────

pub struct SimInput {
    line: LineId,
    board: SimBoard,
    debounce: Duration,
    released: bool,
}

impl InputPort for SimInput {
    type Subscription = SimSubscription;

    fn line(&self) -> LineId {
        self.line
    }

    fn set_direction_input(&mut self) -> Result<()> {
        self.board.set_direction(self.line, None)
    }

    fn configure_debounce(&mut self, window: Duration) {
        self.debounce = window;
    }

    fn subscribe_rising_edge(&mut self, handler: EdgeHandler) -> Result<SimSubscription> {
        let line = self.line;
        let mut st = self.board.lock();
        if st.has(SimFault::UnmappableIrq(line)) {
            return Err(Error::InterruptMappingFailed(line));
        }
        if st.has(SimFault::ForeignIrqOwner(line)) || st.slots.contains_key(&line) {
            return Err(IrqError::AlreadyRegistered(line).into());
        }
        if let Some(code) = st.faults.iter().find_map(|f| match *f {
            SimFault::IrqRejected(l, code) if l == line => Some(code),
            _ => None,
        }) {
            return Err(IrqError::Rejected { line, code }.into());
        }

        let slot = Arc::new(EdgeSlot {
            handler: Mutex::new(Some(handler)),
            debouncer: EdgeDebouncer::new(self.debounce),
        });
        st.slots.insert(line, Arc::clone(&slot));
        st.journal.push(BoardOp::Subscribed(line));
        debug!("sim: line {} subscribed (debounce {:?})", line, slot.debouncer.window());
        Ok(SimSubscription {
            line,
            board: self.board.clone(),
            slot: Some(slot),
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.board.unclaim(self.line);
        }
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct SimSubscription {
    line: LineId,
    board: SimBoard,
    slot: Option<Arc<EdgeSlot>>,
}

impl EdgeSubscription for SimSubscription {
    fn unsubscribe(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        // Blocks while an injected edge is inside the handler.
        slot.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut st = self.board.lock();
        st.slots.remove(&self.line);
        st.journal.push(BoardOp::Unsubscribed(self.line));
    }
}

impl Drop for SimSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
