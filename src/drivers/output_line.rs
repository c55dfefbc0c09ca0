//! LED output line shared between the worker and timer contexts.
//!
//! The dispatcher worker forces fixed levels (`Off`, `SteadyOn`, toggler)
//! and the timer callback flips the level in the timed modes.  Both reach the
//! pin through [`SharedOutput`], which also remembers the last level written
//! so a toggle never has to read the pin back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::PinState;
use log::error;

use crate::app::ports::OutputPort;
use crate::error::Result;
use crate::pins::LineId;

struct OutputLine<O> {
    port: O,
    energized: bool,
}

impl<O: OutputPort> OutputLine<O> {
    fn write(&mut self, on: bool) {
        if let Err(e) = self.port.set_state(PinState::from(on)) {
            error!("output: line {} write failed: {:?}", self.port.line(), e);
            return;
        }
        self.energized = on;
    }
}

/// Cloneable handle to the LED line.
pub struct SharedOutput<O> {
    inner: Arc<Mutex<OutputLine<O>>>,
}

impl<O> Clone for SharedOutput<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: OutputPort> SharedOutput<O> {
    /// Wrap an acquired line.  The line is assumed de-energised.
    pub fn new(port: O) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputLine {
                port,
                energized: false,
            })),
        }
    }

    pub fn line(&self) -> LineId {
        self.lock().port.line()
    }

    /// Configure the line as an output driving `initial`.
    pub fn set_direction_output(&self, initial: bool) -> Result<()> {
        let mut out = self.lock();
        out.port.set_direction_output(initial)?;
        out.energized = initial;
        Ok(())
    }

    pub fn set(&self, on: bool) {
        self.lock().write(on);
    }

    /// Flip the level and return the new one.
    pub fn toggle(&self) -> bool {
        let mut out = self.lock();
        let next = !out.energized;
        out.write(next);
        out.energized
    }

    pub fn is_energized(&self) -> bool {
        self.lock().energized
    }

    /// Release the line.  Idempotent.
    pub fn release(&self) {
        self.lock().port.release();
    }

    fn lock(&self) -> MutexGuard<'_, OutputLine<O>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
