//! Unified error types for the ButtonBlink firmware.
//!
//! Every fallible initialisation step funnels into [`Error`].  Failures are
//! never retried: the lifecycle manager unwinds what it already acquired and
//! hands the first error back to the caller.

use core::fmt;

use crate::config::ConfigError;
use crate::pins::LineId;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The platform does not know this line identifier.
    InvalidLineIdentifier(LineId),
    /// The line is already owned, or the platform refused the request.
    ResourceUnavailable(LineId),
    /// The line was acquired but its direction could not be set.
    DirectionConfigurationFailed(LineId),
    /// The input line cannot be mapped to an interrupt source.
    InterruptMappingFailed(LineId),
    /// The edge handler could not be installed.
    InterruptRegistrationFailed(IrqError),
    /// The deferred-work worker could not be started.
    DispatcherCreationFailed,
    /// The timer service refused to create a periodic timer.
    TimerCreationFailed,
    /// The timer service refused to start an alarm (raw return code).
    TimerArmFailed(i32),
    /// Initialisation parameters failed validation.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLineIdentifier(id) => write!(f, "line {id} is not a valid GPIO"),
            Self::ResourceUnavailable(id) => write!(f, "line {id} is unavailable"),
            Self::DirectionConfigurationFailed(id) => {
                write!(f, "line {id}: direction configuration failed")
            }
            Self::InterruptMappingFailed(id) => {
                write!(f, "line {id} cannot be used as an interrupt")
            }
            Self::InterruptRegistrationFailed(e) => write!(f, "irq: {e}"),
            Self::DispatcherCreationFailed => write!(f, "unable to start the deferred worker"),
            Self::TimerCreationFailed => write!(f, "unable to create the blink timer"),
            Self::TimerArmFailed(code) => write!(f, "unable to arm the blink timer (rc={code})"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Interrupt registration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// Another handler already owns the line's interrupt.
    AlreadyRegistered(LineId),
    /// The platform rejected the registration with a raw return code.
    Rejected { line: LineId, code: i32 },
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "line {id} already has a handler"),
            Self::Rejected { line, code } => {
                write!(f, "line {line}: registration rejected (rc={code})")
            }
        }
    }
}

impl From<IrqError> for Error {
    fn from(e: IrqError) -> Self {
        Self::InterruptRegistrationFailed(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
