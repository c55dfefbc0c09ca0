//! ButtonBlink firmware library.
//!
//! A push-button cycles an LED through six blink modes; two smaller variants
//! blink on a fixed timer or toggle per press.  The logic is host-testable:
//! hardware is reached only through the port traits in [`app::ports`], with
//! ESP-IDF implementations in [`drivers`] guarded by
//! `#[cfg(target_os = "espidf")]` and a simulation board in [`adapters`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod drivers;
pub mod error;
pub mod mode;
pub mod pins;
pub mod scheduler;

pub use app::lifecycle::Blinker;
pub use config::{BlinkConfig, Variant};
pub use error::{Error, Result};
pub use mode::BlinkMode;
