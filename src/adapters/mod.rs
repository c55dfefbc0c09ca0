//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements          | Connects to                   |
//! |------------|---------------------|-------------------------------|
//! | `log_sink` | EventSink           | `log` facade / host stderr    |
//! | `sim`      | Board (+ lines)     | In-memory GPIO, thread timers |
//!
//! The ESP-IDF board lives in `drivers::gpio`.

pub mod log_sink;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
