//! Board drivers and the helpers shared between them.

pub mod button;
#[cfg(target_os = "espidf")]
pub mod gpio;
#[cfg(target_os = "espidf")]
pub mod hw_timer;
pub mod output_line;
pub mod task_pin;
