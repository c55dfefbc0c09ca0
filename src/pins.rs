//! GPIO line assignments for the ButtonBlink board.
//!
//! Single source of truth for the default wiring.  Both values can be
//! overridden at start-up through [`BlinkConfig`](crate::config::BlinkConfig).

/// Platform GPIO number.
pub type LineId = u32;

// ---------------------------------------------------------------------------
// LED (active HIGH through a series resistor)
// ---------------------------------------------------------------------------

/// Default output line driving the LED.
pub const LED_GPIO: LineId = 18;

// ---------------------------------------------------------------------------
// Push-button (active HIGH with pull-down, interrupt on rising edge)
// ---------------------------------------------------------------------------

/// Default input line wired to the push-button.
pub const BUTTON_GPIO: LineId = 22;

/// Debounce window applied to the button line.
pub const BUTTON_DEBOUNCE_MS: u32 = 200;

// ---------------------------------------------------------------------------
// Timer-only blinker
// ---------------------------------------------------------------------------

/// Default half-period of the timer-only blinker.
pub const SIMPLE_BLINK_PERIOD_MS: u64 = 200;
