//! Start-up configuration.
//!
//! The knobs are module-parameter style: which lines to use, which variant
//! to run and, for the timer-only blinker, the half-period.  Parameters arrive either as
//! `key=value` words (`output_line_id=17 variant=led-toggler`) or as a JSON
//! document; words are applied on top of the document.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::pins::{self, LineId};

/// Longest parameter name echoed back in a [`ConfigError`].
const NAME_CAP: usize = 32;

/// Which of the three controller shapes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Button edges cycle through the blink modes (interrupt + worker + timer).
    #[default]
    ButtonBlinker,
    /// Free-running blink at a fixed, runtime-adjustable half-period (timer only).
    SimpleBlinker,
    /// Each button edge toggles the LED (interrupt + worker).
    LedToggler,
}

impl Variant {
    /// Whether this variant owns the button line.
    pub fn uses_input(self) -> bool {
        !matches!(self, Self::SimpleBlinker)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ButtonBlinker => "button-blinker",
            Self::SimpleBlinker => "simple-blinker",
            Self::LedToggler => "led-toggler",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "button-blinker" => Ok(Self::ButtonBlinker),
            "simple-blinker" => Ok(Self::SimpleBlinker),
            "led-toggler" => Ok(Self::LedToggler),
            _ => Err(ConfigError::InvalidValue("variant")),
        }
    }
}

/// Initialisation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// GPIO driving the LED.
    pub output_line_id: LineId,
    /// GPIO wired to the push-button.
    pub input_line_id: LineId,
    /// Minimum spacing between accepted button edges (milliseconds).
    pub debounce_ms: u32,
    /// Half-period of the timer-only blinker (milliseconds).
    pub period_ms: u64,
    pub variant: Variant,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            output_line_id: pins::LED_GPIO,
            input_line_id: pins::BUTTON_GPIO,
            debounce_ms: pins::BUTTON_DEBOUNCE_MS,
            period_ms: pins::SIMPLE_BLINK_PERIOD_MS,
            variant: Variant::ButtonBlinker,
        }
    }
}

impl BlinkConfig {
    /// Defaults overridden by `key=value` words, then validated.
    pub fn from_params<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_params(words)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(doc).map_err(|_| ConfigError::InvalidDocument)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `key=value` words on top of the current values.
    ///
    /// Does not validate; call [`validate`](Self::validate) afterwards.
    pub fn apply_params<'a>(
        &mut self,
        words: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for word in words {
            let Some((key, value)) = word.split_once('=') else {
                return Err(ConfigError::Malformed(truncated(word)));
            };
            match key.trim() {
                "output_line_id" => self.output_line_id = parse(value, "output_line_id")?,
                "input_line_id" => self.input_line_id = parse(value, "input_line_id")?,
                "debounce_ms" => self.debounce_ms = parse(value, "debounce_ms")?,
                "period_ms" => self.period_ms = parse(value, "period_ms")?,
                "variant" => self.variant = value.trim().parse()?,
                other => return Err(ConfigError::UnknownParameter(truncated(other))),
            }
        }
        Ok(())
    }

    /// Range checks that do not need the platform.
    ///
    /// Line identifiers are checked by the platform when the lines are
    /// acquired, so that an unknown GPIO reports `InvalidLineIdentifier`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variant == Variant::SimpleBlinker && self.period_ms == 0 {
            return Err(ConfigError::InvalidValue("period_ms"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(u64::from(self.debounce_ms))
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

fn parse<T: FromStr>(value: &str, name: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue(name))
}

fn truncated(s: &str) -> String<NAME_CAP> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Parameter validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A word without `=`.
    Malformed(String<NAME_CAP>),
    /// A key this firmware does not know.
    UnknownParameter(String<NAME_CAP>),
    /// A known key with a value that does not parse or is out of range.
    InvalidValue(&'static str),
    /// The JSON document could not be decoded.
    InvalidDocument,
    /// The parameter exists, but not for the running variant.
    NotApplicable(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(word) => write!(f, "expected key=value, got '{}'", word),
            Self::UnknownParameter(name) => write!(f, "unknown parameter '{}'", name),
            Self::InvalidValue(name) => write!(f, "invalid value for {}", name),
            Self::InvalidDocument => write!(f, "malformed JSON document"),
            Self::NotApplicable(name) => write!(f, "{} does not apply to this variant", name),
        }
    }
}

impl std::error::Error for ConfigError {}
