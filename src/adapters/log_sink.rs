//! Log-based event sink adapter, plus the host console logger.
//!
//! Implements [`EventSink`] by writing structured blink events through the
//! `log` facade.  On the device that ends up on UART via `esp_idf_logger`;
//! on the host, [`ConsoleLogger`] prints it to stderr.

use std::time::Instant;

use log::{info, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::app::events::BlinkEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`BlinkEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &BlinkEvent) {
        match event {
            BlinkEvent::Started(variant) => {
                info!("START | variant={}", variant);
            }
            BlinkEvent::ModeChanged {
                from,
                to,
                half_period_ms,
            } => match half_period_ms {
                Some(ms) => info!("MODE  | {} -> {} | timer {}ms", from, to, ms),
                None => info!("MODE  | {} -> {} | timer off", from, to),
            },
            BlinkEvent::Toggled { on } => {
                info!("LED   | {}", if *on { "on" } else { "off" });
            }
            BlinkEvent::PeriodChanged { period_ms } => {
                info!("TIMER | period={}ms", period_ms);
            }
            BlinkEvent::Stopped => {
                info!("STOP  | all lines released");
            }
        }
    }
}

// ── Host console logger ───────────────────────────────────────

/// Minimal stderr logger for the simulation binary.
pub struct ConsoleLogger {
    epoch: std::sync::OnceLock<Instant>,
}

static CONSOLE: ConsoleLogger = ConsoleLogger {
    epoch: std::sync::OnceLock::new(),
};

impl ConsoleLogger {
    /// Install as the global logger.  Fails if another logger is set.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        CONSOLE.epoch.get_or_init(Instant::now);
        log::set_logger(&CONSOLE)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.epoch.get_or_init(Instant::now).elapsed();
        let thread = std::thread::current();
        eprintln!(
            "[{:>4}.{:03} {:<5} {}] {}",
            elapsed.as_secs(),
            elapsed.subsec_millis(),
            record.level(),
            thread.name().unwrap_or("-"),
            record.args()
        );
    }

    fn flush(&self) {}
}
