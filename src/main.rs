//! ButtonBlink firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                     │
//! │   EspBoard / SimBoard (Board)      LogEventSink (EventSink)│
//! │                                                            │
//! │  ─────────────── Port Trait Boundary ───────────────────   │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ Blinker (lifecycle)                                  │  │
//! │  │   BlinkController / Toggler  ◀── Dispatcher worker   │  │
//! │  │   PeriodicTimer ──▶ toggle LED                       │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! On the device the configured variant runs until reset.  On the host the
//! same wiring runs against [`SimBoard`](buttonblink::adapters::sim::SimBoard)
//! and stdin drives the button:
//!
//! ```text
//! buttonblink [--config params.json] [key=value ...]
//!   press        inject a rising edge on the button line
//!   period <ms>  write the simple blinker's half-period
//!   status       print mode, LED level and period
//!   quit         tear down and exit
//! ```

#![deny(unused_must_use)]

use anyhow::Result;

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use buttonblink::adapters::log_sink::LogEventSink;
    use buttonblink::drivers::gpio::EspBoard;
    use buttonblink::{BlinkConfig, Blinker};
    use log::info;

    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  ButtonBlink v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = BlinkConfig::default();
    let mut board = EspBoard::new();
    // Held for the life of the firmware; dropping it would tear down.
    let _blinker = match Blinker::start(&mut board, &config, Box::new(LogEventSink::new())) {
        Ok(b) => b,
        Err(e) => {
            log::error!("start failed: {}, halting", e);
            return Err(e.into());
        }
    };

    info!(
        "System ready. Button on GPIO {}, LED on GPIO {}.",
        config.input_line_id, config.output_line_id
    );
    loop {
        std::thread::park();
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    sim::run()
}

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::io::BufRead;

    use anyhow::{Context, Result, bail};
    use log::{LevelFilter, info, warn};

    use buttonblink::adapters::log_sink::{ConsoleLogger, LogEventSink};
    use buttonblink::adapters::sim::SimBoard;
    use buttonblink::{BlinkConfig, Blinker};

    fn load_config(args: &[String]) -> Result<BlinkConfig> {
        let mut words = Vec::new();
        let mut config = BlinkConfig::default();
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            if arg == "--config" {
                let path = it.next().context("--config needs a file")?;
                let doc = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {path}"))?;
                config = BlinkConfig::from_json(&doc)?;
            } else {
                words.push(arg.as_str());
            }
        }
        config.apply_params(words)?;
        config.validate()?;
        Ok(config)
    }

    pub fn run() -> Result<()> {
        if ConsoleLogger::init(LevelFilter::Debug).is_err() {
            bail!("a logger is already installed");
        }

        let args: Vec<String> = std::env::args().skip(1).collect();
        let config = load_config(&args)?;
        info!("ButtonBlink v{} (simulation) {:?}", env!("CARGO_PKG_VERSION"), config);

        let mut board = SimBoard::new();
        let mut blinker = Blinker::start(&mut board, &config, Box::new(LogEventSink::new()))?;

        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("press"), _) => {
                    if !board.rising_edge(config.input_line_id) {
                        warn!("edge ignored (debounced or no handler)");
                    }
                }
                (Some("period"), Some(ms)) => match ms.parse() {
                    Ok(ms) => {
                        if let Err(e) = blinker.set_period_ms(ms) {
                            warn!("{}", e);
                        }
                    }
                    Err(_) => warn!("period expects an unsigned integer"),
                },
                (Some("status"), _) => {
                    println!(
                        "variant={} mode={} led={} period={}",
                        blinker.variant(),
                        blinker.mode(),
                        if blinker.output_energized() { "on" } else { "off" },
                        blinker
                            .period_ms()
                            .map_or_else(|| "-".to_owned(), |ms| format!("{ms}ms")),
                    );
                }
                (Some("quit"), _) => break,
                (None, _) => {}
                (Some(other), _) => warn!("unknown command '{}'", other),
            }
        }

        blinker.shutdown();
        Ok(())
    }

}
