//! Test doubles and helpers shared by the integration tests.
//!
//! Events leave the blinker through a channel so tests can wait for the
//! dispatcher worker instead of sleeping.  Button presses are stamped
//! explicitly so the debouncer sees well-spaced edges regardless of how
//! fast the test runs.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use buttonblink::adapters::sim::SimBoard;
use buttonblink::app::events::BlinkEvent;
use buttonblink::app::ports::EventSink;
use buttonblink::{BlinkConfig, Blinker, Result, Variant};

pub const WAIT: Duration = Duration::from_secs(2);

// ── Sinks ─────────────────────────────────────────────────────

/// Forwards every event to a channel.
pub struct ChannelSink(pub Sender<BlinkEvent>);

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &BlinkEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Forwards every event, then blocks until the test releases it.
pub struct GatedSink {
    events: Sender<BlinkEvent>,
    release: Receiver<()>,
}

impl EventSink for GatedSink {
    fn emit(&mut self, event: &BlinkEvent) {
        let _ = self.events.send(event.clone());
        if matches!(event, BlinkEvent::ModeChanged { .. }) {
            let _ = self.release.recv_timeout(WAIT);
        }
    }
}

#[allow(dead_code)]
pub fn gated_sink() -> (Box<GatedSink>, Receiver<BlinkEvent>, Sender<()>) {
    let (events, rx) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    (
        Box::new(GatedSink {
            events,
            release: release_rx,
        }),
        rx,
        release,
    )
}

// ── Start-up helpers ──────────────────────────────────────────

pub fn config(variant: Variant) -> BlinkConfig {
    BlinkConfig {
        variant,
        ..BlinkConfig::default()
    }
}

pub fn start(
    board: &mut SimBoard,
    config: &BlinkConfig,
) -> Result<(Blinker<SimBoard>, Receiver<BlinkEvent>)> {
    let (tx, rx) = mpsc::channel();
    let blinker = Blinker::start(board, config, Box::new(ChannelSink(tx)))?;
    Ok((blinker, rx))
}

// ── Waiting ───────────────────────────────────────────────────

/// Next event matching `pred`, skipping the rest.
pub fn wait_for(
    rx: &Receiver<BlinkEvent>,
    mut pred: impl FnMut(&BlinkEvent) -> bool,
) -> Option<BlinkEvent> {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(left) {
            Ok(ev) if pred(&ev) => return Some(ev),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        }
    }
}

#[allow(dead_code)]
pub fn next_mode_change(rx: &Receiver<BlinkEvent>) -> Option<BlinkEvent> {
    wait_for(rx, |e| matches!(e, BlinkEvent::ModeChanged { .. }))
}

/// Poll `cond` until it holds or [`WAIT`] elapses.
#[allow(dead_code)]
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// ── Button ────────────────────────────────────────────────────

/// Presses the button with edges spaced past the debounce window.
pub struct Button {
    board: SimBoard,
    line: u32,
    at_us: u64,
}

#[allow(dead_code)]
impl Button {
    pub const SPACING_US: u64 = 250_000;

    pub fn new(board: &SimBoard, line: u32) -> Self {
        Self {
            board: board.clone(),
            line,
            at_us: 0,
        }
    }

    /// One clean press.  Returns whether the handler ran.
    pub fn press(&mut self) -> bool {
        self.at_us += Self::SPACING_US;
        self.board.rising_edge_at(self.line, self.at_us)
    }

    /// A press followed by contact bounce `bounce_us` later.
    pub fn press_with_bounce(&mut self, bounce_us: u64) -> (bool, bool) {
        let first = self.press();
        let bounce = self.board.rising_edge_at(self.line, self.at_us + bounce_us);
        (first, bounce)
    }
}
