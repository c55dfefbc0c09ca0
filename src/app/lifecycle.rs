//! Lifecycle manager: ordered bring-up and teardown of a blink variant.
//!
//! ## Bring-up
//!
//! ```text
//!  acquire output ─▶ acquire input ─▶ output dir (low) ─▶ input dir + debounce
//!        ─▶ create timer ─▶ spawn dispatcher ─▶ subscribe rising edge
//! ```
//!
//! ## Teardown (strict reverse)
//!
//! ```text
//!  unsubscribe ─▶ drain_and_stop ─▶ cancel timer ─▶ release input ─▶ release output
//! ```
//!
//! A failed bring-up runs the same teardown over whatever it acquired, so a
//! [`Blinker`] is either fully live or owns nothing.  Steps a variant does
//! not need are skipped: the simple blinker never touches the input line and
//! has no dispatcher, the toggler has no timer.

use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use crate::app::controller::{BlinkController, DeferredTask, ModeStatus, Toggler, toggle_on_fire};
use crate::app::events::BlinkEvent;
use crate::app::ports::{Board, EdgeSubscription, EventSink, InputPort, PeriodicTimer};
use crate::config::{BlinkConfig, ConfigError, Variant};
use crate::dispatcher::Dispatcher;
use crate::drivers::output_line::SharedOutput;
use crate::error::{Error, Result};
use crate::mode::BlinkMode;

const TIMER_NAME: &str = "blink-timer\0";
const WORKER_NAME: &str = "blink-wq\0";

/// Event sink shared by the owner and the dispatcher worker.
#[derive(Clone)]
struct SharedSink(Arc<Mutex<Box<dyn EventSink + Send>>>);

impl SharedSink {
    fn new(sink: Box<dyn EventSink + Send>) -> Self {
        Self(Arc::new(Mutex::new(sink)))
    }
}

impl EventSink for SharedSink {
    fn emit(&mut self, event: &BlinkEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(event);
    }
}

/// What the dispatcher worker owns.
struct DeferredWork {
    task: Box<dyn DeferredTask + Send>,
    sink: SharedSink,
}

/// A running blink variant and every resource it holds.
pub struct Blinker<B: Board> {
    variant: Variant,
    output: Option<SharedOutput<B::Output>>,
    input: Option<B::Input>,
    subscription: Option<<B::Input as InputPort>::Subscription>,
    dispatcher: Option<Dispatcher<DeferredWork>>,
    /// Free-running timer of the simple blinker.  The button blinker's timer
    /// lives inside its controller on the worker.
    timer: Option<B::Timer>,
    status: Arc<ModeStatus>,
    sink: SharedSink,
    live: bool,
}

impl<B: Board> Blinker<B> {
    /// Validate `config`, acquire everything in order and go live.
    pub fn start(
        board: &mut B,
        config: &BlinkConfig,
        sink: Box<dyn EventSink + Send>,
    ) -> Result<Self> {
        config.validate()?;

        let mut this = Self {
            variant: config.variant,
            output: None,
            input: None,
            subscription: None,
            dispatcher: None,
            timer: None,
            status: Arc::default(),
            sink: SharedSink::new(sink),
            live: false,
        };

        if let Err(e) = this.bring_up(board, config) {
            warn!("lifecycle: {} start failed: {}", config.variant, e);
            this.teardown();
            return Err(e);
        }

        this.live = true;
        info!(
            "lifecycle: {} live (led={}, button={})",
            config.variant,
            config.output_line_id,
            if config.variant.uses_input() {
                config.input_line_id.to_string()
            } else {
                "-".into()
            }
        );
        this.sink.emit(&BlinkEvent::Started(config.variant));
        Ok(this)
    }

    fn bring_up(&mut self, board: &mut B, config: &BlinkConfig) -> Result<()> {
        let output = SharedOutput::new(board.acquire_output(config.output_line_id)?);
        self.output = Some(output.clone());

        if self.variant.uses_input() {
            self.input = Some(board.acquire_input(config.input_line_id)?);
        }

        output.set_direction_output(false)?;
        if let Some(input) = self.input.as_mut() {
            input.set_direction_input()?;
            input.configure_debounce(config.debounce());
        }

        let task: Box<dyn DeferredTask + Send> = match self.variant {
            Variant::SimpleBlinker => {
                let timer = board.create_timer(TIMER_NAME, toggle_on_fire(output))?;
                self.timer.insert(timer).arm(config.period())?;
                return Ok(());
            }
            Variant::ButtonBlinker => {
                let timer = board.create_timer(TIMER_NAME, toggle_on_fire(output.clone()))?;
                Box::new(BlinkController::new(output, timer, Arc::clone(&self.status)))
            }
            Variant::LedToggler => Box::new(Toggler::new(output, Arc::clone(&self.status))),
        };

        let work = DeferredWork {
            task,
            sink: self.sink.clone(),
        };
        let dispatcher = board.spawn_dispatcher(WORKER_NAME, work, |w: &mut DeferredWork| {
            w.task.run(&mut w.sink);
        })?;
        let handle = dispatcher.handle();
        self.dispatcher = Some(dispatcher);

        if let Some(input) = self.input.as_mut() {
            let subscription = input.subscribe_rising_edge(Arc::new(move || {
                handle.signal();
            }))?;
            self.subscription = Some(subscription);
        }
        Ok(())
    }

    /// Release everything this blinker holds, in reverse acquisition order.
    fn teardown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("lifecycle: edge handler removed");
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            match dispatcher.drain_and_stop() {
                Some(mut work) => {
                    debug!("lifecycle: dispatcher drained");
                    work.task.shutdown();
                }
                None => warn!("lifecycle: worker state lost"),
            }
        }
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
            debug!("lifecycle: timer cancelled");
        }
        if let Some(mut input) = self.input.take() {
            input.release();
            debug!("lifecycle: button line {} released", input.line());
        }
        if let Some(output) = self.output.take() {
            output.release();
            debug!("lifecycle: led line {} released", output.line());
        }

        if self.live {
            self.live = false;
            self.sink.emit(&BlinkEvent::Stopped);
            info!("lifecycle: {} stopped", self.variant);
        }
    }

    /// Stop the variant and release every resource.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Current blink mode.  Always `Off` for the simple blinker; for the
    /// toggler it reads `SteadyOn` while the LED is lit.
    pub fn mode(&self) -> BlinkMode {
        self.status.mode()
    }

    /// Deferred tasks run so far.
    pub fn transitions(&self) -> u32 {
        self.status.transitions()
    }

    pub fn output_energized(&self) -> bool {
        self.output.as_ref().is_some_and(SharedOutput::is_energized)
    }

    /// Half-period attribute of the simple blinker, in milliseconds.
    pub fn period_ms(&self) -> Option<u64> {
        self.timer
            .as_ref()
            .map(|t| t.period().as_millis() as u64)
    }

    /// Write the half-period attribute.
    ///
    /// The running timer keeps its pending deadline; the new value applies
    /// from the next re-arm, and a fire racing this write may still use the
    /// old one.
    pub fn set_period_ms(&mut self, period_ms: u64) -> Result<()> {
        let Some(timer) = self.timer.as_mut() else {
            return Err(ConfigError::NotApplicable("period_ms").into());
        };
        if period_ms == 0 {
            return Err(Error::Config(ConfigError::InvalidValue("period_ms")));
        }
        timer.set_period(Duration::from_millis(period_ms));
        self.sink.emit(&BlinkEvent::PeriodChanged { period_ms });
        Ok(())
    }
}

impl<B: Board> Drop for Blinker<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
