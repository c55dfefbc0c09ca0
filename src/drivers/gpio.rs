//! ESP-IDF GPIO board: line ownership, direction, and rising-edge ISRs.
//!
//! Raw `esp-idf-sys` calls, in the same shape as the one-shot peripheral
//! init this firmware family uses.  Ownership is tracked in two bitmasks so
//! a line can only be acquired once and its interrupt only subscribed once.
//!
//! ## Pin assignment
//!
//! | GPIO | Function | Direction | Notes                        |
//! |------|----------|-----------|------------------------------|
//! | 18   | LED      | Output    | Active high                  |
//! | 22   | Button   | Input     | Pull-down, rising-edge IRQ   |

use core::ffi::c_void;
use core::ptr::NonNull;
use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use esp_idf_svc::sys::*;
use log::{debug, error, info};

use crate::app::ports::{
    Board, EdgeHandler, EdgeSubscription, InputPort, OutputPort, TimerCallback,
};
use crate::drivers::button::EdgeDebouncer;
use crate::drivers::hw_timer::EspTimer;
use crate::error::{Error, IrqError, Result};
use crate::pins::LineId;

/// Lines currently acquired through any [`EspBoard`].
static CLAIMED: AtomicU64 = AtomicU64::new(0);
/// Lines with an installed edge handler.
static SUBSCRIBED: AtomicU64 = AtomicU64::new(0);

fn bit(line: LineId) -> u64 {
    1u64 << line
}

fn ok(ret: esp_err_t) -> bool {
    ret == ESP_OK as i32
}

/// Validate `line` and take ownership of it.
fn claim(line: LineId) -> Result<()> {
    if line >= SOC_GPIO_PIN_COUNT as LineId {
        return Err(Error::InvalidLineIdentifier(line));
    }
    if CLAIMED.fetch_or(bit(line), Ordering::AcqRel) & bit(line) != 0 {
        return Err(Error::ResourceUnavailable(line));
    }
    // SAFETY: gpio_reset_pin validates the number and only touches this pin.
    let ret = unsafe { gpio_reset_pin(line as gpio_num_t) };
    if !ok(ret) {
        CLAIMED.fetch_and(!bit(line), Ordering::AcqRel);
        return Err(if ret == ESP_ERR_INVALID_ARG as i32 {
            Error::InvalidLineIdentifier(line)
        } else {
            Error::ResourceUnavailable(line)
        });
    }
    debug!("gpio: line {} acquired", line);
    Ok(())
}

fn unclaim(line: LineId) {
    // SAFETY: the caller owns the line.
    unsafe {
        gpio_reset_pin(line as gpio_num_t);
    }
    CLAIMED.fetch_and(!bit(line), Ordering::AcqRel);
    debug!("gpio: line {} released", line);
}

// ── Board ─────────────────────────────────────────────────────

/// The real board.  Stateless; ownership lives in the static bitmasks.
#[derive(Debug, Default)]
pub struct EspBoard;

impl EspBoard {
    pub fn new() -> Self {
        Self
    }
}

impl Board for EspBoard {
    type Output = EspOutput;
    type Input = EspInput;
    type Timer = EspTimer;

    fn acquire_output(&mut self, line: LineId) -> Result<EspOutput> {
        claim(line)?;
        Ok(EspOutput {
            line,
            released: false,
        })
    }

    fn acquire_input(&mut self, line: LineId) -> Result<EspInput> {
        claim(line)?;
        Ok(EspInput {
            line,
            debounce: Duration::ZERO,
            released: false,
        })
    }

    fn create_timer(&mut self, name: &'static str, callback: TimerCallback) -> Result<EspTimer> {
        EspTimer::create(name, callback)
    }
}

// ── Output ────────────────────────────────────────────────────

/// `gpio_set_level` return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioWriteError(pub esp_err_t);

impl embedded_hal::digital::Error for GpioWriteError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct EspOutput {
    line: LineId,
    released: bool,
}

impl EspOutput {
    fn write(&mut self, level: u32) -> core::result::Result<(), GpioWriteError> {
        // SAFETY: the line is owned and configured as an output.
        let ret = unsafe { gpio_set_level(self.line as gpio_num_t, level) };
        if ok(ret) { Ok(()) } else { Err(GpioWriteError(ret)) }
    }
}

impl ErrorType for EspOutput {
    type Error = GpioWriteError;
}

impl OutputPin for EspOutput {
    fn set_low(&mut self) -> core::result::Result<(), GpioWriteError> {
        self.write(0)
    }

    fn set_high(&mut self) -> core::result::Result<(), GpioWriteError> {
        self.write(1)
    }
}

impl OutputPort for EspOutput {
    fn line(&self) -> LineId {
        self.line
    }

    fn set_direction_output(&mut self, initial: bool) -> Result<()> {
        let cfg = gpio_config_t {
            pin_bit_mask: bit(self.line),
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: the line is owned.
        let ret = unsafe { gpio_config(&cfg) };
        if !ok(ret) {
            error!("gpio: line {} output config failed (rc={})", self.line, ret);
            return Err(Error::DirectionConfigurationFailed(self.line));
        }
        if self.write(u32::from(initial)).is_err() {
            return Err(Error::DirectionConfigurationFailed(self.line));
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            unclaim(self.line);
        }
    }
}

impl Drop for EspOutput {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Input ─────────────────────────────────────────────────────

pub struct EspInput {
    line: LineId,
    debounce: Duration,
    released: bool,
}

/// ISR argument: the handler plus its debounce state.
struct EdgeContext {
    handler: EdgeHandler,
    debouncer: EdgeDebouncer,
}

unsafe extern "C" fn on_rising_edge(arg: *mut c_void) {
    // SAFETY: `arg` is the EdgeContext leaked in subscribe_rising_edge and
    // reclaimed only after the handler is removed.
    let ctx = unsafe { &*(arg as *const EdgeContext) };
    // SAFETY: esp_timer_get_time is ISR-safe.
    let now = unsafe { esp_timer_get_time() } as u64;
    if ctx.debouncer.accept(now) {
        (ctx.handler)();
    }
}

fn install_isr_service() -> core::result::Result<(), esp_err_t> {
    // SAFETY: installing twice is reported as ESP_ERR_INVALID_STATE.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ok(ret) || ret == ESP_ERR_INVALID_STATE as i32 {
        Ok(())
    } else {
        Err(ret)
    }
}

impl InputPort for EspInput {
    type Subscription = EspSubscription;

    fn line(&self) -> LineId {
        self.line
    }

    fn set_direction_input(&mut self) -> Result<()> {
        let cfg = gpio_config_t {
            pin_bit_mask: bit(self.line),
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: the line is owned.
        let ret = unsafe { gpio_config(&cfg) };
        if !ok(ret) {
            error!("gpio: line {} input config failed (rc={})", self.line, ret);
            return Err(Error::DirectionConfigurationFailed(self.line));
        }
        Ok(())
    }

    fn configure_debounce(&mut self, window: Duration) {
        self.debounce = window;
    }

    fn subscribe_rising_edge(&mut self, handler: EdgeHandler) -> Result<EspSubscription> {
        let line = self.line;
        let gpio = line as gpio_num_t;

        // SAFETY: the line is owned; the call only validates and programs
        // the interrupt type.
        let ret = unsafe { gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_POSEDGE) };
        if !ok(ret) {
            error!("gpio: line {} has no edge interrupt (rc={})", line, ret);
            return Err(Error::InterruptMappingFailed(line));
        }

        install_isr_service().map_err(|code| IrqError::Rejected { line, code })?;

        if SUBSCRIBED.fetch_or(bit(line), Ordering::AcqRel) & bit(line) != 0 {
            return Err(IrqError::AlreadyRegistered(line).into());
        }

        let ctx = Box::new(EdgeContext {
            handler,
            debouncer: EdgeDebouncer::new(self.debounce),
        });
        let raw = Box::into_raw(ctx);
        // SAFETY: `raw` stays valid until EspSubscription::unsubscribe removes
        // the handler and reclaims it.
        let ret = unsafe { gpio_isr_handler_add(gpio, Some(on_rising_edge), raw as *mut c_void) };
        if !ok(ret) {
            // SAFETY: the handler was not installed, so nothing else holds `raw`.
            drop(unsafe { Box::from_raw(raw) });
            SUBSCRIBED.fetch_and(!bit(line), Ordering::AcqRel);
            error!("gpio: line {} handler add failed (rc={})", line, ret);
            return Err(IrqError::Rejected { line, code: ret }.into());
        }
        // SAFETY: handler installed above.
        unsafe {
            gpio_intr_enable(gpio);
        }

        info!("gpio: line {} rising-edge handler installed (debounce {:?})", line, self.debounce);
        Ok(EspSubscription {
            line,
            ctx: NonNull::new(raw),
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            unclaim(self.line);
        }
    }
}

impl Drop for EspInput {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct EspSubscription {
    line: LineId,
    ctx: Option<NonNull<EdgeContext>>,
}

// SAFETY: the context is only dereferenced by the ISR and freed here after
// the ISR handler has been removed.
unsafe impl Send for EspSubscription {}

impl EdgeSubscription for EspSubscription {
    fn unsubscribe(&mut self) {
        let Some(ctx) = self.ctx.take() else {
            return;
        };
        let gpio = self.line as gpio_num_t;
        // SAFETY: removal happens under the GPIO driver's ISR spinlock, after
        // which the ISR service no longer dispatches to `ctx`.
        unsafe {
            gpio_intr_disable(gpio);
            gpio_isr_handler_remove(gpio);
            drop(Box::from_raw(ctx.as_ptr()));
        }
        SUBSCRIBED.fetch_and(!bit(self.line), Ordering::AcqRel);
        debug!("gpio: line {} handler removed", self.line);
    }
}

impl Drop for EspSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
