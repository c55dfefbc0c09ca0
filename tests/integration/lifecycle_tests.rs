//! Bring-up and teardown ordering against the simulation board.
//!
//! Every failure is injected at one step of the bring-up sequence; the
//! journal must show everything acquired before that step released again
//! in reverse order, and nothing left claimed.

use buttonblink::adapters::sim::{BoardOp, SimBoard, SimFault};
use buttonblink::app::events::BlinkEvent;
use buttonblink::app::ports::Board;
use buttonblink::config::ConfigError;
use buttonblink::error::IrqError;
use buttonblink::{BlinkConfig, BlinkMode, Blinker, Error, Variant};

use super::mock_hw::{ChannelSink, config, start, wait_for};

const LED: u32 = 18;
const BUTTON: u32 = 22;

fn nothing_claimed(board: &SimBoard) -> bool {
    !board.is_claimed(LED) && !board.is_claimed(BUTTON) && !board.is_subscribed(BUTTON)
}

// ── Successful bring-up / teardown ────────────────────────────

#[test]
fn button_blinker_acquires_in_order() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();

    assert_eq!(
        board.ownership_journal(),
        [
            BoardOp::Acquired(LED),
            BoardOp::Acquired(BUTTON),
            BoardOp::Direction { line: LED, output: true },
            BoardOp::Direction { line: BUTTON, output: false },
            BoardOp::TimerCreated("blink-timer"),
            BoardOp::Subscribed(BUTTON),
        ]
    );
    assert_eq!(rx.try_recv(), Ok(BlinkEvent::Started(Variant::ButtonBlinker)));
    assert_eq!(blinker.mode(), BlinkMode::Off);
    assert!(!board.level(LED), "LED must start de-energised");
    drop(blinker);
}

#[test]
fn teardown_runs_in_reverse_order() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let before = board.ownership_journal().len();

    blinker.shutdown();

    assert_eq!(
        board.ownership_journal()[before..],
        [
            BoardOp::Unsubscribed(BUTTON),
            BoardOp::Released(BUTTON),
            BoardOp::Released(LED),
        ]
    );
    assert!(nothing_claimed(&board));
    assert!(wait_for(&rx, |e| *e == BlinkEvent::Stopped).is_some());
}

#[test]
fn dropping_the_blinker_releases_everything() {
    let mut board = SimBoard::new();
    let (blinker, _rx) = start(&mut board, &config(Variant::LedToggler)).unwrap();
    assert!(board.is_claimed(LED) && board.is_subscribed(BUTTON));
    drop(blinker);
    assert!(nothing_claimed(&board));
}

#[test]
fn simple_blinker_never_touches_the_button_line() {
    let mut board = SimBoard::new();
    let (blinker, _rx) = start(&mut board, &config(Variant::SimpleBlinker)).unwrap();
    blinker.shutdown();

    let journal = board.ownership_journal();
    assert!(!journal.contains(&BoardOp::Acquired(BUTTON)));
    assert_eq!(
        journal,
        [
            BoardOp::Acquired(LED),
            BoardOp::Direction { line: LED, output: true },
            BoardOp::TimerCreated("blink-timer"),
            BoardOp::Released(LED),
        ]
    );
}

#[test]
fn toggler_creates_no_timer() {
    let mut board = SimBoard::new();
    board.inject(SimFault::TimerRefused);
    let (blinker, _rx) = start(&mut board, &config(Variant::LedToggler)).unwrap();
    assert!(
        !board
            .ownership_journal()
            .iter()
            .any(|op| matches!(op, BoardOp::TimerCreated(_)))
    );
    blinker.shutdown();
}

// ── Failures and unwinding ────────────────────────────────────

#[test]
fn invalid_output_line_acquires_nothing() {
    let mut board = SimBoard::new();
    let cfg = BlinkConfig {
        output_line_id: 99,
        ..BlinkConfig::default()
    };
    let err = start(&mut board, &cfg).err();
    assert_eq!(err, Some(Error::InvalidLineIdentifier(99)));
    assert!(board.journal().is_empty());
}

#[test]
fn busy_input_line_releases_the_output() {
    let mut board = SimBoard::new();
    let mut other = board.clone();
    let _held = other.acquire_input(BUTTON).unwrap();

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(err, Some(Error::ResourceUnavailable(BUTTON)));
    assert_eq!(
        board.ownership_journal(),
        [
            BoardOp::Acquired(BUTTON),
            BoardOp::Acquired(LED),
            BoardOp::Released(LED),
        ]
    );
    assert!(board.is_claimed(BUTTON), "the foreign owner keeps its line");
}

#[test]
fn same_line_for_both_roles_is_unavailable() {
    let mut board = SimBoard::new();
    let cfg = BlinkConfig {
        input_line_id: LED,
        ..BlinkConfig::default()
    };
    assert_eq!(start(&mut board, &cfg).err(), Some(Error::ResourceUnavailable(LED)));
    assert!(!board.is_claimed(LED));
}

#[test]
fn direction_failure_unwinds_both_lines() {
    let mut board = SimBoard::new();
    board.inject(SimFault::Direction(BUTTON));

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(err, Some(Error::DirectionConfigurationFailed(BUTTON)));
    assert_eq!(
        board.ownership_journal(),
        [
            BoardOp::Acquired(LED),
            BoardOp::Acquired(BUTTON),
            BoardOp::Direction { line: LED, output: true },
            BoardOp::Released(BUTTON),
            BoardOp::Released(LED),
        ]
    );
}

#[test]
fn timer_refusal_unwinds_before_the_dispatcher_exists() {
    let mut board = SimBoard::new();
    board.inject(SimFault::TimerRefused);

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(err, Some(Error::TimerCreationFailed));
    assert!(nothing_claimed(&board));
}

#[test]
fn refused_worker_unwinds_without_subscribing() {
    let mut board = SimBoard::new();
    board.inject(SimFault::WorkerRefused);

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(err, Some(Error::DispatcherCreationFailed));
    assert_eq!(
        board.ownership_journal(),
        [
            BoardOp::Acquired(LED),
            BoardOp::Acquired(BUTTON),
            BoardOp::Direction { line: LED, output: true },
            BoardOp::Direction { line: BUTTON, output: false },
            BoardOp::TimerCreated("blink-timer"),
            BoardOp::Released(BUTTON),
            BoardOp::Released(LED),
        ]
    );
    assert!(nothing_claimed(&board));
}

#[test]
fn simple_blinker_needs_no_worker() {
    let mut board = SimBoard::new();
    board.inject(SimFault::WorkerRefused);
    let (blinker, _rx) = start(&mut board, &config(Variant::SimpleBlinker)).unwrap();
    blinker.shutdown();
    assert!(nothing_claimed(&board));
}

#[test]
fn unmappable_interrupt_is_a_mapping_failure() {
    let mut board = SimBoard::new();
    board.inject(SimFault::UnmappableIrq(BUTTON));

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(err, Some(Error::InterruptMappingFailed(BUTTON)));

    let journal = board.ownership_journal();
    assert_eq!(
        journal[journal.len() - 2..],
        [BoardOp::Released(BUTTON), BoardOp::Released(LED)]
    );
    assert!(nothing_claimed(&board));
}

#[test]
fn foreign_interrupt_owner_is_already_registered() {
    let mut board = SimBoard::new();
    board.inject(SimFault::ForeignIrqOwner(BUTTON));

    let err = start(&mut board, &config(Variant::LedToggler)).err();
    assert_eq!(
        err,
        Some(Error::InterruptRegistrationFailed(IrqError::AlreadyRegistered(BUTTON)))
    );
    assert!(nothing_claimed(&board));
}

#[test]
fn rejected_registration_carries_the_code() {
    let mut board = SimBoard::new();
    board.inject(SimFault::IrqRejected(BUTTON, -22));

    let err = start(&mut board, &config(Variant::ButtonBlinker)).err();
    assert_eq!(
        err,
        Some(Error::InterruptRegistrationFailed(IrqError::Rejected {
            line: BUTTON,
            code: -22
        }))
    );
    assert!(nothing_claimed(&board));
}

#[test]
fn failed_start_emits_no_events() {
    let mut board = SimBoard::new();
    board.inject(SimFault::UnmappableIrq(BUTTON));
    let (tx, rx) = std::sync::mpsc::channel();

    let res = Blinker::start(
        &mut board,
        &config(Variant::ButtonBlinker),
        Box::new(ChannelSink(tx)),
    );
    assert!(res.is_err());
    assert!(rx.try_recv().is_err(), "neither Started nor Stopped");
}

#[test]
fn restart_after_a_failed_start() {
    let mut board = SimBoard::new();
    board.inject(SimFault::Direction(LED));
    assert!(start(&mut board, &config(Variant::ButtonBlinker)).is_err());

    board.clear_faults();
    let (blinker, _rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    assert!(board.is_subscribed(BUTTON));
    blinker.shutdown();
    assert!(nothing_claimed(&board));
}

#[test]
fn invalid_parameters_fail_before_touching_the_board() {
    let mut board = SimBoard::new();
    let cfg = BlinkConfig {
        variant: Variant::SimpleBlinker,
        period_ms: 0,
        ..BlinkConfig::default()
    };
    assert_eq!(
        start(&mut board, &cfg).err(),
        Some(Error::Config(ConfigError::InvalidValue("period_ms")))
    );
    assert!(board.journal().is_empty());
}
