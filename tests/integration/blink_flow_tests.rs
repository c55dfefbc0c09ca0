//! End-to-end blink behaviour: button edge → dispatcher → controller →
//! timer → LED, on the simulation board with real threads.

use std::time::Duration;

use buttonblink::adapters::sim::{BoardOp, SimBoard};
use buttonblink::app::events::BlinkEvent;
use buttonblink::config::ConfigError;
use buttonblink::{BlinkConfig, BlinkMode, Blinker, Error, Variant};

use super::mock_hw::{Button, config, eventually, gated_sink, next_mode_change, start, wait_for};

const LED: u32 = 18;
const BUTTON: u32 = 22;

/// Press once and wait until the worker has applied it.
fn press_and_settle(button: &mut Button, rx: &std::sync::mpsc::Receiver<BlinkEvent>) -> BlinkEvent {
    assert!(button.press(), "edge rejected");
    next_mode_change(rx).expect("mode change")
}

fn level_writes_since(board: &SimBoard, from: usize) -> usize {
    board.journal()[from..]
        .iter()
        .filter(|op| matches!(op, BoardOp::Level { line: LED, .. }))
        .count()
}

// ── Scenarios ─────────────────────────────────────────────────

#[test]
fn first_press_starts_slow_blink_without_touching_the_led() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    let ev = press_and_settle(&mut button, &rx);
    assert_eq!(
        ev,
        BlinkEvent::ModeChanged {
            from: BlinkMode::Off,
            to: BlinkMode::Slow,
            half_period_ms: Some(1000),
        }
    );
    assert_eq!(blinker.mode(), BlinkMode::Slow);
    // First toggle is a full second away.
    assert!(!board.level(LED));
    assert_eq!(level_writes_since(&board, 0), 0);
}

#[test]
fn very_fast_to_steady_on_then_off() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    for _ in 0..4 {
        press_and_settle(&mut button, &rx);
    }
    assert_eq!(blinker.mode(), BlinkMode::VeryFast);

    let ev = press_and_settle(&mut button, &rx);
    assert_eq!(
        ev,
        BlinkEvent::ModeChanged {
            from: BlinkMode::VeryFast,
            to: BlinkMode::SteadyOn,
            half_period_ms: None,
        }
    );
    assert!(board.level(LED));

    press_and_settle(&mut button, &rx);
    assert_eq!(blinker.mode(), BlinkMode::Off);
    assert!(!board.level(LED));
}

#[test]
fn six_presses_return_to_off() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    for _ in 0..6 {
        press_and_settle(&mut button, &rx);
    }
    assert_eq!(blinker.mode(), BlinkMode::Off);
    assert!(!board.level(LED));
    assert_eq!(blinker.transitions(), 6);
}

#[test]
fn mode_follows_press_count_modulo_six() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    for n in 1..=14usize {
        press_and_settle(&mut button, &rx);
        assert_eq!(blinker.mode(), BlinkMode::Off.advanced_by(n));
    }
}

#[test]
fn presses_during_a_running_task_coalesce() {
    let mut board = SimBoard::new();
    let (sink, rx, release) = gated_sink();
    let blinker = Blinker::start(&mut board, &config(Variant::ButtonBlinker), sink).unwrap();
    let mut button = Button::new(&board, BUTTON);

    // The first task parks in the sink after advancing.
    assert!(button.press());
    next_mode_change(&rx).expect("first task ran");
    // Two more edges while it is parked collapse into one pending task.
    assert!(button.press());
    assert!(button.press());
    release.send(()).unwrap();
    next_mode_change(&rx).expect("second task ran");
    release.send(()).unwrap();

    assert!(eventually(|| blinker.transitions() == 2));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(blinker.transitions(), 2);
    assert_eq!(blinker.mode(), BlinkMode::Medium);
}

// ── Timer-driven behaviour ────────────────────────────────────

#[test]
fn timed_mode_toggles_the_led() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);
    for _ in 0..4 {
        press_and_settle(&mut button, &rx);
    }
    assert_eq!(blinker.mode(), BlinkMode::VeryFast);

    let mark = board.journal().len();
    assert!(
        eventually(|| level_writes_since(&board, mark) >= 3),
        "VeryFast should toggle every 100ms"
    );
}

#[test]
fn no_stale_toggle_after_a_direct_set() {
    let mut board = SimBoard::new();
    let (_blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);
    for _ in 0..4 {
        press_and_settle(&mut button, &rx);
    }
    let mark = board.journal().len();
    assert!(eventually(|| level_writes_since(&board, mark) >= 1));

    press_and_settle(&mut button, &rx);
    let after_set = board.journal().len();
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(level_writes_since(&board, after_set), 0);
    assert!(board.level(LED));
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn contact_bounce_is_filtered() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    let (first, bounce) = button.press_with_bounce(2_000);
    assert!(first);
    assert!(!bounce, "edge 2ms after a press is bounce");
    next_mode_change(&rx).expect("press applied");
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(blinker.transitions(), 1);
}

#[test]
fn zero_debounce_accepts_every_edge() {
    let mut board = SimBoard::new();
    let cfg = BlinkConfig {
        debounce_ms: 0,
        ..config(Variant::LedToggler)
    };
    let (_blinker, _rx) = start(&mut board, &cfg).unwrap();
    assert!(board.rising_edge_at(BUTTON, 10));
    assert!(board.rising_edge_at(BUTTON, 11));
}

// ── Variants ──────────────────────────────────────────────────

#[test]
fn toggler_flips_the_led_per_press() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::LedToggler)).unwrap();
    let mut button = Button::new(&board, BUTTON);

    assert!(button.press());
    assert_eq!(
        wait_for(&rx, |e| matches!(e, BlinkEvent::Toggled { .. })),
        Some(BlinkEvent::Toggled { on: true })
    );
    assert!(board.level(LED));
    assert!(blinker.output_energized());

    assert!(button.press());
    assert_eq!(
        wait_for(&rx, |e| matches!(e, BlinkEvent::Toggled { .. })),
        Some(BlinkEvent::Toggled { on: false })
    );
    assert!(!board.level(LED));
}

#[test]
fn simple_blinker_runs_and_its_period_round_trips() {
    let mut board = SimBoard::new();
    let cfg = BlinkConfig {
        period_ms: 20,
        ..config(Variant::SimpleBlinker)
    };
    let (mut blinker, rx) = start(&mut board, &cfg).unwrap();
    assert_eq!(blinker.period_ms(), Some(20));
    assert!(eventually(|| level_writes_since(&board, 0) >= 3));

    blinker.set_period_ms(35).unwrap();
    assert_eq!(blinker.period_ms(), Some(35));
    assert_eq!(
        wait_for(&rx, |e| matches!(e, BlinkEvent::PeriodChanged { .. })),
        Some(BlinkEvent::PeriodChanged { period_ms: 35 })
    );

    assert_eq!(
        blinker.set_period_ms(0),
        Err(Error::Config(ConfigError::InvalidValue("period_ms")))
    );
    assert_eq!(blinker.period_ms(), Some(35));

    blinker.shutdown();
    let mark = board.journal().len();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(level_writes_since(&board, mark), 0, "timer outlived shutdown");
}

#[test]
fn period_attribute_exists_only_on_the_simple_blinker() {
    let mut board = SimBoard::new();
    let (mut blinker, _rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    assert_eq!(blinker.period_ms(), None);
    assert_eq!(
        blinker.set_period_ms(100),
        Err(Error::Config(ConfigError::NotApplicable("period_ms")))
    );
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn shutdown_while_blinking_stops_the_timer() {
    let mut board = SimBoard::new();
    let (blinker, rx) = start(&mut board, &config(Variant::ButtonBlinker)).unwrap();
    let mut button = Button::new(&board, BUTTON);
    for _ in 0..4 {
        press_and_settle(&mut button, &rx);
    }

    blinker.shutdown();
    let mark = board.journal().len();
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(level_writes_since(&board, mark), 0);
    assert!(!button.press(), "handler gone after shutdown");
}

#[test]
fn pending_press_is_applied_before_shutdown_completes() {
    let mut board = SimBoard::new();
    let (sink, rx, release) = gated_sink();
    let blinker = Blinker::start(&mut board, &config(Variant::ButtonBlinker), sink).unwrap();
    let mut button = Button::new(&board, BUTTON);

    assert!(button.press());
    next_mode_change(&rx).expect("first task parked");
    assert!(button.press());

    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        let _ = release.send(());
        let _ = release.send(());
    });
    blinker.shutdown();
    releaser.join().unwrap();

    assert_eq!(
        next_mode_change(&rx),
        Some(BlinkEvent::ModeChanged {
            from: BlinkMode::Slow,
            to: BlinkMode::Medium,
            half_period_ms: Some(500),
        })
    );
    assert!(wait_for(&rx, |e| *e == BlinkEvent::Stopped).is_some());
}
