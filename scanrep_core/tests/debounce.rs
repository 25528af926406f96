use proptest::prelude::*;
use rstest::rstest;
use scanrep_core::button::{DebouncedInput, Debouncer, Edge};
use scanrep_core::config::DebounceCfg;
use scanrep_hardware::SimulatedButton;
use scanrep_traits::clock::MonotonicClock;
use scanrep_traits::clock::test_clock::TestClock;
use scanrep_traits::{BoxError, Clock, DigitalInput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_millis(50);

#[rstest]
// (ms since start, level) samples -> edges accepted
#[case(&[(10, false)], &[])]
#[case(&[(51, false)], &[Edge::Falling])]
#[case(&[(51, false), (80, true), (200, true)], &[Edge::Falling, Edge::Rising])]
#[case(&[(60, false), (61, true), (62, false), (63, true)], &[Edge::Falling])]
#[case(&[(60, false), (110, true), (111, true)], &[Edge::Falling, Edge::Rising])]
fn accepts_only_spaced_transitions(#[case] samples: &[(u64, bool)], #[case] expected: &[Edge]) {
    let t0 = Instant::now();
    let mut d = Debouncer::new(true, t0, WINDOW);
    let edges: Vec<Edge> = samples
        .iter()
        .filter_map(|&(ms, level)| d.poll(level, t0 + Duration::from_millis(ms)))
        .collect();
    assert_eq!(edges, expected);
}

proptest! {
    // Accepted edges alternate direction and are spaced by more than the
    // debounce window, whatever the input noise.
    #[test]
    fn accepted_edges_are_spaced_and_alternate(
        levels in prop::collection::vec(any::<bool>(), 1..300),
        step_ms in 1u64..30,
    ) {
        let t0 = Instant::now();
        let mut d = Debouncer::new(true, t0, WINDOW);
        let mut accepted: Vec<(Instant, Edge)> = Vec::new();
        for (i, level) in levels.into_iter().enumerate() {
            let now = t0 + Duration::from_millis(step_ms * (i as u64 + 1));
            if let Some(edge) = d.poll(level, now) {
                accepted.push((now, edge));
            }
        }
        let mut last = t0;
        let mut expect = Edge::Falling;
        for (at, edge) in accepted {
            prop_assert!(at - last > WINDOW);
            prop_assert_eq!(edge, expect);
            expect = if edge == Edge::Falling { Edge::Rising } else { Edge::Falling };
            last = at;
        }
    }

    // A level held longer than the window after a change is always seen.
    #[test]
    fn well_spaced_toggles_each_fire_once(gaps in prop::collection::vec(51u64..500, 1..20)) {
        let t0 = Instant::now();
        let mut d = Debouncer::new(true, t0, WINDOW);
        let mut now = t0;
        let mut level = true;
        let mut fired = 0usize;
        for gap in &gaps {
            now += Duration::from_millis(*gap);
            level = !level;
            if d.poll(level, now).is_some() {
                fired += 1;
            }
        }
        prop_assert_eq!(fired, gaps.len());
    }
}

/// Pin whose level the test sets directly.
#[derive(Clone)]
struct SharedPin(Arc<AtomicBool>);

impl DigitalInput for SharedPin {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

struct BrokenPin;

impl DigitalInput for BrokenPin {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        Err("gpio read failed".into())
    }
}

#[test]
fn manual_polling_with_test_clock() {
    let level = Arc::new(AtomicBool::new(true));
    let clock = TestClock::new();
    let input = DebouncedInput::new(SharedPin(level.clone()), WINDOW, clock.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    input.set_observer(move |e| s.lock().unwrap().push(e));

    level.store(false, Ordering::SeqCst);
    clock.advance_ms(20);
    input.poll_once();
    assert!(seen.lock().unwrap().is_empty());

    clock.advance_ms(40);
    input.poll_once();
    assert_eq!(*seen.lock().unwrap(), vec![Edge::Falling]);
    assert!(!input.level());

    // bounce inside the window
    level.store(true, Ordering::SeqCst);
    clock.advance_ms(10);
    input.poll_once();
    level.store(false, Ordering::SeqCst);
    clock.advance_ms(10);
    input.poll_once();
    assert_eq!(seen.lock().unwrap().len(), 1);

    level.store(true, Ordering::SeqCst);
    clock.advance_ms(60);
    input.poll_once();
    assert_eq!(*seen.lock().unwrap(), vec![Edge::Falling, Edge::Rising]);
}

#[test]
fn initial_read_failure_assumes_released() {
    let clock = TestClock::new();
    let input = DebouncedInput::new(BrokenPin, WINDOW, clock.clone());
    assert!(input.level());
    clock.advance_ms(100);
    // failing reads never produce edges
    input.poll_once();
    assert!(input.level());
}

#[test]
fn background_poll_reports_press_and_release() {
    let (pin, handle) = SimulatedButton::new();
    let cfg = DebounceCfg {
        poll_period: Duration::from_millis(2),
        interval: Duration::from_millis(10),
    };
    let input = DebouncedInput::spawn(pin, cfg, MonotonicClock::new()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    input.set_observer(move |e| s.lock().unwrap().push(e));

    std::thread::sleep(Duration::from_millis(30));
    handle.press();
    std::thread::sleep(Duration::from_millis(60));
    handle.release();

    let clock = MonotonicClock::new();
    let start = clock.now();
    while seen.lock().unwrap().len() < 2 && clock.ms_since(start) < 2_000 {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(*seen.lock().unwrap(), vec![Edge::Falling, Edge::Rising]);

    input.close();
    input.close();
    handle.press();
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(seen.lock().unwrap().len(), 2);
}
