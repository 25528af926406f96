//! Repeating timer lifecycle: periodic firing, cancellation, and cleanup.
use scanrep_core::RepeatingTimer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn fires_repeatedly_until_cancelled() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let mut timer = RepeatingTimer::start("t", Duration::from_millis(5), move || {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    assert!(wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) >= 3));
    timer.stop();
    let after_stop = hits.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(hits.load(Ordering::SeqCst), after_stop);
}

#[test]
fn first_call_waits_one_period() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let timer = RepeatingTimer::start("slow", Duration::from_millis(300), move || {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    drop(timer);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn drop_cancels_promptly_even_with_long_period() {
    let timer = RepeatingTimer::start("long", Duration::from_secs(60), || {}).unwrap();
    let t0 = Instant::now();
    drop(timer);
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn drop_waits_for_in_flight_callback() {
    let done = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));
    let (d, s) = (done.clone(), started.clone());
    let timer = RepeatingTimer::start("busy", Duration::from_millis(2), move || {
        s.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        d.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert!(wait_until(Duration::from_secs(2), || started.load(Ordering::SeqCst) > 0));
    drop(timer);
    // whatever started has finished once drop returns
    assert_eq!(
        started.load(Ordering::SeqCst),
        done.load(Ordering::SeqCst)
    );
}

#[test]
fn many_timers_dont_leak_threads() {
    for i in 0..20 {
        let timer =
            RepeatingTimer::start(&format!("t{i}"), Duration::from_millis(1), || {}).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        timer.cancel();
        drop(timer);
    }
}
