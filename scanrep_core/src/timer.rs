//! Cancellable fixed-period background task.
//!
//! Each `RepeatingTimer` owns exactly one thread that waits `period`, runs the
//! callback, and repeats until cancelled. Dropping the timer cancels and joins
//! it, so threads never leak.
//!
//! Cancellation is weak: `cancel()` stops any *new* invocation from being
//! scheduled, but a callback that already passed its cancellation check may
//! still run once. Callbacks must therefore be safe no-ops on a closed
//! resource.
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::util::rate_hz;

struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    /// Sleep for `period` unless cancelled first. Returns `true` when the
    /// timer should keep running.
    fn wait(&self, period: Duration) -> bool {
        let Ok(guard) = self.cancelled.lock() else {
            return false;
        };
        match self.wake.wait_timeout_while(guard, period, |cancelled| !*cancelled) {
            Ok((guard, _)) => !*guard,
            Err(_) => false,
        }
    }

    fn cancel(&self) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            *cancelled = true;
        }
        self.wake.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.lock().map(|c| *c).unwrap_or(true)
    }
}

pub struct RepeatingTimer {
    name: String,
    shared: Arc<Shared>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl RepeatingTimer {
    /// Spawn the timer thread. The first invocation happens one `period`
    /// after this returns.
    pub fn start<F>(name: &str, period: Duration, mut callback: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(ScanError::Config(format!("timer {name}: period must be > 0")));
        }
        let shared = Arc::new(Shared {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let shared_bg = shared.clone();
        let thread_name = name.to_string();

        let join_handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while shared_bg.wait(period) {
                    callback();
                }
                tracing::trace!(timer = %thread_name, "timer thread exiting cleanly");
            })
            .map_err(|e| ScanError::Io(format!("spawn timer {name}: {e}")))?;

        let thread_id = join_handle.thread().id();
        tracing::debug!(
            timer = name,
            period_ms = period.as_millis() as u64,
            rate_hz = rate_hz(period),
            "timer started"
        );
        Ok(Self {
            name: name.to_string(),
            shared,
            join_handle: Some(join_handle),
            thread_id,
        })
    }

    /// Stop scheduling further invocations. Does not wait for an in-flight
    /// callback. Safe to call any number of times.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Cancel and wait for the thread to finish. When called from the timer's
    /// own callback the join is skipped; the thread exits after the callback
    /// returns.
    pub fn stop(&mut self) {
        self.shared.cancel();
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        if std::thread::current().id() == self.thread_id {
            return;
        }
        match handle.join() {
            Ok(()) => {
                tracing::trace!(timer = %self.name, "timer thread joined");
            }
            Err(e) => {
                // Callback panicked; log but don't propagate
                tracing::warn!(timer = %self.name, ?e, "timer thread panicked");
            }
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_period_is_rejected() {
        let err = RepeatingTimer::start("zero", Duration::ZERO, || {})
            .err()
            .expect("zero period must fail");
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timer = RepeatingTimer::start("idem", Duration::from_millis(5), || {}).unwrap();
        timer.cancel();
        timer.cancel();
        assert!(timer.is_cancelled());
        timer.stop();
        timer.stop();
    }

    #[test]
    fn stop_from_inside_callback_does_not_deadlock() {
        let slot: Arc<Mutex<Option<RepeatingTimer>>> = Arc::new(Mutex::new(None));
        let runs = Arc::new(AtomicUsize::new(0));
        let (slot_cb, runs_cb) = (slot.clone(), runs.clone());
        let timer = RepeatingTimer::start("self-stop", Duration::from_millis(2), move || {
            runs_cb.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut guard) = slot_cb.try_lock()
                && let Some(t) = guard.as_mut()
            {
                t.stop();
            }
        })
        .unwrap();
        *slot.lock().unwrap() = Some(timer);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while runs.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        std::thread::sleep(Duration::from_millis(30));
        let settled = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), settled);
        drop(slot.lock().unwrap().take());
    }
}
