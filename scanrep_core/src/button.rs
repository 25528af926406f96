//! Debounced push-button input.
//!
//! The pin is polled on a timer. A level change is accepted only when more
//! than the debounce interval has passed since the previous accepted change;
//! everything else, including a bounce back to the old level, is ignored.
//! Accepted changes are delivered to one observer as an [`Edge`].
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use scanrep_traits::{Clock, DigitalInput};

use crate::config::DebounceCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::timer::RepeatingTimer;

/// Direction of an accepted level change. With active-low wiring `Falling`
/// is a press and `Rising` a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
        }
    }
}

/// Pure debounce state machine.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    previous: bool,
    last_transition: Instant,
    interval: Duration,
}

impl Debouncer {
    pub fn new(initial_level: bool, now: Instant, interval: Duration) -> Self {
        Self {
            previous: initial_level,
            last_transition: now,
            interval,
        }
    }

    /// Feed one sample. Returns the edge if this sample is an accepted
    /// transition.
    pub fn poll(&mut self, level: bool, now: Instant) -> Option<Edge> {
        if level == self.previous {
            return None;
        }
        if now.saturating_duration_since(self.last_transition) <= self.interval {
            return None;
        }
        self.previous = level;
        self.last_transition = now;
        Some(if level { Edge::Rising } else { Edge::Falling })
    }

    pub fn level(&self) -> bool {
        self.previous
    }
}

type Observer = Arc<dyn Fn(Edge) + Send + Sync>;

struct InputShared<P, C> {
    pin: Mutex<P>,
    debouncer: Mutex<Debouncer>,
    observer: Mutex<Option<Observer>>,
    clock: C,
    closed: AtomicBool,
}

impl<P: DigitalInput, C: Clock> InputShared<P, C> {
    fn tick(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let level = {
            let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
            match pin.is_high() {
                Ok(level) => level,
                Err(e) => {
                    let e = map_hw_error(e.as_ref());
                    tracing::warn!(error = %e, "button read failed");
                    return;
                }
            }
        };
        let edge = self
            .debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll(level, self.clock.now());
        let Some(edge) = edge else {
            return;
        };
        tracing::debug!(edge = edge.as_str(), "button edge");
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(edge);
        }
    }
}

/// Polled, debounced digital input with a single edge observer.
///
/// The observer runs on the poll thread; keep it short or it delays the
/// next edge.
pub struct DebouncedInput<P, C> {
    shared: Arc<InputShared<P, C>>,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl<P, C> DebouncedInput<P, C>
where
    P: DigitalInput + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Build without polling. The initial level is read from the pin;
    /// a failed read assumes released (high).
    pub fn new(mut pin: P, interval: Duration, clock: C) -> Self {
        let initial = pin.is_high().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "initial button read failed; assuming released");
            true
        });
        let debouncer = Debouncer::new(initial, clock.now(), interval);
        Self {
            shared: Arc::new(InputShared {
                pin: Mutex::new(pin),
                debouncer: Mutex::new(debouncer),
                observer: Mutex::new(None),
                clock,
                closed: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn spawn(pin: P, cfg: DebounceCfg, clock: C) -> Result<Self> {
        let input = Self::new(pin, cfg.interval, clock);
        let shared = input.shared.clone();
        let timer = RepeatingTimer::start("button-poll", cfg.poll_period, move || {
            shared.tick();
        })?;
        *input.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(timer);
        Ok(input)
    }

    /// Replace the edge observer.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(Edge) + Send + Sync + 'static,
    {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(observer));
    }

    pub fn clear_observer(&self) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Sample the pin once on the caller's thread.
    pub fn poll_once(&self) {
        self.shared.tick();
    }

    /// Last accepted level.
    pub fn level(&self) -> bool {
        self.shared
            .debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .level()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(timer);
        self.clear_observer();
        tracing::debug!("button input closed");
    }
}

impl<P, C> Drop for DebouncedInput<P, C> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        drop(
            self.timer
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}
