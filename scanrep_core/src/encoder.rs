//! Rail position from an absolute rotary encoder.
//!
//! The sensor reports a 12-bit angle that wraps every revolution. The tracker
//! accumulates the signed difference between consecutive polls into a
//! continuous tick count, measured from a movable home, and scales it to
//! distance with a calibration factor.
//!
//! Continuity assumes the shaft turns less than half a revolution between two
//! polls.
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use scanrep_traits::AngleSensor;

use crate::config::TrackerCfg;
use crate::error::{Result, ScanError};
use crate::hw_error::map_hw_error;
use crate::timer::RepeatingTimer;

/// Ticks per revolution.
pub const TICKS_PER_REV: i64 = 4096;
const HALF_REV: i64 = TICKS_PER_REV / 2;
/// Largest raw reading the sensor may report.
pub const MAX_RAW_ANGLE: u16 = (TICKS_PER_REV - 1) as u16;

/// Signed shortest-path difference between two raw readings, in
/// `[-2047, 2048]`.
#[inline]
pub fn unwrap_delta(last_raw: u16, raw: u16) -> i64 {
    let mut delta = (i64::from(raw) - i64::from(last_raw)).rem_euclid(TICKS_PER_REV);
    if delta > HALF_REV {
        delta -= TICKS_PER_REV;
    }
    delta
}

/// Wraparound-free tick accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unwrapper {
    last_raw: u16,
    unwrapped: i64,
    home: i64,
}

impl Unwrapper {
    /// Start at `initial_raw` with home at the current position.
    pub fn new(initial_raw: u16) -> Self {
        Self {
            last_raw: initial_raw,
            unwrapped: 0,
            home: 0,
        }
    }

    /// Feed one raw reading; returns ticks relative to home.
    pub fn update(&mut self, raw: u16) -> i64 {
        self.unwrapped += unwrap_delta(self.last_raw, raw);
        self.last_raw = raw;
        self.relative()
    }

    pub fn set_home(&mut self) {
        self.home = self.unwrapped;
    }

    pub fn relative(&self) -> i64 {
        self.unwrapped - self.home
    }

    pub fn unwrapped(&self) -> i64 {
        self.unwrapped
    }

    pub fn last_raw(&self) -> u16 {
        self.last_raw
    }
}

/// Distance per tick, from a known rail length and the tick count measured
/// over it.
pub fn calibration_factor(distance: f64, raw_end: i64) -> Result<f64> {
    if !distance.is_finite() {
        return Err(ScanError::Config(format!(
            "distance must be finite, got {distance}"
        )));
    }
    if raw_end == 0 {
        return Err(ScanError::Config(
            "encoder did not move; cannot derive a calibration factor".into(),
        ));
    }
    Ok(distance / raw_end as f64)
}

struct Device<S> {
    sensor: S,
    unwrap: Unwrapper,
}

struct TrackerShared<S> {
    device: Mutex<Device<S>>,
    buffered_ticks: AtomicI64,
    calibration_bits: AtomicU64,
    closed: AtomicBool,
}

impl<S: AngleSensor> TrackerShared<S> {
    fn read_raw(device: &mut Device<S>) -> Result<u16> {
        let raw = device
            .sensor
            .read_raw_angle()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        if raw > MAX_RAW_ANGLE {
            return Err(ScanError::Transport(format!(
                "raw angle {raw} out of range 0..={MAX_RAW_ANGLE}"
            )));
        }
        Ok(raw)
    }

    /// Poll once. With `buffer`, the result is stored before the device
    /// lock is released so a concurrent `set_home` cannot be overwritten.
    fn compute(&self, buffer: bool) -> Result<i64> {
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = Self::read_raw(&mut device)?;
        let before = device.unwrap.unwrapped();
        let relative = device.unwrap.update(raw);
        if buffer {
            self.buffered_ticks.store(relative, Ordering::Release);
        }
        tracing::trace!(raw, delta = device.unwrap.unwrapped() - before, relative, "encoder poll");
        Ok(relative)
    }

    fn tick(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.compute(true) {
            tracing::warn!(error = %e, "encoder poll failed; keeping last position");
        }
    }
}

/// Background-polled rail position.
///
/// Readers call [`get_position`](Self::get_position), which never touches the
/// bus. Only the poll thread (or an explicit [`refresh`](Self::refresh))
/// writes the buffered value.
pub struct PositionTracker<S> {
    shared: Arc<TrackerShared<S>>,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl<S> PositionTracker<S>
where
    S: AngleSensor + Send + 'static,
{
    /// Take one reading to seed the unwrapper and home at it. Polling does
    /// not start until [`start`](Self::start).
    pub fn new(mut sensor: S, calibration: f64) -> Result<Self> {
        let initial = sensor
            .read_raw_angle()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        if initial > MAX_RAW_ANGLE {
            return Err(ScanError::Transport(format!(
                "raw angle {initial} out of range 0..={MAX_RAW_ANGLE}"
            )));
        }
        tracing::debug!(raw = initial, calibration, "encoder homed at startup");
        Ok(Self {
            shared: Arc::new(TrackerShared {
                device: Mutex::new(Device {
                    sensor,
                    unwrap: Unwrapper::new(initial),
                }),
                buffered_ticks: AtomicI64::new(0),
                calibration_bits: AtomicU64::new(calibration.to_bits()),
                closed: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        })
    }

    /// Construct and start polling at `cfg.poll_period`.
    pub fn spawn(sensor: S, cfg: TrackerCfg) -> Result<Self> {
        let tracker = Self::new(sensor, cfg.calibration)?;
        tracker.start(cfg.poll_period)?;
        Ok(tracker)
    }

    pub fn start(&self, period: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(ScanError::invalid("position tracker is closed"));
        }
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ScanError::invalid("position tracker already polling"));
        }
        let shared = self.shared.clone();
        *slot = Some(RepeatingTimer::start("encoder-poll", period, move || {
            shared.tick();
        })?);
        Ok(())
    }

    /// Single blocking query of the sensor. Does not update the tracker.
    pub fn read_raw_angle(&self) -> Result<u16> {
        let mut device = self.shared.device.lock().unwrap_or_else(PoisonError::into_inner);
        TrackerShared::read_raw(&mut device)
    }

    /// Read the sensor, fold the movement into the tick count, and return
    /// ticks relative to home. After close this returns the frozen value.
    pub fn compute_unwrapped_position(&self) -> Result<i64> {
        if self.is_closed() {
            return Ok(self.raw_position());
        }
        self.shared.compute(false)
    }

    /// One poll on the caller's thread; same as a background tick but errors
    /// are returned instead of logged.
    pub fn refresh(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.shared.compute(true)?;
        Ok(())
    }

    /// Make the current position the zero reference.
    pub fn set_home(&self) {
        if self.is_closed() {
            return;
        }
        let mut device = self.shared.device.lock().unwrap_or_else(PoisonError::into_inner);
        device.unwrap.set_home();
        self.shared.buffered_ticks.store(0, Ordering::Release);
        tracing::debug!(unwrapped = device.unwrap.unwrapped(), "encoder home set");
    }

    /// Last buffered position in calibrated distance units.
    pub fn get_position(&self) -> f64 {
        self.raw_position() as f64 * self.calibration()
    }

    /// Last buffered position in ticks relative to home.
    pub fn raw_position(&self) -> i64 {
        self.shared.buffered_ticks.load(Ordering::Acquire)
    }

    /// Current shaft angle in degrees, read directly from the sensor.
    pub fn read_degrees(&self) -> Result<f64> {
        let raw = self.read_raw_angle()?;
        Ok(f64::from(raw) * 360.0 / TICKS_PER_REV as f64)
    }

    pub fn calibration(&self) -> f64 {
        f64::from_bits(self.shared.calibration_bits.load(Ordering::Acquire))
    }

    pub fn set_calibration(&self, calibration: f64) {
        self.shared
            .calibration_bits
            .store(calibration.to_bits(), Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop polling. The buffered position is frozen once this returns.
    /// Further calls are no-ops.
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
        tracing::debug!(ticks = self.raw_position(), "position tracker closed");
    }
}

impl<S> Drop for PositionTracker<S> {
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
