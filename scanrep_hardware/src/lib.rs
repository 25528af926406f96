//! Device drivers for the scan rig: simulated devices for development and
//! tests, and Raspberry Pi drivers behind the `hardware` feature.
pub mod error;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod as5600;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod button;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod openscale;

use scanrep_traits::{AngleSensor, BoxError, DigitalInput, SerialLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Ticks per encoder revolution (12-bit).
pub const ENCODER_TICKS: u32 = 4096;

/// Simulated rotary encoder riding on the rail.
///
/// The angle is shared with a [`SimEncoderHandle`] so tests and the CLI can
/// move the carriage while the tracker polls.
pub struct SimulatedEncoder {
    angle: Arc<AtomicU32>,
}

/// Control side of a [`SimulatedEncoder`].
#[derive(Clone)]
pub struct SimEncoderHandle {
    angle: Arc<AtomicU32>,
}

impl SimulatedEncoder {
    pub fn new(start_angle: u16) -> (Self, SimEncoderHandle) {
        let angle = Arc::new(AtomicU32::new(u32::from(start_angle) % ENCODER_TICKS));
        (
            Self {
                angle: angle.clone(),
            },
            SimEncoderHandle { angle },
        )
    }
}

impl SimEncoderHandle {
    /// Rotate by a signed number of ticks, wrapping at one revolution.
    pub fn rotate(&self, ticks: i32) {
        let _ = self
            .angle
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |a| {
                let next = (i64::from(a) + i64::from(ticks)).rem_euclid(i64::from(ENCODER_TICKS));
                Some(next as u32)
            });
    }

    pub fn angle(&self) -> u16 {
        self.angle.load(Ordering::Relaxed) as u16
    }
}

impl AngleSensor for SimulatedEncoder {
    fn read_raw_angle(&mut self) -> Result<u16, BoxError> {
        let raw = self.angle.load(Ordering::Relaxed) as u16;
        tracing::trace!(raw, "simulated encoder read");
        Ok(raw)
    }
}

/// Simulated OpenScale board streaming `timestamp,value,unit,` records.
pub struct SimulatedLoadCell {
    force_bits: Arc<AtomicU64>,
    millis: u64,
    pace: Duration,
    unit: String,
}

/// Control side of a [`SimulatedLoadCell`].
#[derive(Clone)]
pub struct SimLoadCellHandle {
    force_bits: Arc<AtomicU64>,
}

impl SimulatedLoadCell {
    pub fn new(pace: Duration) -> (Self, SimLoadCellHandle) {
        let force_bits = Arc::new(AtomicU64::new(0f64.to_bits()));
        (
            Self {
                force_bits: force_bits.clone(),
                millis: 0,
                pace,
                unit: "kgs".to_string(),
            },
            SimLoadCellHandle { force_bits },
        )
    }
}

impl SimLoadCellHandle {
    pub fn set_force(&self, force: f64) {
        self.force_bits.store(force.to_bits(), Ordering::Relaxed);
    }

    pub fn force(&self) -> f64 {
        f64::from_bits(self.force_bits.load(Ordering::Relaxed))
    }
}

impl SerialLink for SimulatedLoadCell {
    fn read_line(&mut self) -> Result<String, BoxError> {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        self.millis = self.millis.saturating_add(self.pace.as_millis() as u64);
        let force = f64::from_bits(self.force_bits.load(Ordering::Relaxed));
        Ok(format!("{},{:.3},{},", self.millis, force, self.unit))
    }
}

/// Simulated push button wired active-low with a pull-up.
pub struct SimulatedButton {
    level: Arc<AtomicBool>,
}

/// Control side of a [`SimulatedButton`].
#[derive(Clone)]
pub struct SimButtonHandle {
    level: Arc<AtomicBool>,
}

impl SimulatedButton {
    pub fn new() -> (Self, SimButtonHandle) {
        // Pull-up keeps the line high while released.
        let level = Arc::new(AtomicBool::new(true));
        (
            Self {
                level: level.clone(),
            },
            SimButtonHandle { level },
        )
    }
}

impl SimButtonHandle {
    pub fn press(&self) {
        self.level.store(false, Ordering::Relaxed);
    }

    pub fn release(&self) {
        self.level.store(true, Ordering::Relaxed);
    }

    pub fn is_pressed(&self) -> bool {
        !self.level.load(Ordering::Relaxed)
    }
}

impl DigitalInput for SimulatedButton {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        Ok(self.level.load(Ordering::Relaxed))
    }
}
