//! Device assembly: open the encoder, load cell, and button (simulated or
//! real) and start their poll threads.

use scanrep_config::Config;
use scanrep_core::{DebounceCfg, DebouncedInput, ForceCfg, ForceReader, PositionTracker, TrackerCfg};
use scanrep_hardware::{SimButtonHandle, SimEncoderHandle, SimLoadCellHandle};
use scanrep_traits::{AngleSensor, DigitalInput, MonotonicClock, SerialLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub type Tracker = PositionTracker<Box<dyn AngleSensor + Send>>;
pub type Reader = ForceReader<Box<dyn SerialLink + Send>>;
pub type Button = DebouncedInput<Box<dyn DigitalInput + Send>, MonotonicClock>;

/// Largest single move applied to the simulated rail between two encoder
/// reads; anything above half a revolution would alias.
const RAIL_STEP: i64 = 1024;
/// Pace of the simulated OpenScale output.
const SIM_LOADCELL_PACE: Duration = Duration::from_millis(5);
const SIM_START_ANGLE: u16 = 2048;

/// Opened but not yet polling.
pub struct Devices {
    pub encoder: Box<dyn AngleSensor + Send>,
    pub link: Box<dyn SerialLink + Send>,
    pub button: Box<dyn DigitalInput + Send>,
    pub sim: Option<SimControls>,
}

/// Handles onto the simulated devices, driven by stdin commands.
pub struct SimControls {
    pub rail: SimEncoderHandle,
    pub cell: SimLoadCellHandle,
    pub button: SimButtonHandle,
    hold: Duration,
}

impl SimControls {
    /// Press and release, holding each level long enough to pass the debouncer.
    pub fn click(&self) {
        self.button.press();
        std::thread::sleep(self.hold);
        self.button.release();
        std::thread::sleep(self.hold);
    }

    /// Move the carriage by `ticks`, reading the encoder after every chunk.
    pub fn move_rail(&self, ticks: i64, tracker: &Tracker) -> scanrep_core::Result<()> {
        let mut left = ticks;
        while left != 0 {
            let step = left.clamp(-RAIL_STEP, RAIL_STEP);
            self.rail.rotate(i32::try_from(step).unwrap_or_default());
            tracker.refresh()?;
            left -= step;
        }
        Ok(())
    }

    pub fn set_force(&self, force: f64) {
        self.cell.set_force(force);
    }
}

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
pub(crate) fn simulated(cfg: &Config) -> Devices {
    let (encoder, rail) = scanrep_hardware::SimulatedEncoder::new(SIM_START_ANGLE);
    let (link, cell) = scanrep_hardware::SimulatedLoadCell::new(SIM_LOADCELL_PACE);
    let (button, press) = scanrep_hardware::SimulatedButton::new();
    let debounce = DebounceCfg::from(&cfg.button);
    let hold = debounce.interval + debounce.poll_period * 3;
    tracing::info!("using simulated devices");
    Devices {
        encoder: Box::new(encoder),
        link: Box::new(link),
        button: Box::new(button),
        sim: Some(SimControls {
            rail,
            cell,
            button: press,
            hold,
        }),
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware(cfg: &Config) -> eyre::Result<Devices> {
    use scanrep_core::hw_error::map_hw_error;
    use scanrep_hardware::as5600::As5600;
    use scanrep_hardware::button::GpioButton;
    use scanrep_hardware::openscale::OpenScale;

    let encoder =
        As5600::new(cfg.encoder.i2c_bus, cfg.encoder.address).map_err(|e| map_hw_error(&e))?;
    match encoder.read_magnitude() {
        Ok(magnitude) => tracing::info!(magnitude, "encoder magnet"),
        Err(e) => tracing::warn!(error = %e, "encoder magnitude unavailable"),
    }

    let link = OpenScale::new(
        &cfg.load_cell.port,
        cfg.load_cell.baud,
        Duration::from_millis(cfg.load_cell.read_timeout_ms),
    )
    .map_err(|e| map_hw_error(&e))?;
    // The board prints its menu banner right after the port opens.
    std::thread::sleep(Duration::from_millis(cfg.load_cell.startup_delay_ms));

    let button = GpioButton::new(cfg.button.pin).map_err(|e| map_hw_error(&e))?;
    tracing::info!(
        i2c_bus = cfg.encoder.i2c_bus,
        port = %cfg.load_cell.port,
        pin = cfg.button.pin,
        "hardware devices opened"
    );
    Ok(Devices {
        encoder: Box::new(encoder),
        link: Box::new(link),
        button: Box::new(button),
        sim: None,
    })
}

pub fn open_devices(cfg: &Config) -> eyre::Result<Devices> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        hardware(cfg)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        Ok(simulated(cfg))
    }
}

/// All three drivers, polling in the background.
pub struct Rig {
    pub tracker: Arc<Tracker>,
    pub reader: Arc<Reader>,
    pub button: Button,
    pub sim: Option<SimControls>,
    closed: AtomicBool,
}

impl Rig {
    pub fn start(devices: Devices, cfg: &Config) -> scanrep_core::Result<Self> {
        let tracker = Arc::new(Tracker::spawn(
            devices.encoder,
            TrackerCfg::from(&cfg.encoder),
        )?);
        let reader = Arc::new(Reader::spawn(devices.link, ForceCfg::from(&cfg.load_cell))?);
        let button = Button::spawn(
            devices.button,
            DebounceCfg::from(&cfg.button),
            MonotonicClock::new(),
        )?;
        Ok(Self {
            tracker,
            reader,
            button,
            sim: devices.sim,
            closed: AtomicBool::new(false),
        })
    }

    /// Stop every poll thread. Only the first call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.button.close();
        self.reader.close();
        self.tracker.close();
        tracing::debug!("devices closed");
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.close();
    }
}
