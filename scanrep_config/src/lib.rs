#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the scan repeatability rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The flat `key,value` config CSV used by older installs is read by key
//!   and overlaid on top of the TOML values.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncoderCfg {
    /// I2C bus number (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// 7-bit device address.
    pub address: u16,
    /// Linear distance per encoder tick. Run `scanrep calibrate` to measure it.
    pub calibration: f64,
    pub poll_ms: u64,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x36,
            calibration: 1.8122e-05,
            poll_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoadCellCfg {
    pub port: String,
    pub baud: u32,
    pub poll_ms: u64,
    /// Serial read timeout; a timed-out read counts as an empty line.
    pub read_timeout_ms: u64,
    /// The board prints a banner after opening the port; wait it out.
    pub startup_delay_ms: u64,
}

impl Default for LoadCellCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            poll_ms: 60,
            read_timeout_ms: 100,
            startup_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ButtonCfg {
    /// BCM GPIO number.
    pub pin: u8,
    pub debounce_ms: u64,
    pub poll_ms: u64,
}

impl Default for ButtonCfg {
    fn default() -> Self {
        Self {
            pin: 4,
            debounce_ms: 50,
            poll_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayCfg {
    pub refresh_ms: u64,
    pub position_error_margin: f64,
    pub position_display_sensitivity: f64,
    pub force_error_margin: f64,
    pub force_display_sensitivity: f64,
    /// Indicator bar width in display units.
    pub width: f64,
    /// Half-width of the indicator marker.
    pub box_size: f64,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            refresh_ms: 50,
            position_error_margin: 0.3,
            position_display_sensitivity: 50.0,
            force_error_margin: 0.1,
            force_display_sensitivity: 30.0,
            width: 200.0,
            box_size: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageCfg {
    /// Patient index CSV.
    pub patients_file: String,
    /// Directory holding one sample CSV per scan.
    pub data_dir: String,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            patients_file: "patients.csv".to_string(),
            data_dir: "patient_scan_data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub encoder: EncoderCfg,
    pub load_cell: LoadCellCfg,
    pub button: ButtonCfg,
    pub display: DisplayCfg,
    pub storage: StorageCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Encoder
        if self.encoder.poll_ms == 0 {
            eyre::bail!("encoder.poll_ms must be >= 1");
        }
        if !self.encoder.calibration.is_finite() || self.encoder.calibration == 0.0 {
            eyre::bail!("encoder.calibration must be finite and non-zero");
        }
        if self.encoder.address > 0x7F {
            eyre::bail!("encoder.address must be a 7-bit i2c address");
        }

        // Load cell
        if self.load_cell.poll_ms == 0 {
            eyre::bail!("load_cell.poll_ms must be >= 1");
        }
        if self.load_cell.baud == 0 {
            eyre::bail!("load_cell.baud must be > 0");
        }
        if self.load_cell.read_timeout_ms == 0 {
            eyre::bail!("load_cell.read_timeout_ms must be >= 1");
        }
        if self.load_cell.port.trim().is_empty() {
            eyre::bail!("load_cell.port must not be empty");
        }

        // Button
        if self.button.poll_ms == 0 {
            eyre::bail!("button.poll_ms must be >= 1");
        }
        if self.button.debounce_ms > 5_000 {
            eyre::bail!("button.debounce_ms is unreasonably large (>5s)");
        }

        // Display
        let d = &self.display;
        if d.refresh_ms == 0 {
            eyre::bail!("display.refresh_ms must be >= 1");
        }
        for (name, margin) in [
            ("position_error_margin", d.position_error_margin),
            ("force_error_margin", d.force_error_margin),
        ] {
            if !(margin.is_finite() && margin > 0.0) {
                eyre::bail!("display.{name} must be > 0");
            }
        }
        for (name, sens) in [
            ("position_display_sensitivity", d.position_display_sensitivity),
            ("force_display_sensitivity", d.force_display_sensitivity),
        ] {
            if !sens.is_finite() || sens < 0.0 {
                eyre::bail!("display.{name} must be >= 0");
            }
        }
        if !(d.width.is_finite() && d.width > 0.0) {
            eyre::bail!("display.width must be > 0");
        }
        if !d.box_size.is_finite() || d.box_size < 0.0 || d.box_size * 2.0 > d.width {
            eyre::bail!("display.box_size must be in [0, width/2]");
        }

        // Storage
        if self.storage.patients_file.trim().is_empty() {
            eyre::bail!("storage.patients_file must not be empty");
        }
        if self.storage.data_dir.trim().is_empty() {
            eyre::bail!("storage.data_dir must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }

    /// Overlay values from the flat config CSV. Keys that are absent leave
    /// the TOML value untouched.
    pub fn apply_legacy(&mut self, legacy: &LegacyConfig) {
        if let Some(v) = legacy.get(KEY_POSITION_ERROR_MARGIN) {
            self.display.position_error_margin = v;
        }
        if let Some(v) = legacy.get(KEY_POSITION_SENSITIVITY) {
            self.display.position_display_sensitivity = v;
        }
        if let Some(v) = legacy.get(KEY_FORCE_ERROR_MARGIN) {
            self.display.force_error_margin = v;
        }
        if let Some(v) = legacy.get(KEY_FORCE_SENSITIVITY) {
            self.display.force_display_sensitivity = v;
        }
        // Stored with the rail direction inverted.
        if let Some(v) = legacy.get(KEY_ENCODER_CALIBRATION) {
            self.encoder.calibration = -v;
        }
    }
}

pub const KEY_POSITION_ERROR_MARGIN: &str = "position_error_margin";
pub const KEY_POSITION_SENSITIVITY: &str = "position_display_sensitivity";
pub const KEY_FORCE_ERROR_MARGIN: &str = "force_error_margin";
pub const KEY_FORCE_SENSITIVITY: &str = "force_display_sensitivity";
pub const KEY_ENCODER_CALIBRATION: &str = "encoder_calibration";

/// Defaults written when no config CSV exists yet.
pub const LEGACY_DEFAULTS: [(&str, f64); 5] = [
    (KEY_POSITION_ERROR_MARGIN, 0.3),
    (KEY_POSITION_SENSITIVITY, 50.0),
    (KEY_FORCE_ERROR_MARGIN, 0.1),
    (KEY_FORCE_SENSITIVITY, 30.0),
    (KEY_ENCODER_CALIBRATION, -1.8122e-05),
];

const KNOWN_KEYS: [&str; 5] = [
    KEY_POSITION_ERROR_MARGIN,
    KEY_POSITION_SENSITIVITY,
    KEY_FORCE_ERROR_MARGIN,
    KEY_FORCE_SENSITIVITY,
    KEY_ENCODER_CALIBRATION,
];

/// Flat `key,value` config, looked up by key.
#[derive(Debug, Default, Clone)]
pub struct LegacyConfig {
    values: BTreeMap<String, f64>,
}

impl LegacyConfig {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn load_legacy_csv(path: &Path) -> eyre::Result<LegacyConfig> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open config CSV {:?}: {}", path, e))?;

    let mut values = BTreeMap::new();
    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| eyre::eyre!("invalid config CSV row {}: {}", idx + 1, e))?;
        let key = rec.get(0).unwrap_or_default();
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        if rec.len() != 2 {
            eyre::bail!(
                "config CSV row {} must have exactly 2 fields (key,value), got {}",
                idx + 1,
                rec.len()
            );
        }
        if !KNOWN_KEYS.contains(&key) {
            tracing::debug!(key, "ignoring unknown config key");
            continue;
        }
        let raw = rec.get(1).unwrap_or_default();
        let value: f64 = raw
            .parse()
            .map_err(|_| eyre::eyre!("config key {key} has non-numeric value {raw:?}"))?;
        values.insert(key.to_string(), value);
    }
    Ok(LegacyConfig { values })
}

/// Create the config CSV with defaults when it does not exist.
/// Returns `true` if the file was written.
pub fn write_default_legacy_csv(path: &Path) -> eyre::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| eyre::eyre!("create config CSV {:?}: {}", path, e))?;
    for (key, value) in LEGACY_DEFAULTS {
        wtr.write_record([key.to_string(), value.to_string()])?;
    }
    wtr.flush()?;
    Ok(true)
}
