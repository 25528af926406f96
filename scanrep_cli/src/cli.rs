//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG: &str = "etc/scanrep.toml";

#[derive(Parser, Debug)]
#[command(name = "scanrep", version, about = "Ultrasound scan repeatability rig")]
pub struct Cli {
    /// Path to config TOML (typed). Defaults to etc/scanrep.toml when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Flat key,value config CSV overlaid on the TOML; written with defaults if missing
    #[arg(long = "legacy-config", value_name = "FILE")]
    pub legacy_config: Option<PathBuf>,

    /// Emit JSON lines (events on stdout, errors on stderr) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a new trajectory: one sample per button press
    FirstScan {
        #[arg(long)]
        study: String,
        #[arg(long)]
        id: String,
        /// Leg position descriptor
        #[arg(long)]
        leg: String,
        /// Scanner position descriptor
        #[arg(long)]
        scanner: String,
        /// Foot position descriptor
        #[arg(long)]
        foot: String,
        /// Angle descriptor
        #[arg(long)]
        angle: String,
        /// Distance between consecutive images, in calibrated units
        #[arg(long, allow_negative_numbers = true)]
        interval: f64,
    },
    /// Replay a recorded trajectory for the patient with this label (`study,id,NNN`)
    RepeatScan {
        #[arg(value_name = "LABEL")]
        label: String,
    },
    /// List recorded patients
    Patients,
    /// Measure the rail calibration factor (distance per encoder tick)
    Calibrate,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
