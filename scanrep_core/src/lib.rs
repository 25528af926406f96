#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Sampling layer and scan session for the scan repeatability rig
//! (hardware-agnostic).
//!
//! All device access goes through the `scanrep_traits` seams, so the same
//! code runs against the Raspberry Pi drivers, the simulated devices, and the
//! scripted mocks in [`mocks`].
//!
//! ## Architecture
//!
//! - **Timers**: one [`RepeatingTimer`] thread per background poll
//! - **Drivers**: [`PositionTracker`] (encoder unwrap + calibration),
//!   [`ForceReader`] (framed serial records), [`DebouncedInput`] (button)
//! - **Session**: [`ScanSession`] state machine over Idle / Recording /
//!   Comparing, and [`ScanController`] which owns the UI tick and the button
//!   wiring
//! - **Storage**: [`PatientStore`] with a CSV-backed implementation
//!
//! Each driver buffers exactly one value, written only by its poll thread and
//! read lock-free by everyone else.

pub mod button;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod force;
pub mod hw_error;
pub mod indicator;
pub mod mocks;
pub mod patient;
pub mod session;
pub mod status;
pub mod store;
pub mod timer;
pub mod util;

pub use button::{DebouncedInput, Debouncer, Edge};
pub use config::{DebounceCfg, ForceCfg, SessionCfg, TrackerCfg};
pub use controller::ScanController;
pub use encoder::{PositionTracker, Unwrapper, calibration_factor, unwrap_delta};
pub use error::{Result, ScanError};
pub use force::{ForceReader, ForceRecord, is_valid_record, parse_record};
pub use indicator::{DisplaySink, Indicator, IndicatorCfg, IndicatorFrame, Quantity};
pub use patient::{Patient, PatientDescriptor, Sample};
pub use session::{Advance, ForceSource, PositionSource, ScanSession};
pub use status::{Outcome, ScanMode, SessionSnapshot, SessionStatus};
pub use store::{CsvPatientStore, PatientStore};
pub use timer::RepeatingTimer;
