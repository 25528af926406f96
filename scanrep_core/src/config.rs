//! Runtime configuration for the sampling layer and the scan session.
//!
//! These are the structs the drivers and session consume. They are separate
//! from the TOML-deserialized config in `scanrep_config`.
use std::time::Duration;

use crate::indicator::IndicatorCfg;

/// Encoder polling and calibration.
#[derive(Debug, Clone, Copy)]
pub struct TrackerCfg {
    pub poll_period: Duration,
    /// Linear distance per encoder tick.
    pub calibration: f64,
}

impl Default for TrackerCfg {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(10),
            calibration: 1.0,
        }
    }
}

/// Load-cell polling.
#[derive(Debug, Clone, Copy)]
pub struct ForceCfg {
    pub poll_period: Duration,
}

impl Default for ForceCfg {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(60),
        }
    }
}

/// Button polling and debounce window.
#[derive(Debug, Clone, Copy)]
pub struct DebounceCfg {
    pub poll_period: Duration,
    /// Minimum spacing between accepted transitions.
    pub interval: Duration,
}

impl Default for DebounceCfg {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(10),
            interval: Duration::from_millis(50),
        }
    }
}

/// Display refresh and per-quantity tolerance settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionCfg {
    pub refresh_period: Duration,
    pub position: IndicatorCfg,
    pub force: IndicatorCfg,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_millis(50),
            position: IndicatorCfg {
                error_margin: 0.3,
                sensitivity: 50.0,
                ..IndicatorCfg::default()
            },
            force: IndicatorCfg {
                error_margin: 0.1,
                sensitivity: 30.0,
                ..IndicatorCfg::default()
            },
        }
    }
}
