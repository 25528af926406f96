//! `From` implementations bridging `scanrep_config` types to runtime config.

use crate::config::{DebounceCfg, ForceCfg, SessionCfg, TrackerCfg};
use crate::indicator::IndicatorCfg;
use crate::util::period_from_ms;

// ── TrackerCfg ───────────────────────────────────────────────────────────────

impl From<&scanrep_config::EncoderCfg> for TrackerCfg {
    fn from(c: &scanrep_config::EncoderCfg) -> Self {
        Self {
            poll_period: period_from_ms(c.poll_ms),
            calibration: c.calibration,
        }
    }
}

// ── ForceCfg ─────────────────────────────────────────────────────────────────

impl From<&scanrep_config::LoadCellCfg> for ForceCfg {
    fn from(c: &scanrep_config::LoadCellCfg) -> Self {
        Self {
            poll_period: period_from_ms(c.poll_ms),
        }
    }
}

// ── DebounceCfg ──────────────────────────────────────────────────────────────

impl From<&scanrep_config::ButtonCfg> for DebounceCfg {
    fn from(c: &scanrep_config::ButtonCfg) -> Self {
        Self {
            poll_period: period_from_ms(c.poll_ms),
            interval: std::time::Duration::from_millis(c.debounce_ms),
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<&scanrep_config::DisplayCfg> for SessionCfg {
    fn from(c: &scanrep_config::DisplayCfg) -> Self {
        Self {
            refresh_period: period_from_ms(c.refresh_ms),
            position: IndicatorCfg {
                error_margin: c.position_error_margin,
                sensitivity: c.position_display_sensitivity,
                width: c.width,
                box_size: c.box_size,
            },
            force: IndicatorCfg {
                error_margin: c.force_error_margin,
                sensitivity: c.force_display_sensitivity,
                width: c.width,
                box_size: c.box_size,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_round_through_toml_config() {
        let cfg = scanrep_config::Config::default();
        let tracker: TrackerCfg = (&cfg.encoder).into();
        let force: ForceCfg = (&cfg.load_cell).into();
        let button: DebounceCfg = (&cfg.button).into();
        let session: SessionCfg = (&cfg.display).into();

        assert_eq!(tracker.poll_period, Duration::from_millis(10));
        assert_eq!(force.poll_period, Duration::from_millis(60));
        assert_eq!(button.interval, Duration::from_millis(50));
        assert_eq!(session.refresh_period, Duration::from_millis(50));
        assert!((session.position.error_margin - 0.3).abs() < 1e-12);
        assert!((session.force.sensitivity - 30.0).abs() < 1e-12);
    }
}
