//! Tolerance classification and indicator-bar geometry.
//!
//! Nothing here draws; a `DisplaySink` receives finished frames and renders
//! them however it likes.
use crate::status::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Position,
    Force,
}

impl Quantity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Force => "force",
        }
    }
}

/// Per-quantity tolerance and bar geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorCfg {
    /// Allowed `|target - current|` for the reading to count as on target.
    pub error_margin: f64,
    /// Bar units moved per error margin.
    pub sensitivity: f64,
    pub width: f64,
    /// Half-width of the marker.
    pub box_size: f64,
}

impl Default for IndicatorCfg {
    fn default() -> Self {
        Self {
            error_margin: 1.0,
            sensitivity: 50.0,
            width: 200.0,
            box_size: 5.0,
        }
    }
}

/// One rendered comparison of a live reading against its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFrame {
    pub quantity: Quantity,
    pub current: f64,
    pub target: f64,
    pub in_tolerance: bool,
    /// Signed error in units of the error margin.
    pub margins_off: f64,
    /// Marker extent along the bar, in `[0, width]`.
    pub marker_start: f64,
    pub marker_end: f64,
}

/// Receives frames from the session's refresh tick.
pub trait DisplaySink: Send + Sync {
    fn display(&self, frame: &IndicatorFrame);

    /// Called when the session changes state (start, step, stop, completion).
    fn status(&self, _snapshot: &SessionSnapshot) {}
}

#[derive(Debug, Clone, Copy)]
pub struct Indicator {
    quantity: Quantity,
    cfg: IndicatorCfg,
}

impl Indicator {
    pub fn new(quantity: Quantity, cfg: IndicatorCfg) -> Self {
        Self { quantity, cfg }
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn cfg(&self) -> &IndicatorCfg {
        &self.cfg
    }

    pub fn frame(&self, current: f64, target: f64) -> IndicatorFrame {
        let margins_off = margins_off(current, target, self.cfg.error_margin);
        let (marker_start, marker_end) = marker_extent(&self.cfg, margins_off);
        IndicatorFrame {
            quantity: self.quantity,
            current,
            target,
            in_tolerance: in_tolerance(current, target, self.cfg.error_margin),
            margins_off,
            marker_start,
            marker_end,
        }
    }

    /// Extent of the on-target window drawn behind the marker.
    pub fn tolerance_window(&self) -> (f64, f64) {
        let origin = self.cfg.width / 2.0;
        let half = self.cfg.box_size + self.cfg.sensitivity;
        (origin - half, origin + half)
    }
}

/// `true` iff `|target - current| <= margin`.
#[inline]
pub fn in_tolerance(current: f64, target: f64, margin: f64) -> bool {
    (target - current).abs() <= margin
}

#[inline]
pub fn margins_off(current: f64, target: f64, margin: f64) -> f64 {
    (target - current) / margin
}

fn marker_extent(cfg: &IndicatorCfg, margins_off: f64) -> (f64, f64) {
    let origin = cfg.width / 2.0;
    let shift = margins_off * cfg.sensitivity;
    let mut start = origin - cfg.box_size - shift;
    let mut end = origin + cfg.box_size - shift;
    // Pin to the nearest edge once the marker leaves the bar.
    if start < 0.0 {
        start = 0.0;
        end = cfg.box_size;
    }
    if end > cfg.width {
        end = cfg.width;
        start = cfg.width - cfg.box_size;
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cfg() -> IndicatorCfg {
        IndicatorCfg {
            error_margin: 0.5,
            sensitivity: 50.0,
            width: 200.0,
            box_size: 5.0,
        }
    }

    #[rstest]
    #[case(10.0, 10.0, true)]
    #[case(10.0, 10.5, true)]
    #[case(10.5, 10.0, true)]
    #[case(10.0, 10.51, false)]
    #[case(9.49, 10.0, false)]
    fn tolerance_boundary_is_inclusive(
        #[case] current: f64,
        #[case] target: f64,
        #[case] expected: bool,
    ) {
        let frame = Indicator::new(Quantity::Force, cfg()).frame(current, target);
        assert_eq!(frame.in_tolerance, expected);
    }

    #[test]
    fn on_target_marker_is_centered() {
        let frame = Indicator::new(Quantity::Position, cfg()).frame(3.0, 3.0);
        assert_eq!((frame.marker_start, frame.marker_end), (95.0, 105.0));
        assert_eq!(frame.margins_off, 0.0);
    }

    #[test]
    fn one_margin_low_shifts_by_sensitivity() {
        // target above current: marker moves left
        let frame = Indicator::new(Quantity::Position, cfg()).frame(1.0, 1.5);
        assert!((frame.margins_off - 1.0).abs() < 1e-12);
        assert!((frame.marker_start - 45.0).abs() < 1e-9);
        assert!((frame.marker_end - 55.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(0.0, 100.0, 0.0, 5.0)]
    #[case(100.0, 0.0, 195.0, 200.0)]
    fn far_off_marker_is_pinned_to_bar_edge(
        #[case] current: f64,
        #[case] target: f64,
        #[case] start: f64,
        #[case] end: f64,
    ) {
        let frame = Indicator::new(Quantity::Force, cfg()).frame(current, target);
        assert_eq!((frame.marker_start, frame.marker_end), (start, end));
        assert!(!frame.in_tolerance);
    }

    #[test]
    fn tolerance_window_spans_box_plus_sensitivity() {
        let ind = Indicator::new(Quantity::Force, cfg());
        assert_eq!(ind.tolerance_window(), (45.0, 155.0));
    }
}
