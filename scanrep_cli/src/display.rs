//! Terminal rendering of indicator frames and session status.

use scanrep_core::{
    DisplaySink, Indicator, IndicatorFrame, Quantity, SessionCfg, SessionSnapshot, SessionStatus,
};
use serde_json::json;
use std::sync::{Mutex, PoisonError};

/// Characters in a rendered indicator bar.
pub const BAR_CELLS: usize = 41;

#[derive(Default)]
struct Latest {
    position: Option<IndicatorFrame>,
    force: Option<IndicatorFrame>,
}

/// Prints status changes and tolerance transitions to stdout. Every frame is
/// kept so `status` can redraw the bars on request.
pub struct TerminalSink {
    json: bool,
    position: Indicator,
    force: Indicator,
    latest: Mutex<Latest>,
}

impl TerminalSink {
    pub fn new(cfg: &SessionCfg, json: bool) -> Self {
        Self {
            json,
            position: Indicator::new(Quantity::Position, cfg.position),
            force: Indicator::new(Quantity::Force, cfg.force),
            latest: Mutex::new(Latest::default()),
        }
    }

    fn indicator(&self, quantity: Quantity) -> &Indicator {
        match quantity {
            Quantity::Position => &self.position,
            Quantity::Force => &self.force,
        }
    }

    /// Most recent frame per quantity, position first.
    pub fn latest_frames(&self) -> Vec<IndicatorFrame> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.position.iter().chain(latest.force.iter()).copied().collect()
    }

    pub fn print_frame(&self, frame: &IndicatorFrame) {
        if self.json {
            println!("{}", frame_json(frame));
        } else {
            println!("{}", self.frame_line(frame));
        }
    }

    pub fn frame_line(&self, frame: &IndicatorFrame) -> String {
        let verdict = if frame.in_tolerance {
            "on target".to_string()
        } else {
            format!("off by {:+.2} margins", frame.margins_off)
        };
        format!(
            "{:<8} {} current {:.2} target {:.2} {}",
            frame.quantity.as_str(),
            render_bar(self.indicator(frame.quantity), frame, BAR_CELLS),
            frame.current,
            frame.target,
            verdict
        )
    }
}

impl DisplaySink for TerminalSink {
    fn display(&self, frame: &IndicatorFrame) {
        let changed = {
            let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = match frame.quantity {
                Quantity::Position => &mut latest.position,
                Quantity::Force => &mut latest.force,
            };
            let changed = slot.is_none_or(|prev| prev.in_tolerance != frame.in_tolerance);
            *slot = Some(*frame);
            changed
        };
        tracing::trace!(
            quantity = frame.quantity.as_str(),
            current = frame.current,
            target = frame.target,
            in_tolerance = frame.in_tolerance,
            "frame"
        );
        if changed {
            self.print_frame(frame);
        }
    }

    fn status(&self, snapshot: &SessionSnapshot) {
        if self.json {
            println!("{}", status_json(snapshot));
        } else {
            println!("{}", status_line(snapshot));
        }
    }
}

pub fn status_line(snapshot: &SessionSnapshot) -> String {
    match (snapshot.status, snapshot.last_outcome) {
        (SessionStatus::Idle, Some(outcome)) => {
            format!("{}. {}", outcome.as_str(), snapshot.counter_text())
        }
        (SessionStatus::Idle, None) => "No scan running".to_string(),
        (_, _) => snapshot.counter_text(),
    }
}

pub fn status_json(snapshot: &SessionSnapshot) -> serde_json::Value {
    json!({
        "event": "status",
        "mode": snapshot.mode.map(|m| m.as_str()),
        "status": snapshot.status.as_str(),
        "step_count": snapshot.step_count,
        "expected_len": snapshot.expected_len,
        "patient": snapshot.patient,
        "outcome": snapshot.last_outcome.map(|o| o.as_str()),
    })
}

pub fn frame_json(frame: &IndicatorFrame) -> serde_json::Value {
    json!({
        "event": "frame",
        "quantity": frame.quantity.as_str(),
        "current": frame.current,
        "target": frame.target,
        "in_tolerance": frame.in_tolerance,
        "margins_off": frame.margins_off,
    })
}

/// Draw the bar as text: `|` marks the tolerance window edges, `#` the marker.
pub fn render_bar(indicator: &Indicator, frame: &IndicatorFrame, cells: usize) -> String {
    let last = cells.saturating_sub(1);
    let width = indicator.cfg().width;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let to_cell = |x: f64| ((x / width) * last as f64).round().clamp(0.0, last as f64) as usize;

    let mut bar = vec!['-'; cells];
    let (lo, hi) = indicator.tolerance_window();
    for edge in [lo, hi] {
        if (0.0..=width).contains(&edge) {
            bar[to_cell(edge)] = '|';
        }
    }
    for cell in &mut bar[to_cell(frame.marker_start)..=to_cell(frame.marker_end)] {
        *cell = '#';
    }
    format!("[{}]", bar.into_iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanrep_core::{IndicatorCfg, Outcome, ScanMode};

    fn sink() -> TerminalSink {
        TerminalSink::new(&SessionCfg::default(), false)
    }

    #[test]
    fn centred_marker_sits_inside_the_window() {
        let ind = Indicator::new(Quantity::Position, IndicatorCfg::default());
        let bar = render_bar(&ind, &ind.frame(1.0, 1.0), BAR_CELLS);
        let cells: Vec<char> = bar.trim_matches(['[', ']']).chars().collect();
        assert_eq!(cells.len(), BAR_CELLS);
        assert_eq!(cells.iter().filter(|&&c| c == '#').count(), 3);
        assert_eq!(cells[20], '#');
        assert_eq!((cells[9], cells[31]), ('|', '|'));
    }

    #[test]
    fn far_off_marker_is_pinned_to_the_edge() {
        let ind = Indicator::new(Quantity::Force, IndicatorCfg::default());
        let bar = render_bar(&ind, &ind.frame(0.0, 100.0), BAR_CELLS);
        assert!(bar.starts_with("[##-"));
    }

    #[test]
    fn frames_print_only_on_tolerance_change() {
        let s = sink();
        let ind = Indicator::new(Quantity::Position, SessionCfg::default().position);
        s.display(&ind.frame(0.0, 0.0));
        s.display(&ind.frame(0.1, 0.0));
        assert_eq!(s.latest_frames().len(), 1);
        assert_eq!(s.latest_frames()[0].current, 0.1);
    }

    #[test]
    fn status_lines_follow_the_session() {
        let mut snap = SessionSnapshot::idle();
        assert_eq!(status_line(&snap), "No scan running");
        snap.status = SessionStatus::Comparing;
        snap.mode = Some(ScanMode::RepeatScan);
        snap.step_count = 1;
        snap.expected_len = Some(3);
        assert_eq!(status_line(&snap), "Image count: 1/3");
        snap.status = SessionStatus::Idle;
        snap.step_count = 3;
        snap.last_outcome = Some(Outcome::Completed);
        assert_eq!(status_line(&snap), "Scan complete. Image count: 3/3");

        let v = status_json(&snap);
        assert_eq!(v["mode"], "repeat_scan");
        assert_eq!(v["outcome"], "Scan complete");
        assert_eq!(v["expected_len"], 3);
    }

    #[test]
    fn frame_line_reports_margins() {
        let s = sink();
        let ind = Indicator::new(Quantity::Position, SessionCfg::default().position);
        let line = s.frame_line(&ind.frame(0.0, 0.6));
        assert!(line.starts_with("position"));
        assert!(line.contains("off by +2.00 margins"));
    }
}
