//! First-scan recording and repeat-scan comparison.
//!
//! `ScanSession` is plain state: it does no timing of its own. The controller
//! calls [`ScanSession::refresh`] from the UI tick and
//! [`ScanSession::advance`] from the button.
use std::sync::Arc;
use std::time::Duration;

use scanrep_traits::{AngleSensor, SerialLink};

use crate::config::SessionCfg;
use crate::encoder::PositionTracker;
use crate::error::{Result, ScanError};
use crate::force::ForceReader;
use crate::indicator::{DisplaySink, Indicator, IndicatorFrame, Quantity};
use crate::patient::{Patient, PatientDescriptor, Sample};
use crate::status::{Outcome, ScanMode, SessionSnapshot, SessionStatus};
use crate::store::PatientStore;

/// Latest rail position, never blocking on hardware.
pub trait PositionSource: Send + Sync {
    fn position(&self) -> f64;
}

/// Latest probe force, never blocking on hardware.
pub trait ForceSource: Send + Sync {
    fn force(&self) -> f64;
}

impl<S: AngleSensor + Send + 'static> PositionSource for PositionTracker<S> {
    fn position(&self) -> f64 {
        self.get_position()
    }
}

impl<L: SerialLink + Send + 'static> ForceSource for ForceReader<L> {
    fn force(&self) -> f64 {
        self.get_force()
    }
}

impl<T: PositionSource + ?Sized> PositionSource for Arc<T> {
    fn position(&self) -> f64 {
        (**self).position()
    }
}

impl<T: ForceSource + ?Sized> ForceSource for Arc<T> {
    fn force(&self) -> f64 {
        (**self).force()
    }
}

/// Result of one accepted button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The step counter moved to this value.
    Step(usize),
    /// The last expected step was taken; the session is idle again.
    Completed(usize),
}

#[derive(Debug)]
enum State {
    Idle,
    Recording {
        patient: Patient,
        origin: f64,
        interval: f64,
        step: usize,
    },
    Comparing {
        patient: Patient,
        expected: Vec<Sample>,
        step: usize,
    },
}

pub struct ScanSession {
    position: Arc<dyn PositionSource>,
    force: Arc<dyn ForceSource>,
    store: Box<dyn PatientStore>,
    sink: Arc<dyn DisplaySink>,
    position_indicator: Indicator,
    force_indicator: Indicator,
    refresh_period: Duration,
    state: State,
    last_mode: Option<ScanMode>,
    last_step: usize,
    last_patient: Option<String>,
    last_outcome: Option<Outcome>,
}

impl ScanSession {
    pub fn new(
        position: Arc<dyn PositionSource>,
        force: Arc<dyn ForceSource>,
        store: Box<dyn PatientStore>,
        sink: Arc<dyn DisplaySink>,
        cfg: &SessionCfg,
    ) -> Self {
        Self {
            position,
            force,
            store,
            sink,
            position_indicator: Indicator::new(Quantity::Position, cfg.position),
            force_indicator: Indicator::new(Quantity::Force, cfg.force),
            refresh_period: cfg.refresh_period,
            state: State::Idle,
            last_mode: None,
            last_step: 0,
            last_patient: None,
            last_outcome: None,
        }
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    fn ensure_idle(&self) -> Result<()> {
        if matches!(self.state, State::Idle) {
            Ok(())
        } else {
            Err(ScanError::invalid("a scan is already in progress"))
        }
    }

    /// Create a patient entry and begin recording. The current rail
    /// position becomes the origin the interval targets count down from.
    pub fn start_first_scan(
        &mut self,
        descriptor: &PatientDescriptor,
        interval: f64,
    ) -> Result<Patient> {
        self.ensure_idle()?;
        descriptor.validate()?;
        if !interval.is_finite() {
            return Err(ScanError::invalid(format!(
                "interval must be a number, got {interval}"
            )));
        }
        let origin = self.position.position();
        let patient = self.store.create(descriptor)?;
        tracing::info!(patient = %patient.label(), origin, interval, "first scan started");
        self.last_outcome = None;
        self.last_mode = Some(ScanMode::FirstScan);
        self.state = State::Recording {
            patient: patient.clone(),
            origin,
            interval,
            step: 0,
        };
        self.notify();
        Ok(patient)
    }

    /// Load the patient's recorded trajectory and begin comparing. Returns
    /// the trajectory length.
    pub fn start_repeat_scan(&mut self, patient: &Patient) -> Result<usize> {
        self.ensure_idle()?;
        let expected = self.store.read_all_samples(patient)?;
        if expected.is_empty() {
            return Err(ScanError::invalid(format!(
                "{} has no recorded samples",
                patient.label()
            )));
        }
        let len = expected.len();
        tracing::info!(patient = %patient.label(), steps = len, "repeat scan started");
        self.last_outcome = None;
        self.last_mode = Some(ScanMode::RepeatScan);
        self.state = State::Comparing {
            patient: patient.clone(),
            expected,
            step: 0,
        };
        self.notify();
        Ok(len)
    }

    pub fn start_repeat_scan_by_label(&mut self, label: &str) -> Result<Patient> {
        let patient = self
            .store
            .find(label)?
            .ok_or_else(|| ScanError::invalid(format!("no patient labelled {label:?}")))?;
        self.start_repeat_scan(&patient)?;
        Ok(patient)
    }

    /// Take one step. Recording persists a (position, force) sample first;
    /// comparing finishes the session when the last target is passed.
    pub fn advance(&mut self) -> Result<Advance> {
        let position = self.position.position();
        let force = self.force.force();
        let result = match &mut self.state {
            State::Idle => return Err(ScanError::invalid("no scan in progress")),
            State::Recording { patient, step, .. } => {
                let sample = Sample::new(position, force);
                self.store.append_sample(patient, sample)?;
                *step += 1;
                tracing::info!(step = *step, position, force, "sample recorded");
                Advance::Step(*step)
            }
            State::Comparing {
                expected, step, ..
            } => {
                *step += 1;
                tracing::info!(step = *step, of = expected.len(), position, force, "step taken");
                if *step >= expected.len() {
                    Advance::Completed(*step)
                } else {
                    Advance::Step(*step)
                }
            }
        };
        if let Advance::Completed(_) = result {
            self.finish(Outcome::Completed);
        } else {
            self.notify();
        }
        Ok(result)
    }

    /// Step back once. While recording the last sample is deleted.
    pub fn undo(&mut self) -> Result<usize> {
        let step = match &mut self.state {
            State::Idle => return Err(ScanError::invalid("no scan in progress")),
            State::Recording { step: 0, .. } | State::Comparing { step: 0, .. } => {
                return Err(ScanError::invalid("nothing to undo"));
            }
            State::Recording { patient, step, .. } => {
                self.store.remove_last_sample(patient)?;
                *step -= 1;
                *step
            }
            State::Comparing { step, .. } => {
                *step -= 1;
                *step
            }
        };
        tracing::info!(step, "step undone");
        self.notify();
        Ok(step)
    }

    /// End the scan wherever it is. Recorded samples stay on disk.
    /// Returns `None` when nothing was running.
    pub fn stop(&mut self) -> Option<Outcome> {
        if matches!(self.state, State::Idle) {
            return None;
        }
        self.finish(Outcome::Stopped);
        Some(Outcome::Stopped)
    }

    fn finish(&mut self, outcome: Outcome) {
        let previous = std::mem::replace(&mut self.state, State::Idle);
        let (patient, step) = match previous {
            State::Idle => return,
            State::Recording { patient, step, .. } | State::Comparing { patient, step, .. } => {
                (patient, step)
            }
        };
        tracing::info!(patient = %patient.label(), step, outcome = outcome.as_str(), "scan finished");
        self.last_step = step;
        self.last_patient = Some(patient.label());
        self.last_outcome = Some(outcome);
        self.notify();
    }

    /// Compare live readings against the current targets and push the
    /// frames to the display. Idle sessions emit nothing.
    pub fn refresh(&self) -> Vec<IndicatorFrame> {
        let frames = match &self.state {
            State::Idle => Vec::new(),
            State::Recording {
                origin,
                interval,
                step,
                ..
            } => {
                let target = origin - interval * (*step as f64);
                vec![self.position_indicator.frame(self.position.position(), target)]
            }
            State::Comparing { expected, step, .. } => match expected.get(*step) {
                Some(target) => vec![
                    self.position_indicator
                        .frame(self.position.position(), target.position),
                    self.force_indicator.frame(self.force.force(), target.force),
                ],
                None => Vec::new(),
            },
        };
        for frame in &frames {
            self.sink.display(frame);
        }
        frames
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            State::Idle => SessionStatus::Idle,
            State::Recording { .. } => SessionStatus::Recording,
            State::Comparing { .. } => SessionStatus::Comparing,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn step_count(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Recording { step, .. } | State::Comparing { step, .. } => *step,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.state {
            State::Idle => SessionSnapshot {
                mode: self.last_mode,
                status: SessionStatus::Idle,
                step_count: self.last_step,
                expected_len: None,
                patient: self.last_patient.clone(),
                last_outcome: self.last_outcome,
            },
            State::Recording { patient, step, .. } => SessionSnapshot {
                mode: Some(ScanMode::FirstScan),
                status: SessionStatus::Recording,
                step_count: *step,
                expected_len: None,
                patient: Some(patient.label()),
                last_outcome: None,
            },
            State::Comparing {
                patient,
                expected,
                step,
            } => SessionSnapshot {
                mode: Some(ScanMode::RepeatScan),
                status: SessionStatus::Comparing,
                step_count: *step,
                expected_len: Some(expected.len()),
                patient: Some(patient.label()),
                last_outcome: None,
            },
        }
    }

    fn notify(&self) {
        self.sink.status(&self.snapshot());
    }

    pub fn patients(&self) -> Result<Vec<Patient>> {
        self.store.list_all()
    }

    pub fn find_patient(&self, label: &str) -> Result<Option<Patient>> {
        self.store.find(label)
    }
}
