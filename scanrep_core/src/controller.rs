//! Drives a `ScanSession` from the UI refresh tick and the button.
//!
//! Lock order: the session mutex is never held while a timer is joined. Every
//! path that stops the UI tick takes the timer out under its own lock, then
//! drops it after the session lock is released.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use scanrep_traits::{Clock, DigitalInput};

use crate::button::{DebouncedInput, Edge};
use crate::error::Result;
use crate::patient::{Patient, PatientDescriptor};
use crate::session::{Advance, ScanSession};
use crate::status::{Outcome, SessionSnapshot};
use crate::timer::RepeatingTimer;

pub struct ScanController {
    session: Arc<Mutex<ScanSession>>,
    ui_tick: Mutex<Option<RepeatingTimer>>,
}

impl ScanController {
    pub fn new(session: ScanSession) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(session)),
            ui_tick: Mutex::new(None),
        })
    }

    fn session(&self) -> MutexGuard<'_, ScanSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route falling edges (presses) from `input` to [`on_press`](Self::on_press).
    pub fn attach_button<P, C>(self: &Arc<Self>, input: &DebouncedInput<P, C>)
    where
        P: DigitalInput + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(self);
        input.set_observer(move |edge| {
            if edge != Edge::Falling {
                return;
            }
            if let Some(controller) = weak.upgrade() {
                controller.on_press();
            }
        });
    }

    pub fn start_first_scan(
        &self,
        descriptor: &PatientDescriptor,
        interval: f64,
    ) -> Result<Patient> {
        let patient = self.session().start_first_scan(descriptor, interval)?;
        self.start_ui_tick()?;
        Ok(patient)
    }

    pub fn start_repeat_scan(&self, patient: &Patient) -> Result<usize> {
        let len = self.session().start_repeat_scan(patient)?;
        self.start_ui_tick()?;
        Ok(len)
    }

    pub fn start_repeat_scan_by_label(&self, label: &str) -> Result<Patient> {
        let patient = self.session().start_repeat_scan_by_label(label)?;
        self.start_ui_tick()?;
        Ok(patient)
    }

    fn start_ui_tick(&self) -> Result<()> {
        let period = self.session().refresh_period();
        let weak = Arc::downgrade(&self.session);
        let timer = RepeatingTimer::start("ui-refresh", period, move || {
            let Some(session) = weak.upgrade() else {
                return;
            };
            // skip a frame rather than wait behind a button handler
            if let Ok(guard) = session.try_lock() {
                guard.refresh();
            }
        });
        let timer = match timer {
            Ok(t) => t,
            Err(e) => {
                self.session().stop();
                return Err(e);
            }
        };
        let previous = self
            .ui_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer);
        drop(previous);
        Ok(())
    }

    fn stop_ui_tick(&self) {
        let timer = self
            .ui_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(timer);
    }

    /// One step, as if the button were pressed.
    pub fn advance(&self) -> Result<Advance> {
        let result = self.session().advance();
        if let Ok(Advance::Completed(_)) = result {
            self.stop_ui_tick();
        }
        result
    }

    /// Button handler. Errors are logged, never propagated to the poll
    /// thread; a press with no scan running is rejected the same way.
    pub fn on_press(&self) {
        match self.advance() {
            Ok(Advance::Step(step)) => tracing::debug!(step, "press accepted"),
            Ok(Advance::Completed(step)) => tracing::info!(step, "scan complete"),
            Err(e) => tracing::warn!(error = %e, "press ignored"),
        }
    }

    pub fn undo(&self) -> Result<usize> {
        self.session().undo()
    }

    pub fn stop(&self) -> Option<Outcome> {
        let outcome = self.session().stop();
        self.stop_ui_tick();
        outcome
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session().snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.session().is_active()
    }

    /// Run `f` with the session locked. Do not call back into the controller
    /// from `f`.
    pub fn with_session<R>(&self, f: impl FnOnce(&ScanSession) -> R) -> R {
        f(&self.session())
    }

    /// Stop any scan and the UI tick. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if let Some(outcome) = self.stop() {
            tracing::info!(outcome = outcome.as_str(), "session stopped at shutdown");
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        drop(
            self.ui_tick
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}
