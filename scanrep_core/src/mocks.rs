//! Test and helper mocks for scanrep_core
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use scanrep_traits::{AngleSensor, BoxError, SerialLink};

use crate::error::{Result, ScanError};
use crate::indicator::{DisplaySink, IndicatorFrame};
use crate::patient::{
    Patient, PatientDescriptor, Sample, next_iteration, sort_patients, stem_owner,
};
use crate::session::{ForceSource, PositionSource};
use crate::status::SessionSnapshot;
use crate::store::PatientStore;

/// Encoder that replays a fixed list of raw angles, then keeps returning the
/// last one. A `None` entry reads as a transport failure.
pub struct ScriptedEncoder {
    script: VecDeque<Option<u16>>,
    last: u16,
}

impl ScriptedEncoder {
    pub fn new<I: IntoIterator<Item = u16>>(raws: I) -> Self {
        Self::with_failures(raws.into_iter().map(Some))
    }

    pub fn with_failures<I: IntoIterator<Item = Option<u16>>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: 0,
        }
    }
}

impl AngleSensor for ScriptedEncoder {
    fn read_raw_angle(&mut self) -> std::result::Result<u16, BoxError> {
        match self.script.pop_front() {
            Some(Some(raw)) => {
                self.last = raw;
                Ok(raw)
            }
            Some(None) => Err(Box::new(std::io::Error::other("encoder did not ack"))),
            None => Ok(self.last),
        }
    }
}

/// Serial link fed from a shared queue of lines; reads time out (empty
/// string) when the queue is empty.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    lines: Arc<Mutex<VecDeque<String>>>,
    discards: Arc<AtomicUsize>,
}

impl ScriptedLink {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let link = Self::default();
        link.push_all(lines);
        link
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(line.into());
    }

    pub fn push_all<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    /// How many times the reader asked to drop pending input.
    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

impl SerialLink for ScriptedLink {
    fn read_line(&mut self) -> std::result::Result<String, BoxError> {
        let next = self
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(line) => Ok(line),
            None => {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(String::new())
            }
        }
    }

    fn discard_pending(&mut self) -> std::result::Result<(), BoxError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settable reading, usable as either a position or a force source.
#[derive(Debug, Default)]
pub struct ManualSource {
    bits: AtomicU64,
}

impl ManualSource {
    pub fn new(value: f64) -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU64::new(value.to_bits()),
        })
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::SeqCst);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

impl PositionSource for ManualSource {
    fn position(&self) -> f64 {
        self.get()
    }
}

impl ForceSource for ManualSource {
    fn force(&self) -> f64 {
        self.get()
    }
}

/// In-memory `PatientStore` with the same iteration and ordering rules as
/// the CSV store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryPatientStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    patients: Vec<Patient>,
    samples: BTreeMap<String, Vec<Sample>>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a patient with an existing trajectory.
    pub fn insert(&self, patient: Patient, samples: Vec<Sample>) {
        let mut inner = self.inner();
        inner.samples.insert(patient.stem(), samples);
        inner.patients.push(patient);
    }

    pub fn sample_count(&self, patient: &Patient) -> usize {
        self.inner()
            .samples
            .get(&patient.stem())
            .map_or(0, Vec::len)
    }
}

impl PatientStore for MemoryPatientStore {
    fn create(&mut self, descriptor: &PatientDescriptor) -> Result<Patient> {
        descriptor.validate()?;
        let mut inner = self.inner();
        let patient = Patient::new(
            descriptor.clone(),
            next_iteration(&inner.patients, descriptor),
        );
        if let Some(owner) = stem_owner(&inner.patients, &patient) {
            return Err(ScanError::invalid(format!(
                "data file {}.csv already belongs to {}",
                patient.stem(),
                owner.label()
            )));
        }
        if inner.samples.contains_key(&patient.stem()) {
            return Err(ScanError::Store(format!("{} already exists", patient.stem())));
        }
        inner.samples.insert(patient.stem(), Vec::new());
        inner.patients.push(patient.clone());
        Ok(patient)
    }

    fn append_sample(&mut self, patient: &Patient, sample: Sample) -> Result<()> {
        self.inner()
            .samples
            .get_mut(&patient.stem())
            .ok_or_else(|| ScanError::Store(format!("no data for {}", patient.label())))?
            .push(sample);
        Ok(())
    }

    fn remove_last_sample(&mut self, patient: &Patient) -> Result<()> {
        self.inner()
            .samples
            .get_mut(&patient.stem())
            .and_then(Vec::pop)
            .map(|_| ())
            .ok_or_else(|| ScanError::invalid(format!("no samples to remove for {}", patient.label())))
    }

    fn read_all_samples(&self, patient: &Patient) -> Result<Vec<Sample>> {
        self.inner()
            .samples
            .get(&patient.stem())
            .cloned()
            .ok_or_else(|| ScanError::Store(format!("no data for {}", patient.label())))
    }

    fn list_all(&self) -> Result<Vec<Patient>> {
        let mut patients = self.inner().patients.clone();
        sort_patients(&mut patients);
        Ok(patients)
    }
}

/// Display sink that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<IndicatorFrame>>,
    statuses: Mutex<Vec<SessionSnapshot>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<IndicatorFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn statuses(&self) -> Vec<SessionSnapshot> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DisplaySink for RecordingSink {
    fn display(&self, frame: &IndicatorFrame) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*frame);
    }

    fn status(&self, snapshot: &SessionSnapshot) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
    }
}
