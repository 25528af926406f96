//! Patient index and per-scan sample files.
//!
//! The index is a CSV with one row per scan; each scan's samples live in their
//! own CSV under the data directory. The in-memory store in `mocks` follows
//! the same contract.
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};
use crate::patient::{
    Patient, PatientDescriptor, Sample, next_iteration, sort_patients, stem_owner,
};

/// Header row of the patients index.
pub const INDEX_HEADER: [&str; 7] = [
    "Study",
    "ID",
    "Leg_Pos",
    "Scanner_Pos",
    "Foot_Pos",
    "Angle_Pos",
    "Iteration",
];

pub trait PatientStore: Send {
    /// Register a new scan, assigning the next iteration for its subject.
    fn create(&mut self, descriptor: &PatientDescriptor) -> Result<Patient>;

    fn append_sample(&mut self, patient: &Patient, sample: Sample) -> Result<()>;

    /// Drop the most recently appended sample. Fails if there is none.
    fn remove_last_sample(&mut self, patient: &Patient) -> Result<()>;

    fn read_all_samples(&self, patient: &Patient) -> Result<Vec<Sample>>;

    /// Every patient, sorted case-insensitively by study then id.
    fn list_all(&self) -> Result<Vec<Patient>>;

    /// Look up a patient by its `study,id,NNN` label.
    fn find(&self, label: &str) -> Result<Option<Patient>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|p| p.label() == label))
    }
}

/// Replace `path` with `bytes` via a temporary sibling and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

fn io_err(what: &str, path: &Path, e: &std::io::Error) -> ScanError {
    ScanError::Store(format!("{what} {}: {e}", path.display()))
}

#[derive(Debug, Clone)]
pub struct CsvPatientStore {
    index: PathBuf,
    data_dir: PathBuf,
}

impl CsvPatientStore {
    /// Open the store, creating the index (with header) and the data
    /// directory when they are missing.
    pub fn open(index: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let index = index.into();
        let data_dir = data_dir.into();
        if !index.exists() {
            if let Some(parent) = index.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| io_err("create", parent, &e))?;
            }
            let mut wtr = csv::Writer::from_path(&index)?;
            wtr.write_record(INDEX_HEADER)?;
            wtr.flush().map_err(|e| io_err("write", &index, &e))?;
            tracing::info!(path = %index.display(), "created patients index");
        }
        fs::create_dir_all(&data_dir).map_err(|e| io_err("create", &data_dir, &e))?;
        Ok(Self { index, data_dir })
    }

    pub fn index_path(&self) -> &Path {
        &self.index
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn data_file(&self, patient: &Patient) -> PathBuf {
        patient.data_file(&self.data_dir)
    }

    fn read_index(&self) -> Result<Vec<Patient>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.index)?;
        rdr.records()
            .map(|rec| Patient::from_record(&rec?))
            .collect()
    }

    fn append_index(&self, patient: &Patient) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.index)
            .map_err(|e| io_err("open", &self.index, &e))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        wtr.write_record(patient.to_record())?;
        wtr.flush().map_err(|e| io_err("write", &self.index, &e))
    }

    fn read_sample_rows(&self, path: &Path) -> Result<Vec<csv::StringRecord>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        rdr.records()
            .map(|r| r.map_err(ScanError::from))
            .collect()
    }
}

impl PatientStore for CsvPatientStore {
    fn create(&mut self, descriptor: &PatientDescriptor) -> Result<Patient> {
        descriptor.validate()?;
        let existing = self.read_index()?;
        let patient = Patient::new(descriptor.clone(), next_iteration(&existing, descriptor));
        if let Some(owner) = stem_owner(&existing, &patient) {
            return Err(ScanError::invalid(format!(
                "data file {}.csv already belongs to {}",
                patient.stem(),
                owner.label()
            )));
        }
        let path = self.data_file(&patient);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| io_err("create", &path, &e))?;
        if let Err(e) = self.append_index(&patient) {
            // keep the index and the data directory consistent
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        tracing::info!(patient = %patient.label(), file = %path.display(), "patient created");
        Ok(patient)
    }

    fn append_sample(&mut self, patient: &Patient, sample: Sample) -> Result<()> {
        let path = self.data_file(patient);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| io_err("open", &path, &e))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        wtr.write_record(sample.to_record())?;
        wtr.flush().map_err(|e| io_err("write", &path, &e))
    }

    fn remove_last_sample(&mut self, patient: &Patient) -> Result<()> {
        let path = self.data_file(patient);
        let mut rows = self.read_sample_rows(&path)?;
        if rows.pop().is_none() {
            return Err(ScanError::invalid(format!(
                "no samples to remove for {}",
                patient.label()
            )));
        }
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in &rows {
            wtr.write_record(row)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| ScanError::Store(e.to_string()))?;
        write_atomic(&path, &bytes).map_err(|e| io_err("rewrite", &path, &e))
    }

    fn read_all_samples(&self, patient: &Patient) -> Result<Vec<Sample>> {
        let path = self.data_file(patient);
        self.read_sample_rows(&path)?
            .iter()
            .map(Sample::from_record)
            .collect()
    }

    fn list_all(&self) -> Result<Vec<Patient>> {
        let mut patients = self.read_index()?;
        sort_patients(&mut patients);
        Ok(patients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.csv");
        fs::write(&p, "old").unwrap();
        write_atomic(&p, b"new").unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "new");
        assert!(!dir.path().join("x.new").exists());
    }
}
