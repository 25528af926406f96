//! Patient records and recorded samples.
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

/// What the operator enters before a first scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatientDescriptor {
    pub study: String,
    pub id: String,
    pub leg: String,
    pub scanner: String,
    pub foot: String,
    pub angle: String,
}

impl PatientDescriptor {
    /// Study and id must be non-blank; every placement field must be filled.
    /// Fields end up in CSV rows, so none may contain a line break.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("study", &self.study),
            ("id", &self.id),
            ("leg position", &self.leg),
            ("scanner position", &self.scanner),
            ("foot position", &self.foot),
            ("angle position", &self.angle),
        ] {
            if value.trim().is_empty() {
                return Err(ScanError::invalid(format!("{name} is required")));
            }
            if value.contains(['\n', '\r']) {
                return Err(ScanError::invalid(format!("{name} must be a single line")));
            }
        }
        // study and id name the data file
        for (name, value) in [("study", &self.study), ("id", &self.id)] {
            if value.contains(['/', '\\', '\0']) || value.contains("..") {
                return Err(ScanError::invalid(format!(
                    "{name} {value:?} may not contain path separators or '..'"
                )));
            }
        }
        Ok(())
    }

    /// Patients compare equal for iteration counting on study and id only.
    pub fn same_subject(&self, other: &PatientDescriptor) -> bool {
        self.study == other.study && self.id == other.id
    }
}

/// A stored patient entry: descriptor plus its per-subject iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patient {
    pub descriptor: PatientDescriptor,
    /// 1-based; distinguishes repeated entries with the same study and id.
    pub iteration: u32,
}

impl Patient {
    pub fn new(descriptor: PatientDescriptor, iteration: u32) -> Self {
        Self {
            descriptor,
            iteration,
        }
    }

    /// Zero-padded iteration as stored on disk.
    pub fn iteration_text(&self) -> String {
        format!("{:03}", self.iteration)
    }

    /// `study,id,NNN`, as shown in patient lists.
    pub fn label(&self) -> String {
        format!(
            "{},{},{}",
            self.descriptor.study,
            self.descriptor.id,
            self.iteration_text()
        )
    }

    /// `study_id_NNN`, the data file name without extension.
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.descriptor.study,
            self.descriptor.id,
            self.iteration_text()
        )
    }

    pub fn data_file(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.csv", self.stem()))
    }

    /// Row for the patients index.
    pub fn to_record(&self) -> [String; 7] {
        let d = &self.descriptor;
        [
            d.study.clone(),
            d.id.clone(),
            d.leg.clone(),
            d.scanner.clone(),
            d.foot.clone(),
            d.angle.clone(),
            self.iteration_text(),
        ]
    }

    pub fn from_record(rec: &csv::StringRecord) -> Result<Self> {
        if rec.len() != 7 {
            return Err(ScanError::Store(format!(
                "patient row needs 7 fields, got {}",
                rec.len()
            )));
        }
        let field = |i: usize| rec.get(i).unwrap_or_default().to_string();
        let raw_iter = field(6);
        let iteration: u32 = raw_iter
            .trim()
            .parse()
            .map_err(|_| ScanError::Store(format!("bad iteration {raw_iter:?}")))?;
        Ok(Self {
            descriptor: PatientDescriptor {
                study: field(0),
                id: field(1),
                leg: field(2),
                scanner: field(3),
                foot: field(4),
                angle: field(5),
            },
            iteration,
        })
    }
}

/// One recorded (position, force) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: f64,
    pub force: f64,
}

impl Sample {
    pub fn new(position: f64, force: f64) -> Self {
        Self { position, force }
    }

    /// Two decimals per field.
    pub fn to_record(&self) -> [String; 2] {
        [format!("{:.2}", self.position), format!("{:.2}", self.force)]
    }

    pub fn from_record(rec: &csv::StringRecord) -> Result<Self> {
        let num = |i: usize| -> Result<f64> {
            let raw = rec.get(i).unwrap_or_default().trim();
            raw.parse()
                .map_err(|_| ScanError::Store(format!("bad sample field {raw:?}")))
        };
        if rec.len() < 2 {
            return Err(ScanError::Store(format!(
                "sample row needs 2 fields, got {}",
                rec.len()
            )));
        }
        Ok(Self {
            position: num(0)?,
            force: num(1)?,
        })
    }
}

/// Iteration for a new entry: prior entries for the same subject, plus one.
pub fn next_iteration<'a, I>(existing: I, descriptor: &PatientDescriptor) -> u32
where
    I: IntoIterator<Item = &'a Patient>,
{
    let prior = existing
        .into_iter()
        .filter(|p| p.descriptor.same_subject(descriptor))
        .count();
    u32::try_from(prior).unwrap_or(u32::MAX - 1) + 1
}

/// An existing entry for a different subject whose data file name equals
/// `patient`'s, e.g. `a_b`/`c` against `a`/`b_c`.
pub fn stem_owner<'a, I>(existing: I, patient: &Patient) -> Option<&'a Patient>
where
    I: IntoIterator<Item = &'a Patient>,
{
    let stem = patient.stem();
    existing
        .into_iter()
        .find(|p| !p.descriptor.same_subject(&patient.descriptor) && p.stem() == stem)
}

/// Stable case-insensitive sort by study then id.
pub fn sort_patients(patients: &mut [Patient]) {
    patients.sort_by_cached_key(|p| {
        (
            p.descriptor.study.to_lowercase(),
            p.descriptor.id.to_lowercase(),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(study: &str, id: &str) -> PatientDescriptor {
        PatientDescriptor {
            study: study.into(),
            id: id.into(),
            leg: "supine".into(),
            scanner: "mid".into(),
            foot: "neutral".into(),
            angle: "0".into(),
        }
    }

    #[test]
    fn label_and_stem_pad_iteration() {
        let p = Patient::new(desc("mkr", "102"), 7);
        assert_eq!(p.label(), "mkr,102,007");
        assert_eq!(p.stem(), "mkr_102_007");
        assert_eq!(
            p.data_file(Path::new("data")),
            Path::new("data").join("mkr_102_007.csv")
        );
    }

    #[test]
    fn iteration_counts_only_same_subject() {
        let existing = vec![
            Patient::new(desc("a", "1"), 1),
            Patient::new(desc("a", "2"), 1),
            Patient::new(desc("a", "1"), 2),
        ];
        assert_eq!(next_iteration(&existing, &desc("a", "1")), 3);
        assert_eq!(next_iteration(&existing, &desc("b", "1")), 1);
        // case matters for identity, only sorting ignores it
        assert_eq!(next_iteration(&existing, &desc("A", "1")), 1);
    }

    #[test]
    fn sort_ignores_case_and_keeps_order_of_equals() {
        let mut v = vec![
            Patient::new(desc("beta", "1"), 1),
            Patient::new(desc("Alpha", "2"), 1),
            Patient::new(desc("alpha", "10"), 1),
            Patient::new(desc("beta", "1"), 2),
        ];
        sort_patients(&mut v);
        let labels: Vec<_> = v.iter().map(Patient::label).collect();
        assert_eq!(
            labels,
            ["alpha,10,001", "Alpha,2,001", "beta,1,001", "beta,1,002"]
        );
    }

    #[test]
    fn blank_fields_fail_validation() {
        let mut d = desc("s", "1");
        assert!(d.validate().is_ok());
        d.foot = "  ".into();
        assert!(matches!(d.validate(), Err(ScanError::InvalidOperation(_))));
    }

    #[test]
    fn path_like_study_or_id_is_rejected() {
        for (study, id) in [("../escape", "1"), ("s", "a/b"), ("s", "..\\x"), ("..", "1")] {
            assert!(
                matches!(desc(study, id).validate(), Err(ScanError::InvalidOperation(_))),
                "{study:?} {id:?}"
            );
        }
        // underscores and dots elsewhere are fine
        assert!(desc("knee_v2", "7.1").validate().is_ok());
    }

    #[test]
    fn stem_owner_finds_other_subject_with_same_file_name() {
        let existing = vec![Patient::new(desc("a_b", "c"), 1)];
        let clash = Patient::new(desc("a", "b_c"), 1);
        assert_eq!(stem_owner(&existing, &clash), Some(&existing[0]));
        let same = Patient::new(desc("a_b", "c"), 2);
        assert_eq!(stem_owner(&existing, &same), None);
    }

    #[test]
    fn sample_rows_use_two_decimals() {
        let s = Sample::new(0.123_456, -2.0);
        assert_eq!(s.to_record(), ["0.12".to_string(), "-2.00".to_string()]);
    }
}
