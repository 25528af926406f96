//! Session state reported to front-ends.

/// Which kind of scan is (or was last) running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    FirstScan,
    RepeatScan,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstScan => "first_scan",
            Self::RepeatScan => "repeat_scan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Comparing,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Comparing => "comparing",
        }
    }
}

/// How the most recent session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every expected step of a repeat scan was taken.
    Completed,
    /// The operator stopped the scan.
    Stopped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "Scan complete",
            Self::Stopped => "Scan stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: Option<ScanMode>,
    pub status: SessionStatus,
    pub step_count: usize,
    /// Trajectory length while comparing.
    pub expected_len: Option<usize>,
    /// Label of the patient being scanned.
    pub patient: Option<String>,
    pub last_outcome: Option<Outcome>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            mode: None,
            status: SessionStatus::Idle,
            step_count: 0,
            expected_len: None,
            patient: None,
            last_outcome: None,
        }
    }

    /// `Image count: n` or `Image count: n/m`.
    pub fn counter_text(&self) -> String {
        match self.expected_len {
            Some(total) => format!("Image count: {}/{}", self.step_count, total),
            None => format!("Image count: {}", self.step_count),
        }
    }
}
