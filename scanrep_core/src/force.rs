//! Load-cell force from an OpenScale-style serial stream.
//!
//! The board prints one record per line: `timestamp,value,unit,` (four
//! fields, the last one empty). A background tick reads the newest record
//! and buffers its value.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use scanrep_traits::SerialLink;

use crate::config::ForceCfg;
use crate::error::{Result, ScanError};
use crate::hw_error::map_hw_error;
use crate::timer::RepeatingTimer;

/// Field separators in a well-formed record.
pub const RECORD_SEPARATORS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ForceRecord {
    pub timestamp: String,
    pub value: f64,
    pub unit: String,
}

/// A line is a record iff it has exactly three commas.
#[inline]
pub fn is_valid_record(line: &str) -> bool {
    line.bytes().filter(|&b| b == b',').count() == RECORD_SEPARATORS
}

/// Split a framed record and decode its value field.
pub fn parse_record(line: &str) -> Result<ForceRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !is_valid_record(line) {
        return Err(ScanError::Parse(format!(
            "expected {} fields, got {:?}",
            RECORD_SEPARATORS + 1,
            line
        )));
    }
    let mut fields = line.split(',');
    let timestamp = fields.next().unwrap_or_default().trim();
    let raw_value = fields.next().unwrap_or_default().trim();
    let unit = fields.next().unwrap_or_default().trim();
    let value: f64 = raw_value
        .parse()
        .map_err(|_| ScanError::Parse(format!("force value {raw_value:?} is not a number")))?;
    if !value.is_finite() {
        return Err(ScanError::Parse(format!("force value {raw_value:?} is not finite")));
    }
    Ok(ForceRecord {
        timestamp: timestamp.to_string(),
        value,
        unit: unit.to_string(),
    })
}

struct ReaderShared<L> {
    link: Mutex<L>,
    buffered_bits: AtomicU64,
    updates: AtomicU64,
    closed: AtomicBool,
}

impl<L: SerialLink> ReaderShared<L> {
    fn read_record(&self) -> Result<ForceRecord> {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.discard_pending().map_err(|e| map_hw_error(e.as_ref()))?;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(ScanError::Transport("load cell is closed".into()));
            }
            let line = link.read_line().map_err(|e| map_hw_error(e.as_ref()))?;
            if is_valid_record(line.trim_end_matches(['\r', '\n'])) {
                return parse_record(&line);
            }
            tracing::trace!(line = %line, "skipping unframed load-cell line");
        }
    }

    fn tick(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match self.read_record() {
            Ok(rec) => {
                self.buffered_bits.store(rec.value.to_bits(), Ordering::Release);
                self.updates.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(force = rec.value, unit = %rec.unit, "load cell sample");
            }
            Err(ScanError::Parse(msg)) => {
                tracing::debug!(error = %msg, "dropping malformed load-cell record");
            }
            Err(e) => {
                if !self.closed.load(Ordering::Acquire) {
                    tracing::warn!(error = %e, "load cell read failed; keeping last force");
                }
            }
        }
    }
}

/// Background-polled load-cell force.
pub struct ForceReader<L> {
    shared: Arc<ReaderShared<L>>,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl<L> ForceReader<L>
where
    L: SerialLink + Send + 'static,
{
    pub fn new(link: L) -> Self {
        Self {
            shared: Arc::new(ReaderShared {
                link: Mutex::new(link),
                buffered_bits: AtomicU64::new(0f64.to_bits()),
                updates: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn spawn(link: L, cfg: ForceCfg) -> Result<Self> {
        let reader = Self::new(link);
        reader.start(cfg.poll_period)?;
        Ok(reader)
    }

    pub fn start(&self, period: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(ScanError::invalid("force reader is closed"));
        }
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ScanError::invalid("force reader already polling"));
        }
        let shared = self.shared.clone();
        *slot = Some(RepeatingTimer::start("loadcell-poll", period, move || {
            shared.tick();
        })?);
        Ok(())
    }

    /// Block until a framed record arrives. Unframed and empty lines are
    /// skipped; a record whose value does not parse is an error.
    pub fn read_record(&self) -> Result<ForceRecord> {
        self.shared.read_record()
    }

    /// Unit field of the next record.
    pub fn read_unit(&self) -> Result<String> {
        Ok(self.read_record()?.unit)
    }

    /// One poll on the caller's thread, returning the new value.
    pub fn refresh(&self) -> Result<f64> {
        let rec = self.read_record()?;
        self.shared
            .buffered_bits
            .store(rec.value.to_bits(), Ordering::Release);
        self.shared.updates.fetch_add(1, Ordering::AcqRel);
        Ok(rec.value)
    }

    /// Last buffered force. `0.0` until the first record arrives.
    pub fn get_force(&self) -> f64 {
        f64::from_bits(self.shared.buffered_bits.load(Ordering::Acquire))
    }

    /// Number of records buffered so far.
    pub fn updates(&self) -> u64 {
        self.shared.updates.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(timer);
        tracing::debug!(force = self.get_force(), "force reader closed");
    }
}

impl<L> Drop for ForceReader<L> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        drop(
            self.timer
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234,0.512,kgs,", true)]
    #[case("1234,0.512,kgs", false)]
    #[case("1234,0.512,kgs,,", false)]
    #[case("", false)]
    #[case("Readings:", false)]
    fn framing_counts_separators(#[case] line: &str, #[case] valid: bool) {
        assert_eq!(is_valid_record(line), valid);
    }

    #[test]
    fn parses_value_and_unit() {
        let rec = parse_record("88210, -1.250 ,lbs,\r\n").unwrap();
        assert_eq!(rec.timestamp, "88210");
        assert_eq!(rec.value, -1.25);
        assert_eq!(rec.unit, "lbs");
    }

    #[rstest]
    #[case("1,abc,kgs,")]
    #[case("1,,kgs,")]
    #[case("1,inf,kgs,")]
    #[case("1,2,kgs")]
    fn bad_records_are_parse_errors(#[case] line: &str) {
        assert!(matches!(parse_record(line), Err(ScanError::Parse(_))));
    }
}
