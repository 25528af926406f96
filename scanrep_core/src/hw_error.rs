//! Maps `Box<dyn Error>` from trait boundaries to typed `ScanError`.
//!
//! The traits in `scanrep_traits` use `Box<dyn Error + Send + Sync>` so that
//! drivers keep their own error types; this module converts those to our
//! typed enum, with an optional feature-gated path for
//! `scanrep_hardware::HwError` downcasting.

use crate::error::ScanError;

/// Map a trait-boundary error to a typed `ScanError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ScanError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<scanrep_hardware::error::HwError>() {
            return ScanError::Transport(hw.to_string());
        }
    }

    if let Some(scan) = e.downcast_ref::<ScanError>() {
        return scan.clone();
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("parse") || lower.contains("malformed") {
        ScanError::Parse(s)
    } else {
        ScanError::Transport(s)
    }
}
