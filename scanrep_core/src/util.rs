//! Common time/period helpers for scanrep_core.
use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Period for a millisecond setting, clamped to at least 1 ms.
#[inline]
pub fn period_from_ms(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

/// Polling rate in Hz implied by a period; informational only.
#[inline]
pub fn rate_hz(period: Duration) -> u64 {
    let ms = (period.as_millis() as u64).max(1);
    (MILLIS_PER_SEC / ms).max(1)
}
