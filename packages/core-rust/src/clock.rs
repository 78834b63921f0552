//! Millisecond clock abstraction.
//!
//! Everything in relaygate that reasons about age (operation start times,
//! stale detection) reads time through [`ClockSource`] so tests can drive time
//! explicitly instead of sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the system clock for dependency injection.
///
/// The default implementation ([`SystemClock`]) delegates to `std::time::SystemTime`.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        // A clock set before 1970 reads as 0; ages then saturate instead of wrapping.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Milliseconds elapsed between `since` and `now`, saturating at zero when the
/// clock has stepped backwards.
#[must_use]
pub fn elapsed_ms(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}
