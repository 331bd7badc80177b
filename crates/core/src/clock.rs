//! Time source
//!
//! Expiration and cleanup gating read time through [`Clock`] so tests can
//! drive both deterministically with [`ManualClock`].

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the given Unix-millis instant
    pub fn at_millis(millis: i64) -> Self {
        let start = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }

    /// Move the clock forward. Saturates at the latest representable
    /// instant.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = chrono::Duration::try_milliseconds(saturating_millis(by))
            .and_then(|step| now.checked_add_signed(step))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Convert a duration to whole milliseconds, clamped to `i64::MAX`
pub fn saturating_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Convert Unix millis back to a timestamp, if representable
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
