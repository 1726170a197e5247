//! Wall clocks for stamping cycle starts and record modifications.
//!
//! The engine never calls `Utc::now()` directly. It asks a [`Clock`], so tests
//! can pin time with a [`ManualClock`] and reason about exact watermarks.

use crate::Timestamp;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant, timezone-aware (UTC).
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock pinned at `at`.
    pub fn at(at: Timestamp) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Create a clock pinned at `millis` milliseconds after the Unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self::at(millis_to_timestamp(millis))
    }

    /// Move the clock to `at`. Moving backwards is allowed.
    pub fn set(&self, at: Timestamp) {
        *self.lock() = at;
    }

    /// Move the clock forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.advance(Duration::milliseconds(millis));
    }

    /// Move the clock by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        // A poisoned clock still holds a valid instant.
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }
}

/// The Unix epoch; the watermark of a store that was never synchronized.
pub fn epoch() -> Timestamp {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Convert milliseconds since the Unix epoch, saturating at the epoch for
/// values chrono cannot represent.
pub fn millis_to_timestamp(millis: i64) -> Timestamp {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(epoch)
}
