//! Controllable wall clock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

/// Shared, settable clock for time-dependent assertions.
///
/// Clones share the same instant, so a step holding one clone can move time
/// for the application holding another.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use scenic_fixture::FakeClock;
///
/// let start = Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap();
/// let clock = FakeClock::at(start);
/// let application_view = clock.clone();
///
/// clock.advance(Duration::hours(2));
/// assert_eq!(application_view.now(), start + Duration::hours(2));
/// ```
#[derive(Clone, Debug)]
pub struct FakeClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    /// Clock frozen at `instant`.
    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(instant)),
        }
    }

    /// Current instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    /// Move time forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
