//! Source of the current time.

use chrono::{DateTime, Utc};

/// Wall clock used for validation and timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(feature = "test-support")]
impl Clock for scenic_fixture::FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Self::now(self)
    }
}
