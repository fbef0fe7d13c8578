//! Wall clock abstraction shared by the coordinator, the blocking gate and the
//! render client.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local wall time, used for day boundaries.
    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// `local_now` treats the stored instant as local time so day-boundary
/// behavior does not depend on the machine's timezone.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }
}

/// Milliseconds from `start` to `now`, clamped at zero.
pub fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::milliseconds(1500));
        assert_eq!(elapsed_ms(start, clock.now()), 1500);
    }

    #[test]
    fn elapsed_never_goes_negative() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let earlier = start - Duration::seconds(5);
        assert_eq!(elapsed_ms(start, earlier), 0);
    }
}
