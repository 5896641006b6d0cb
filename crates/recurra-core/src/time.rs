//! Shared time helpers.
//!
//! All timestamps are `DateTime<Utc>` at minute precision. Seconds and
//! sub-second parts are floored away so repeated edits compare equal.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// Source of "now" for every component that makes time-based decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.lock();
        *guard += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Drop seconds and nanoseconds.
pub fn floor_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Time-of-day of a timestamp, floored to the minute.
pub fn time_of_day(at: DateTime<Utc>) -> NaiveTime {
    let t = at.time();
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

/// Combine a calendar date with a time-of-day, seconds floored.
pub fn at_date(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let floored = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
    Utc.from_utc_datetime(&date.and_time(floored))
}

/// Minutes since `due` (negative while still in the future).
pub fn overdue_by(due: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now - due
}
