//! Recurrence calculator.
//!
//! Pure functions from an anchor and a rule to concrete timestamps. Calendar
//! arithmetic goes through chrono's `Days`/`Months`, so month-end anchors clamp
//! to the last valid day (Jan 31 + 1 month = Feb 29 in a leap year).
//!
//! Members of a fixed-interval series are computed from the anchor rather than
//! from their predecessor: a monthly series anchored on the 31st lands on
//! Jan 31, Feb 29, Mar 31, Apr 30 instead of drifting to the 29th forever.

use chrono::{DateTime, Days, Months, NaiveDate, NaiveTime, Utc};

use crate::reminder::{Frequency, RecurrenceRule};
use crate::time::{at_date, floor_to_minute};

/// One rule application after `anchor`.
///
/// `None` and `Custom` rules have no cadence and return the anchor.
pub fn next_after(anchor: DateTime<Utc>, rule: RecurrenceRule) -> DateTime<Utc> {
    nth(anchor, rule, 1)
}

/// The `k`-th rule application counted from `anchor` (`k = 0` is the anchor).
pub fn nth(anchor: DateTime<Utc>, rule: RecurrenceRule, k: u32) -> DateTime<Utc> {
    let anchor = floor_to_minute(anchor);
    let steps = u64::from(rule.step()) * u64::from(k);
    if steps == 0 {
        return anchor;
    }

    let shifted = match rule.frequency {
        Frequency::None | Frequency::Custom => return anchor,
        Frequency::Daily => anchor.checked_add_days(Days::new(steps)),
        Frequency::Weekly => steps
            .checked_mul(7)
            .and_then(|days| anchor.checked_add_days(Days::new(days))),
        Frequency::Monthly => u32::try_from(steps)
            .ok()
            .and_then(|months| anchor.checked_add_months(Months::new(months))),
        Frequency::Yearly => steps
            .checked_mul(12)
            .and_then(|months| u32::try_from(months).ok())
            .and_then(|months| anchor.checked_add_months(Months::new(months))),
    };

    shifted.unwrap_or_else(|| {
        tracing::warn!(%anchor, ?rule, k, "recurrence step out of calendar range");
        anchor
    })
}

/// Anchor plus `count` further members, in order.
///
/// Rules without a cadence yield only the anchor.
pub fn materialize(anchor: DateTime<Utc>, rule: RecurrenceRule, count: u32) -> Vec<DateTime<Utc>> {
    if !rule.frequency.is_fixed_interval() {
        return vec![floor_to_minute(anchor)];
    }
    (0..=count).map(|k| nth(anchor, rule, k)).collect()
}

/// Put `time` onto every date, flooring seconds, sorted and de-duplicated.
pub fn merge_time_of_day(dates: &[NaiveDate], time: NaiveTime) -> Vec<DateTime<Utc>> {
    let mut merged: Vec<DateTime<Utc>> = dates.iter().map(|d| at_date(*d, time)).collect();
    merged.sort();
    merged.dedup();
    merged
}
