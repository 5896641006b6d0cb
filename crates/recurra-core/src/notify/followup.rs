//! Follow-up fan-out.
//!
//! An incomplete occurrence with `repeat_count = N` gets N secondary requests
//! at `due + i * interval_minutes` for `i = 1..=N`. Offsets already in the past
//! are skipped; cancellation still covers their keys.

use chrono::{DateTime, Duration, Utc};

use super::gateway::{Delivery, NotificationRequest};
use crate::reminder::Occurrence;

/// Fire time of the `n`-th follow-up.
pub fn fire_time(occurrence: &Occurrence, n: u32) -> DateTime<Utc> {
    let minutes = i64::from(occurrence.follow_up.interval_minutes) * i64::from(n);
    occurrence.due + Duration::minutes(minutes)
}

/// Follow-up requests still worth scheduling at `now`.
pub fn plan(occurrence: &Occurrence, now: DateTime<Utc>, snooze_minutes: u32) -> Vec<NotificationRequest> {
    if !occurrence.is_live() || !occurrence.follow_up.is_enabled() {
        return Vec::new();
    }
    (1..=occurrence.follow_up.repeat_count)
        .filter_map(|n| {
            let at = fire_time(occurrence, n);
            (at > now).then(|| NotificationRequest::for_occurrence(occurrence, n, Delivery::At(at), snooze_minutes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ids::NotificationId;
    use crate::reminder::FollowUp;
    use chrono::TimeZone;

    fn occurrence(interval: u32, count: u32) -> Occurrence {
        let due = Utc.with_ymd_and_hms(2024, 8, 1, 9, 0, 0).unwrap();
        let mut occ = Occurrence::new("Stand up", due, due);
        occ.follow_up = FollowUp::new(interval, count);
        occ
    }

    #[test]
    fn fans_out_at_fixed_offsets() {
        let occ = occurrence(5, 3);
        let planned = plan(&occ, occ.due - Duration::minutes(1), 10);
        let times: Vec<_> = planned.iter().map(|r| r.delivery).collect();
        assert_eq!(
            times,
            vec![
                Delivery::At(occ.due + Duration::minutes(5)),
                Delivery::At(occ.due + Duration::minutes(10)),
                Delivery::At(occ.due + Duration::minutes(15)),
            ]
        );
        assert_eq!(planned[2].id, NotificationId::follow_up(occ.id, 3));
    }

    #[test]
    fn skips_follow_ups_already_passed() {
        let occ = occurrence(5, 3);
        let planned = plan(&occ, occ.due + Duration::minutes(7), 10);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].payload.sequence, 2);
    }

    #[test]
    fn completed_or_disabled_plans_nothing() {
        let mut occ = occurrence(5, 3);
        occ.completed = true;
        assert!(plan(&occ, occ.due, 10).is_empty());
        assert!(plan(&occurrence(0, 3), Utc::now(), 10).is_empty());
        assert!(plan(&occurrence(5, 0), Utc::now(), 10).is_empty());
    }
}
