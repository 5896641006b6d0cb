//! Primary + follow-up dispatch policy over a [`NotificationService`].
//!
//! Failures from the service are logged and swallowed: the occurrence store is
//! authoritative and the next explicit reschedule corrects a missed call.
//!
//! A request the OS has already shown is never submitted again under the same
//! id. Clearing it from the notification center is a separate step that the
//! coordinator only takes after a committed change.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::followup;
use super::gateway::{Delivery, NotificationRequest, NotificationService};
use super::ids::NotificationId;
use crate::channel::{DeliveryChannel, Settlement};
use crate::reminder::{Occurrence, OccurrenceId};
use crate::storage::Config;
use crate::time::overdue_by;

/// Decision for an occurrence's primary request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "plan", content = "at", rename_all = "snake_case")]
pub enum PrimaryPlan {
    /// Due in the future; deliver at the due time.
    Exact(DateTime<Utc>),
    /// Just missed, still inside the grace window.
    Immediate,
    /// Overdue beyond the grace window; nothing is sent.
    Missed,
    /// Completed or in the bin.
    Inactive,
}

/// Primary-request policy.
pub fn plan_primary(occurrence: &Occurrence, now: DateTime<Utc>, grace_window: Duration) -> PrimaryPlan {
    if !occurrence.is_live() {
        return PrimaryPlan::Inactive;
    }
    if occurrence.due > now {
        PrimaryPlan::Exact(occurrence.due)
    } else if overdue_by(occurrence.due, now) <= grace_window {
        PrimaryPlan::Immediate
    } else {
        PrimaryPlan::Missed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub primary: PrimaryPlan,
    pub follow_ups: usize,
    pub failures: usize,
}

pub struct NotificationDispatcher<N> {
    service: N,
    grace_window: Duration,
    snooze_minutes: u32,
    enabled: bool,
}

impl<N: NotificationService> NotificationDispatcher<N> {
    /// Dispatcher with the default 60 s grace window and 10 minute snooze.
    pub fn new(service: N) -> Self {
        Self {
            service,
            grace_window: Duration::seconds(60),
            snooze_minutes: 10,
            enabled: true,
        }
    }

    pub fn with_config(service: N, config: &Config) -> Self {
        Self {
            service,
            grace_window: config.grace_window(),
            snooze_minutes: config.notifications.snooze_minutes,
            enabled: config.notifications.enabled,
        }
    }

    pub fn service(&self) -> &N {
        &self.service
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Schedule the primary and follow-up requests for `occurrence`,
    /// skipping any that are already delivered.
    pub fn schedule_occurrence(&self, occurrence: &Occurrence, now: DateTime<Utc>) -> DispatchReport {
        let primary = plan_primary(occurrence, now, self.grace_window);
        let mut report = DispatchReport {
            primary,
            follow_ups: 0,
            failures: 0,
        };
        if !self.enabled || primary == PrimaryPlan::Inactive {
            return report;
        }
        let delivered = self.delivered_for(occurrence.id);

        let delivery = match primary {
            PrimaryPlan::Exact(at) => Some(Delivery::At(at)),
            PrimaryPlan::Immediate => Some(Delivery::Immediate),
            PrimaryPlan::Missed | PrimaryPlan::Inactive => None,
        };
        if let Some(delivery) = delivery {
            let request = NotificationRequest::for_occurrence(occurrence, 0, delivery, self.snooze_minutes);
            if delivered.contains(&request.id) {
                tracing::debug!(notification = %request.id, "already delivered, not resent");
            } else if !self.submit(request) {
                report.failures += 1;
            }
        } else {
            tracing::debug!(occurrence = %occurrence.id, due = %occurrence.due, "primary missed, not dispatched");
        }

        for request in followup::plan(occurrence, now, self.snooze_minutes) {
            if delivered.contains(&request.id) {
                continue;
            }
            if self.submit(request) {
                report.follow_ups += 1;
            } else {
                report.failures += 1;
            }
        }
        report
    }

    /// Remove pending and delivered requests belonging to `occurrence`.
    ///
    /// Returns the ids targeted.
    pub fn cancel_occurrence(&self, occurrence: &Occurrence) -> Vec<NotificationId> {
        let ids = self.known_ids(occurrence);
        self.cancel_pending_ids(occurrence.id, &ids);
        self.cancel_delivered_ids(occurrence.id, &ids);
        ids
    }

    /// Remove only the requests the OS has not shown yet.
    pub fn withdraw_pending(&self, occurrence: &Occurrence) -> Vec<NotificationId> {
        let ids = self.known_ids(occurrence);
        self.cancel_pending_ids(occurrence.id, &ids);
        ids
    }

    /// Remove already shown requests from the notification center.
    pub fn clear_delivered(&self, occurrence: &Occurrence) -> Vec<NotificationId> {
        let ids = self.known_ids(occurrence);
        self.cancel_delivered_ids(occurrence.id, &ids);
        ids
    }

    /// Derived ids plus any listed ones left over from an older, larger
    /// follow-up count.
    fn known_ids(&self, occurrence: &Occurrence) -> Vec<NotificationId> {
        let mut ids: BTreeSet<NotificationId> =
            NotificationId::all_for(occurrence.id, occurrence.follow_up.repeat_count)
                .into_iter()
                .collect();
        for listed in [self.service.list_pending(), self.service.list_delivered()] {
            match listed {
                Ok(requests) => ids.extend(
                    requests
                        .into_iter()
                        .map(|r| r.id)
                        .filter(|id| id.occurrence_id == occurrence.id),
                ),
                Err(e) => tracing::warn!(occurrence = %occurrence.id, "could not list notifications: {e}"),
            }
        }
        ids.into_iter().collect()
    }

    fn delivered_for(&self, occurrence_id: OccurrenceId) -> BTreeSet<NotificationId> {
        match self.service.list_delivered() {
            Ok(requests) => requests
                .into_iter()
                .map(|r| r.id)
                .filter(|id| id.occurrence_id == occurrence_id)
                .collect(),
            Err(e) => {
                tracing::warn!(occurrence = %occurrence_id, "could not list delivered notifications: {e}");
                BTreeSet::new()
            }
        }
    }

    fn cancel_pending_ids(&self, occurrence_id: OccurrenceId, ids: &[NotificationId]) {
        if let Err(e) = self.service.cancel_pending(ids) {
            tracing::warn!(occurrence = %occurrence_id, "cancel pending failed: {e}");
        }
    }

    fn cancel_delivered_ids(&self, occurrence_id: OccurrenceId, ids: &[NotificationId]) {
        if let Err(e) = self.service.cancel_delivered(ids) {
            tracing::warn!(occurrence = %occurrence_id, "cancel delivered failed: {e}");
        }
    }

    fn submit(&self, request: NotificationRequest) -> bool {
        let id = request.id;
        match self.service.schedule(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(notification = %id, "dispatch failed: {e}");
                false
            }
        }
    }
}

impl<N: NotificationService> DeliveryChannel for NotificationDispatcher<N> {
    fn name(&self) -> &'static str {
        "os-notifications"
    }

    fn cancel(&self, occurrence: &Occurrence) {
        self.withdraw_pending(occurrence);
    }

    fn settle(&self, before: &Occurrence, _settlement: Settlement) {
        self.clear_delivered(before);
    }

    fn schedule(&self, occurrence: &Occurrence, now: DateTime<Utc>) {
        self.schedule_occurrence(occurrence, now);
    }
}
