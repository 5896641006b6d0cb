//! Delivery channels driven by the series coordinator.
//!
//! Before committing a mutation the coordinator withdraws whatever has not
//! fired yet through every channel. Only once the commit succeeded does it
//! settle what the user has already seen and schedule the new state. A failed
//! commit therefore leaves delivered notifications and presented reminders
//! alone. Channels never fail the mutation; they log their own errors.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reminder::Occurrence;

/// What a committed mutation did to a record that existed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Hard-deleted.
    Removed,
    /// Newly marked complete.
    Completed,
    /// Any other change: edited, snoozed, binned, restored.
    Replaced,
}

pub trait DeliveryChannel {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Withdraw everything for `occurrence` that has not fired yet. Must be
    /// idempotent and must leave delivered or presented state untouched, so
    /// that a later `schedule` of the same record restores it exactly.
    fn cancel(&self, occurrence: &Occurrence);

    /// Clear what the user has already seen for `before`. Called only after
    /// the mutation is committed, and before the new state is scheduled.
    fn settle(&self, before: &Occurrence, settlement: Settlement);

    /// Arm delivery for `occurrence` as of `now`. Completed or binned
    /// occurrences are ignored.
    fn schedule(&self, occurrence: &Occurrence, now: DateTime<Utc>);
}
