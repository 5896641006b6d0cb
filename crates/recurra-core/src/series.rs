//! Series mutation coordinator.
//!
//! Every mutation follows the same sequence:
//!
//! 1. fetch the affected records (a failure here aborts with no side effects)
//! 2. withdraw pending deliveries for each record being changed or removed
//! 3. stage the writes and commit
//! 4. on success, settle what was already delivered for those records, then
//!    schedule every created or surviving record
//!
//! If the commit fails after step 2, the pre-mutation records are scheduled
//! again. Delivered notifications were never touched, so the channels end up
//! as they were, and the persistence error is returned.
//!
//! References to ids that no longer exist are no-ops: the caller gets an empty
//! [`MutationOutcome`] and a debug log line.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::channel::{DeliveryChannel, Settlement};
use crate::error::{Result, ValidationError};
use crate::notify::{NotificationAction, NotificationId};
use crate::recurrence::{materialize, merge_time_of_day, nth};
use crate::reminder::{Frequency, Occurrence, OccurrenceId, RecurrenceRule, ReminderDraft, SeriesId};
use crate::storage::{OccurrenceFilter, OccurrenceStore};
use crate::time::{floor_to_minute, time_of_day, Clock};

/// Ids touched by one committed mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<SeriesId>,
    pub created: Vec<OccurrenceId>,
    pub updated: Vec<OccurrenceId>,
    pub deleted: Vec<OccurrenceId>,
}

impl MutationOutcome {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Result of a single-occurrence edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied(MutationOutcome),
    /// The edit changes what defines the series. The caller must choose
    /// between [`SeriesCoordinator::edit_this_only`] and
    /// [`SeriesCoordinator::edit_series`]. Nothing was changed.
    DisambiguationRequired {
        occurrence_id: OccurrenceId,
        series_id: SeriesId,
    },
}

impl EditOutcome {
    pub fn applied(&self) -> Option<&MutationOutcome> {
        match self {
            EditOutcome::Applied(outcome) => Some(outcome),
            EditOutcome::DisambiguationRequired { .. } => None,
        }
    }
}

/// Staged writes plus the pre-mutation records whose deliveries go first.
#[derive(Debug, Default)]
struct Plan {
    series_id: Option<SeriesId>,
    cancel: Vec<Occurrence>,
    insert: Vec<Occurrence>,
    update: Vec<Occurrence>,
    delete: Vec<OccurrenceId>,
}

impl Plan {
    fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Replace `before` with `after` in place.
    fn replace(&mut self, before: Occurrence, after: Occurrence) {
        self.cancel.push(before);
        self.update.push(after);
    }

    fn remove(&mut self, before: Occurrence) {
        self.delete.push(before.id);
        self.cancel.push(before);
    }

    fn settlement(&self, before: &Occurrence) -> Settlement {
        if self.delete.contains(&before.id) {
            return Settlement::Removed;
        }
        let completed = self
            .update
            .iter()
            .any(|after| after.id == before.id && after.completed && !before.completed);
        if completed {
            Settlement::Completed
        } else {
            Settlement::Replaced
        }
    }
}

pub struct SeriesCoordinator<S> {
    store: S,
    channels: Vec<Box<dyn DeliveryChannel>>,
    clock: Arc<dyn Clock>,
}

impl<S: OccurrenceStore> SeriesCoordinator<S> {
    /// Coordinator with no delivery channels attached.
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            channels: Vec::new(),
            clock,
        }
    }

    pub fn with_channel(mut self, channel: impl DeliveryChannel + 'static) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn add_channel(&mut self, channel: impl DeliveryChannel + 'static) {
        self.channels.push(Box::new(channel));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Committed records matching `filter`.
    pub fn occurrences(&self, filter: &OccurrenceFilter) -> Result<Vec<Occurrence>> {
        Ok(self.store.fetch(filter)?)
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Create a single reminder or a whole series from `draft`.
    pub fn create_series(&mut self, draft: &ReminderDraft) -> Result<MutationOutcome> {
        draft.validate()?;
        let now = self.clock.now();
        let mut plan = Plan::default();
        if draft.rule.is_none() {
            plan.insert.push(member_of(draft, floor_to_minute(draft.due), None, now));
        } else {
            let series_id = SeriesId::new();
            plan.series_id = Some(series_id);
            plan.insert = draft_timestamps(draft)
                .into_iter()
                .map(|due| member_of(draft, due, Some(series_id), now))
                .collect();
        }
        tracing::debug!(
            title = %draft.title,
            frequency = %draft.rule.frequency,
            members = plan.insert.len(),
            "creating reminder"
        );
        self.apply(plan)
    }

    // ── Edits ────────────────────────────────────────────────────────

    /// Edit one occurrence.
    ///
    /// An unparented occurrence given a recurring rule is promoted into a new
    /// series. A series member whose frequency or interval would change is
    /// left alone and [`EditOutcome::DisambiguationRequired`] is returned.
    pub fn edit_single(&mut self, id: OccurrenceId, draft: &ReminderDraft) -> Result<EditOutcome> {
        draft.validate()?;
        let Some(existing) = self.lookup(id)? else {
            return Ok(EditOutcome::Applied(MutationOutcome::default()));
        };

        let series = existing.series_id;
        let plan = match series {
            Some(series_id) if existing.rule.defines_different_series(&draft.rule) => {
                tracing::debug!(occurrence = %id, series = %series_id, "edit needs disambiguation");
                return Ok(EditOutcome::DisambiguationRequired {
                    occurrence_id: id,
                    series_id,
                });
            }
            Some(_) => {
                let mut updated = existing.clone();
                apply_draft(&mut updated, draft);
                updated.rule = existing.rule;
                let mut plan = Plan::default();
                plan.series_id = existing.series_id;
                plan.replace(existing, updated);
                plan
            }
            None => plan_unparented_edit(existing, draft, self.clock.now()),
        };
        self.apply(plan).map(EditOutcome::Applied)
    }

    /// Detach one occurrence from its series and apply `draft` to it alone.
    pub fn edit_this_only(&mut self, id: OccurrenceId, draft: &ReminderDraft) -> Result<EditOutcome> {
        draft.validate()?;
        let Some(existing) = self.lookup(id)? else {
            return Ok(EditOutcome::Applied(MutationOutcome::default()));
        };
        let plan = plan_unparented_edit(existing, draft, self.clock.now());
        self.apply(plan).map(EditOutcome::Applied)
    }

    /// Rewrite a whole series from `draft`.
    ///
    /// Fixed-interval rules resize the series to `draft.count + 1` members,
    /// trimming the latest ones or appending after the last, then recompute
    /// every timestamp from `draft.due`. Custom rules replace only members due
    /// at or after now so that they match the new date set; earlier members
    /// are left untouched. Members in the bin take part like any other, so a
    /// later restore never collides with the rewritten series.
    pub fn edit_series(&mut self, series_id: SeriesId, draft: &ReminderDraft) -> Result<MutationOutcome> {
        draft.validate()?;
        if draft.rule.is_none() {
            return Err(ValidationError::InvalidValue {
                field: "rule".into(),
                message: "a series edit needs a recurring rule".into(),
            }
            .into());
        }
        let members = self.store.fetch(&OccurrenceFilter {
            series_id: Some(series_id),
            ..OccurrenceFilter::all()
        })?;
        if members.is_empty() {
            tracing::debug!(series = %series_id, "series not found, nothing to edit");
            return Ok(MutationOutcome::default());
        }

        let now = self.clock.now();
        let plan = if draft.rule.frequency == Frequency::Custom {
            plan_custom_series_edit(series_id, members, draft, now)
        } else {
            plan_fixed_series_edit(series_id, members, draft, now)
        };
        self.apply(plan)
    }

    // ── Deletes ──────────────────────────────────────────────────────

    pub fn delete_occurrence(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        let Some(existing) = self.lookup(id)? else {
            return Ok(MutationOutcome::default());
        };
        let mut plan = Plan::default();
        plan.remove(existing);
        self.apply(plan)
    }

    /// Hard-delete every member of a series, including ones in the bin.
    pub fn delete_series(&mut self, series_id: SeriesId) -> Result<MutationOutcome> {
        let members = self.store.fetch(&OccurrenceFilter {
            series_id: Some(series_id),
            ..OccurrenceFilter::all()
        })?;
        let mut plan = Plan::default();
        plan.series_id = Some(series_id);
        for member in members {
            plan.remove(member);
        }
        self.apply(plan)
    }

    /// Hard-delete series members due strictly after the pivot. The pivot
    /// itself stays.
    pub fn delete_future_from(&mut self, pivot: OccurrenceId) -> Result<MutationOutcome> {
        let Some(pivot) = self.lookup(pivot)? else {
            return Ok(MutationOutcome::default());
        };
        let Some(series_id) = pivot.series_id else {
            return Ok(MutationOutcome::default());
        };
        let members = self.store.fetch(&OccurrenceFilter {
            series_id: Some(series_id),
            ..OccurrenceFilter::all()
        })?;
        let mut plan = Plan::default();
        plan.series_id = Some(series_id);
        for member in members.into_iter().filter(|m| m.due > pivot.due) {
            plan.remove(member);
        }
        self.apply(plan)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn complete(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        let now = self.clock.now();
        self.modify(id, |o| {
            o.completed = true;
            o.completed_at = Some(now);
        })
    }

    pub fn uncomplete(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        self.modify(id, |o| {
            o.completed = false;
            o.completed_at = None;
        })
    }

    /// Push the due time to `minutes` from now.
    pub fn snooze(&mut self, id: OccurrenceId, minutes: u32) -> Result<MutationOutcome> {
        if minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "minutes".into(),
                message: "snooze must be at least one minute".into(),
            }
            .into());
        }
        let due = floor_to_minute(self.clock.now() + Duration::minutes(i64::from(minutes)));
        self.modify(id, |o| {
            o.due = due;
            o.completed = false;
            o.completed_at = None;
        })
    }

    /// Soft-delete into the recoverable bin.
    pub fn move_to_bin(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        self.modify(id, |o| o.deleted = true)
    }

    /// Take an occurrence out of the bin; rescheduled if still upcoming.
    pub fn restore(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        self.modify(id, |o| o.deleted = false)
    }

    /// Hard-delete an occurrence that is in the bin.
    pub fn purge(&mut self, id: OccurrenceId) -> Result<MutationOutcome> {
        let Some(existing) = self.lookup(id)? else {
            return Ok(MutationOutcome::default());
        };
        if !existing.deleted {
            return Err(ValidationError::InvalidValue {
                field: "id".into(),
                message: format!("{id} is not in the bin"),
            }
            .into());
        }
        let mut plan = Plan::default();
        plan.remove(existing);
        self.apply(plan)
    }

    pub fn empty_bin(&mut self) -> Result<MutationOutcome> {
        let binned = self.store.fetch(&OccurrenceFilter::bin())?;
        let mut plan = Plan::default();
        for occurrence in binned {
            plan.remove(occurrence);
        }
        self.apply(plan)
    }

    /// Route an action tapped on an OS notification.
    pub fn handle_action(&mut self, id: NotificationId, action: NotificationAction) -> Result<MutationOutcome> {
        tracing::info!(notification = %id, ?action, "notification action");
        match action {
            NotificationAction::Complete => self.complete(id.occurrence_id),
            NotificationAction::Snooze { minutes } => self.snooze(id.occurrence_id, minutes),
        }
    }

    /// Schedule every live occurrence again. Returns how many were passed
    /// to the channels.
    pub fn resync(&mut self) -> Result<usize> {
        let live = self
            .store
            .fetch(&OccurrenceFilter::active().completed(false))?;
        let now = self.clock.now();
        for occurrence in &live {
            self.schedule(occurrence, now);
        }
        tracing::info!(count = live.len(), "resynced deliveries");
        Ok(live.len())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lookup(&self, id: OccurrenceId) -> Result<Option<Occurrence>> {
        let found = self.store.get(id)?;
        if found.is_none() {
            tracing::debug!(occurrence = %id, "occurrence not found, ignoring");
        }
        Ok(found)
    }

    fn modify(&mut self, id: OccurrenceId, change: impl FnOnce(&mut Occurrence)) -> Result<MutationOutcome> {
        let Some(existing) = self.lookup(id)? else {
            return Ok(MutationOutcome::default());
        };
        let mut updated = existing.clone();
        change(&mut updated);
        let mut plan = Plan::default();
        plan.series_id = existing.series_id;
        plan.replace(existing, updated);
        self.apply(plan)
    }

    fn apply(&mut self, plan: Plan) -> Result<MutationOutcome> {
        let outcome = MutationOutcome {
            series_id: plan.series_id,
            created: plan.insert.iter().map(|o| o.id).collect(),
            updated: plan.update.iter().map(|o| o.id).collect(),
            deleted: plan.delete.clone(),
        };
        if plan.is_empty() {
            return Ok(outcome);
        }

        for before in &plan.cancel {
            self.cancel(before);
        }

        for occurrence in &plan.insert {
            self.store.insert(occurrence.clone());
        }
        for occurrence in &plan.update {
            self.store.update(occurrence.clone());
        }
        for id in &plan.delete {
            self.store.delete(*id);
        }

        let now = self.clock.now();
        if let Err(e) = self.store.save() {
            tracing::warn!("commit failed, restoring deliveries: {e}");
            for before in &plan.cancel {
                self.schedule(before, now);
            }
            return Err(e.into());
        }

        for before in &plan.cancel {
            self.settle(before, plan.settlement(before));
        }
        for occurrence in plan.insert.iter().chain(&plan.update) {
            self.schedule(occurrence, now);
        }
        tracing::debug!(
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            "mutation committed"
        );
        Ok(outcome)
    }

    fn cancel(&self, occurrence: &Occurrence) {
        for channel in &self.channels {
            channel.cancel(occurrence);
        }
    }

    fn settle(&self, before: &Occurrence, settlement: Settlement) {
        for channel in &self.channels {
            channel.settle(before, settlement);
        }
    }

    fn schedule(&self, occurrence: &Occurrence, now: DateTime<Utc>) {
        if !occurrence.is_live() {
            return;
        }
        for channel in &self.channels {
            channel.schedule(occurrence, now);
        }
    }
}

// ── Planning helpers ─────────────────────────────────────────────────

/// Timestamps a draft describes, anchor first.
fn draft_timestamps(draft: &ReminderDraft) -> Vec<DateTime<Utc>> {
    let anchor = floor_to_minute(draft.due);
    match draft.rule.frequency {
        Frequency::None => vec![anchor],
        Frequency::Custom => {
            let mut merged = merge_time_of_day(&draft.custom_dates, time_of_day(anchor));
            merged.retain(|t| *t != anchor);
            merged.insert(0, anchor);
            merged
        }
        Frequency::Daily | Frequency::Weekly | Frequency::Monthly | Frequency::Yearly => {
            materialize(anchor, draft.rule, draft.count)
        }
    }
}

fn member_of(
    draft: &ReminderDraft,
    due: DateTime<Utc>,
    series_id: Option<SeriesId>,
    now: DateTime<Utc>,
) -> Occurrence {
    let mut occurrence = Occurrence::new(draft.title.clone(), due, now);
    occurrence.series_id = series_id;
    occurrence.rule = draft.rule;
    occurrence.follow_up = draft.follow_up;
    occurrence
}

/// Copy the editable fields of `draft` onto `occurrence`.
fn apply_draft(occurrence: &mut Occurrence, draft: &ReminderDraft) {
    occurrence.title = draft.title.clone();
    occurrence.due = floor_to_minute(draft.due);
    occurrence.rule = draft.rule;
    occurrence.follow_up = draft.follow_up;
}

/// Apply `draft` to `existing` as a standalone record, promoting it into a
/// fresh series when the rule recurs.
fn plan_unparented_edit(existing: Occurrence, draft: &ReminderDraft, now: DateTime<Utc>) -> Plan {
    let mut updated = existing.clone();
    apply_draft(&mut updated, draft);
    updated.series_id = None;

    let mut plan = Plan::default();
    if !draft.rule.is_none() {
        let series_id = SeriesId::new();
        updated.series_id = Some(series_id);
        plan.series_id = Some(series_id);
        plan.insert = draft_timestamps(draft)
            .into_iter()
            .skip(1)
            .map(|due| member_of(draft, due, Some(series_id), now))
            .collect();
        tracing::debug!(occurrence = %existing.id, series = %series_id, "promoting into series");
    } else {
        updated.rule = RecurrenceRule::NONE;
    }
    plan.replace(existing, updated);
    plan
}

fn plan_fixed_series_edit(
    series_id: SeriesId,
    mut members: Vec<Occurrence>,
    draft: &ReminderDraft,
    now: DateTime<Utc>,
) -> Plan {
    let desired = draft.count as usize + 1;
    let anchor = floor_to_minute(draft.due);
    let mut plan = Plan::default();
    plan.series_id = Some(series_id);

    let tail = if members.len() > desired {
        members.split_off(desired)
    } else {
        Vec::new()
    };
    for trimmed in tail {
        plan.remove(trimmed);
    }

    let kept = members.len();
    for (k, before) in members.into_iter().enumerate() {
        let mut after = before.clone();
        apply_draft(&mut after, draft);
        after.due = nth(anchor, draft.rule, k as u32);
        plan.replace(before, after);
    }
    for k in kept..desired {
        plan.insert
            .push(member_of(draft, nth(anchor, draft.rule, k as u32), Some(series_id), now));
    }
    plan
}

fn plan_custom_series_edit(
    series_id: SeriesId,
    members: Vec<Occurrence>,
    draft: &ReminderDraft,
    now: DateTime<Utc>,
) -> Plan {
    let mut plan = Plan::default();
    plan.series_id = Some(series_id);

    let mut targets: Vec<DateTime<Utc>> = draft_timestamps(draft)
        .into_iter()
        .filter(|t| *t >= now)
        .collect();
    targets.sort();

    let (future, past): (Vec<Occurrence>, Vec<Occurrence>) =
        members.into_iter().partition(|m| m.due >= now);
    tracing::debug!(
        series = %series_id,
        untouched = past.len(),
        replacing = future.len(),
        targets = targets.len(),
        "custom series edit"
    );

    let mut unmatched = future;
    for due in targets {
        match unmatched.iter().position(|m| m.due == due) {
            Some(i) => {
                let before = unmatched.swap_remove(i);
                let mut after = before.clone();
                apply_draft(&mut after, draft);
                after.due = due;
                plan.replace(before, after);
            }
            None => plan.insert.push(member_of(draft, due, Some(series_id), now)),
        }
    }
    for stale in unmatched {
        plan.remove(stale);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::time::ManualClock;
    use chrono::{NaiveDate, TimeZone};
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Cancel(OccurrenceId, usize),
        Settle(OccurrenceId, Settlement, usize),
        Schedule(OccurrenceId, usize),
    }

    /// Records channel calls with the commit count at the time of the call.
    #[derive(Clone)]
    struct Probe {
        store: MemoryStore,
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Probe {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    impl DeliveryChannel for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn cancel(&self, occurrence: &Occurrence) {
            let saves = self.store.save_count();
            self.events.lock().unwrap().push(Event::Cancel(occurrence.id, saves));
        }

        fn settle(&self, before: &Occurrence, settlement: Settlement) {
            let saves = self.store.save_count();
            self.events
                .lock()
                .unwrap()
                .push(Event::Settle(before.id, settlement, saves));
        }

        fn schedule(&self, occurrence: &Occurrence, _now: DateTime<Utc>) {
            let saves = self.store.save_count();
            self.events.lock().unwrap().push(Event::Schedule(occurrence.id, saves));
        }
    }

    fn setup(now: DateTime<Utc>) -> (SeriesCoordinator<MemoryStore>, MemoryStore, Probe, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(now);
        let probe = Probe {
            store: store.clone(),
            events: Arc::new(Mutex::new(Vec::new())),
        };
        let coordinator =
            SeriesCoordinator::new(store.clone(), Arc::new(clock.clone())).with_channel(probe.clone());
        (coordinator, store, probe, clock)
    }

    fn dues(store: &MemoryStore) -> Vec<DateTime<Utc>> {
        store.snapshot().iter().map(|o| o.due).collect()
    }

    #[test]
    fn single_reminder_has_no_series() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Dentist", at(2024, 3, 5, 9, 30)))
            .unwrap();
        assert_eq!(out.created.len(), 1);
        assert_eq!(out.series_id, None);
        assert_eq!(store.snapshot()[0].series_id, None);
    }

    #[test]
    fn daily_series_over_month_end() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Walk", at(2024, 1, 31, 10, 0)).with_rule(RecurrenceRule::daily(1), 2);
        let out = c.create_series(&draft).unwrap();
        assert_eq!(out.created.len(), 3);
        assert_eq!(
            dues(&store),
            vec![at(2024, 1, 31, 10, 0), at(2024, 2, 1, 10, 0), at(2024, 2, 2, 10, 0)]
        );
        assert!(store.snapshot().iter().all(|o| o.series_id == out.series_id));
    }

    #[test]
    fn monthly_from_jan_31_lands_on_leap_day() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Rent", at(2024, 1, 31, 9, 0)).with_rule(RecurrenceRule::monthly(1), 1);
        c.create_series(&draft).unwrap();
        assert_eq!(dues(&store)[1], at(2024, 2, 29, 9, 0));
    }

    #[test]
    fn custom_series_keeps_anchor_and_drops_duplicates() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Pills", at(2024, 5, 1, 8, 15))
            .with_custom_dates(vec![date(2024, 5, 3), date(2024, 5, 1), date(2024, 5, 3)]);
        c.create_series(&draft).unwrap();
        assert_eq!(dues(&store), vec![at(2024, 5, 1, 8, 15), at(2024, 5, 3, 8, 15)]);
    }

    #[test]
    fn custom_without_dates_is_rejected() {
        let (mut c, store, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let mut draft = ReminderDraft::new("Pills", at(2024, 5, 1, 8, 0));
        draft.rule = RecurrenceRule::custom();
        assert!(c.create_series(&draft).is_err());
        assert!(store.snapshot().is_empty());
        assert!(probe.events().is_empty());
    }

    #[test]
    fn create_schedules_after_commit() {
        let (mut c, _, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        assert_eq!(probe.events(), vec![Event::Schedule(out.created[0], 1)]);
    }

    #[test]
    fn edit_single_promotes_unparented_occurrence() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)))
            .unwrap();
        let id = out.created[0];

        let draft = ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)).with_rule(RecurrenceRule::weekly(1), 3);
        let edited = c.edit_single(id, &draft).unwrap();
        let applied = edited.applied().unwrap();
        assert_eq!(applied.created.len(), 3);
        assert_eq!(applied.updated, vec![id]);

        let all = store.snapshot();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, id);
        assert!(all.iter().all(|o| o.series_id == applied.series_id && o.series_id.is_some()));
        assert_eq!(all[3].due, at(2024, 2, 22, 18, 0));
    }

    #[test]
    fn edit_single_changing_frequency_needs_disambiguation() {
        let (mut c, store, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)).with_rule(RecurrenceRule::weekly(1), 2);
        let out = c.create_series(&draft).unwrap();
        probe.clear();
        let before = store.snapshot();

        let changed = ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)).with_rule(RecurrenceRule::daily(1), 2);
        let edited = c.edit_single(out.created[1], &changed).unwrap();
        assert_eq!(
            edited,
            EditOutcome::DisambiguationRequired {
                occurrence_id: out.created[1],
                series_id: out.series_id.unwrap(),
            }
        );
        assert_eq!(store.snapshot(), before);
        assert!(probe.events().is_empty());
    }

    #[test]
    fn edit_single_in_series_with_same_rule_updates_one() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)).with_rule(RecurrenceRule::weekly(1), 2);
        let out = c.create_series(&draft).unwrap();
        let target = out.created[1];

        let retitled = ReminderDraft::new("Swim", at(2024, 2, 8, 19, 0)).with_rule(RecurrenceRule::weekly(1), 0);
        c.edit_single(target, &retitled).unwrap();
        let edited = store.get(target).unwrap().unwrap();
        assert_eq!(edited.title, "Swim");
        assert_eq!(edited.due, at(2024, 2, 8, 19, 0));
        assert_eq!(edited.series_id, out.series_id);
        assert_eq!(store.snapshot().iter().filter(|o| o.title == "Gym").count(), 2);
    }

    #[test]
    fn edit_this_only_detaches_from_series() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Gym", at(2024, 2, 1, 18, 0)).with_rule(RecurrenceRule::weekly(1), 2);
        let out = c.create_series(&draft).unwrap();
        let target = out.created[2];

        let single = ReminderDraft::new("Gym (moved)", at(2024, 2, 16, 7, 0));
        c.edit_this_only(target, &single).unwrap();
        let detached = store.get(target).unwrap().unwrap();
        assert_eq!(detached.series_id, None);
        assert_eq!(detached.rule, RecurrenceRule::NONE);
        assert_eq!(store.fetch(&OccurrenceFilter::series(out.series_id.unwrap())).unwrap().len(), 2);
    }

    #[test]
    fn shrinking_fixed_series_trims_the_tail() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Read", at(2024, 3, 1, 21, 0)).with_rule(RecurrenceRule::daily(1), 4);
        let out = c.create_series(&draft).unwrap();
        c.complete(out.created[0]).unwrap();

        let shrunk = c
            .edit_series(out.series_id.unwrap(), &draft.clone().with_rule(RecurrenceRule::daily(1), 1))
            .unwrap();
        assert_eq!(shrunk.deleted, out.created[2..].to_vec());
        let left = store.snapshot();
        assert_eq!(left.len(), 2);
        assert!(left[0].completed);
        assert_eq!(left[1].due, at(2024, 3, 2, 21, 0));
    }

    #[test]
    fn growing_fixed_series_continues_after_last() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Read", at(2024, 3, 1, 21, 0)).with_rule(RecurrenceRule::weekly(2), 1);
        let out = c.create_series(&draft).unwrap();
        let grown = c
            .edit_series(out.series_id.unwrap(), &draft.clone().with_rule(RecurrenceRule::weekly(2), 3))
            .unwrap();
        assert_eq!(grown.created.len(), 2);
        assert_eq!(
            dues(&store),
            vec![
                at(2024, 3, 1, 21, 0),
                at(2024, 3, 15, 21, 0),
                at(2024, 3, 29, 21, 0),
                at(2024, 4, 12, 21, 0)
            ]
        );
    }

    #[test]
    fn custom_series_edit_never_touches_the_past() {
        let now = at(2024, 6, 10, 12, 0);
        let (mut c, store, _, clock) = setup(at(2024, 6, 1, 0, 0));
        let draft = ReminderDraft::new("Water plants", at(2024, 6, 2, 9, 0))
            .with_custom_dates(vec![date(2024, 6, 5), date(2024, 6, 12), date(2024, 6, 20)]);
        let out = c.create_series(&draft).unwrap();
        c.complete(out.created[0]).unwrap();
        clock.set(now);
        let past_before: Vec<Occurrence> = store.snapshot().into_iter().filter(|o| o.due < now).collect();

        let edit = ReminderDraft::new("Water plants", at(2024, 6, 12, 9, 0))
            .with_custom_dates(vec![date(2024, 6, 12), date(2024, 6, 15), date(2024, 6, 1)]);
        c.edit_series(out.series_id.unwrap(), &edit).unwrap();

        let all = store.snapshot();
        let past_after: Vec<Occurrence> = all.iter().filter(|o| o.due < now).cloned().collect();
        assert_eq!(past_after, past_before);
        let future: Vec<_> = all.iter().filter(|o| o.due >= now).map(|o| o.due).collect();
        assert_eq!(future, vec![at(2024, 6, 12, 9, 0), at(2024, 6, 15, 9, 0)]);
        // the 12th was kept in place
        assert!(all.iter().any(|o| o.id == out.created[2]));
    }

    #[test]
    fn repeated_custom_edit_is_idempotent() {
        let (mut c, store, _, _) = setup(at(2024, 6, 1, 0, 0));
        let draft = ReminderDraft::new("Yoga", at(2024, 6, 3, 7, 0))
            .with_custom_dates(vec![date(2024, 6, 4), date(2024, 6, 6)]);
        let out = c.create_series(&draft).unwrap();
        let sid = out.series_id.unwrap();
        c.edit_series(sid, &draft).unwrap();
        let first = store.snapshot();
        let again = c.edit_series(sid, &draft).unwrap();
        assert!(again.created.is_empty() && again.deleted.is_empty());
        assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn edit_series_rejects_non_recurring_rule() {
        let (mut c, _, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Read", at(2024, 3, 1, 21, 0)).with_rule(RecurrenceRule::daily(1), 1);
        let out = c.create_series(&draft).unwrap();
        let err = c
            .edit_series(out.series_id.unwrap(), &ReminderDraft::new("Read", at(2024, 3, 1, 21, 0)))
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Validation(_)));
    }

    #[test]
    fn binned_member_follows_series_rewrite() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Read", at(2024, 3, 1, 9, 0)).with_rule(RecurrenceRule::daily(1), 2);
        let out = c.create_series(&draft).unwrap();
        let binned = out.created[1];
        c.move_to_bin(binned).unwrap();

        let moved = ReminderDraft::new("Read", at(2024, 3, 5, 9, 0)).with_rule(RecurrenceRule::daily(1), 1);
        let edited = c.edit_series(out.series_id.unwrap(), &moved).unwrap();
        assert_eq!(edited.deleted, vec![out.created[2]]);
        let still_binned = store.get(binned).unwrap().unwrap();
        assert!(still_binned.deleted);
        assert_eq!(still_binned.due, at(2024, 3, 6, 9, 0));

        c.restore(binned).unwrap();
        let members = store
            .fetch(&OccurrenceFilter::series(out.series_id.unwrap()))
            .unwrap();
        let dues: Vec<_> = members.iter().map(|o| o.due).collect();
        assert_eq!(dues, vec![at(2024, 3, 5, 9, 0), at(2024, 3, 6, 9, 0)]);
    }

    #[test]
    fn new_members_are_stamped_with_the_clock() {
        let now = at(2024, 2, 10, 8, 30);
        let (mut c, store, _, _) = setup(now);
        let draft = ReminderDraft::new("Stretch", at(2024, 3, 1, 7, 0)).with_rule(RecurrenceRule::weekly(1), 2);
        c.create_series(&draft).unwrap();
        assert!(store.snapshot().iter().all(|o| o.created_at == now));
    }

    #[test]
    fn delete_future_from_keeps_pivot_and_earlier() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Run", at(2024, 4, 1, 6, 0)).with_rule(RecurrenceRule::daily(1), 4);
        let out = c.create_series(&draft).unwrap();
        let removed = c.delete_future_from(out.created[2]).unwrap();
        assert_eq!(removed.deleted, out.created[3..].to_vec());
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn delete_series_removes_binned_members_too() {
        let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Run", at(2024, 4, 1, 6, 0)).with_rule(RecurrenceRule::daily(1), 2);
        let out = c.create_series(&draft).unwrap();
        c.move_to_bin(out.created[1]).unwrap();
        c.delete_series(out.series_id.unwrap()).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn delete_cancels_before_commit() {
        let (mut c, _, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        probe.clear();
        c.delete_occurrence(out.created[0]).unwrap();
        assert_eq!(
            probe.events(),
            vec![
                Event::Cancel(out.created[0], 1),
                Event::Settle(out.created[0], Settlement::Removed, 2)
            ]
        );
    }

    #[test]
    fn complete_cancels_and_does_not_reschedule() {
        let (mut c, store, probe, clock) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        probe.clear();
        c.complete(out.created[0]).unwrap();
        assert_eq!(
            probe.events(),
            vec![
                Event::Cancel(out.created[0], 1),
                Event::Settle(out.created[0], Settlement::Completed, 2)
            ]
        );
        let done = store.get(out.created[0]).unwrap().unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(clock.now()));

        probe.clear();
        c.uncomplete(out.created[0]).unwrap();
        assert_eq!(
            probe.events(),
            vec![
                Event::Cancel(out.created[0], 2),
                Event::Settle(out.created[0], Settlement::Replaced, 3),
                Event::Schedule(out.created[0], 3)
            ]
        );
    }

    #[test]
    fn snooze_moves_due_from_now() {
        let now = at(2024, 1, 2, 9, 0);
        let (mut c, store, _, clock) = setup(at(2024, 1, 1, 0, 0));
        let out = c.create_series(&ReminderDraft::new("Call", now)).unwrap();
        clock.set(now + Duration::seconds(42));
        c.snooze(out.created[0], 10).unwrap();
        assert_eq!(store.get(out.created[0]).unwrap().unwrap().due, at(2024, 1, 2, 9, 10));
        assert!(c.snooze(out.created[0], 0).is_err());
    }

    #[test]
    fn bin_restore_purge_cycle() {
        let (mut c, store, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        let id = out.created[0];

        assert!(c.purge(id).is_err());
        c.move_to_bin(id).unwrap();
        assert!(store.get(id).unwrap().unwrap().deleted);

        probe.clear();
        c.restore(id).unwrap();
        assert!(probe.events().contains(&Event::Schedule(id, 3)));

        c.move_to_bin(id).unwrap();
        c.empty_bin().unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn missing_ids_are_noops() {
        let (mut c, _, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let ghost = OccurrenceId::new();
        assert!(c.complete(ghost).unwrap().is_noop());
        assert!(c.delete_occurrence(ghost).unwrap().is_noop());
        assert!(c.delete_series(SeriesId::new()).unwrap().is_noop());
        assert!(c
            .edit_single(ghost, &ReminderDraft::new("x", at(2024, 1, 1, 0, 0)))
            .unwrap()
            .applied()
            .unwrap()
            .is_noop());
        assert!(probe.events().is_empty());
    }

    #[test]
    fn failed_commit_restores_prior_deliveries() {
        let (mut c, store, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        let id = out.created[0];
        probe.clear();

        store.fail_next_save();
        assert!(c.delete_occurrence(id).is_err());
        // nothing delivered is settled when the commit is refused
        assert_eq!(probe.events(), vec![Event::Cancel(id, 1), Event::Schedule(id, 1)]);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn unreachable_store_aborts_without_side_effects() {
        let (mut c, store, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        probe.clear();
        store.set_unreachable(true);
        assert!(c.complete(out.created[0]).is_err());
        assert!(probe.events().is_empty());
    }

    #[test]
    fn handle_action_routes_complete_and_snooze() {
        let (mut c, store, _, _) = setup(at(2024, 1, 2, 9, 0));
        let out = c
            .create_series(&ReminderDraft::new("Call", at(2024, 1, 2, 9, 0)))
            .unwrap();
        let id = out.created[0];
        c.handle_action(NotificationId::follow_up(id, 2), NotificationAction::Snooze { minutes: 5 })
            .unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().due, at(2024, 1, 2, 9, 5));
        c.handle_action(NotificationId::primary(id), NotificationAction::Complete)
            .unwrap();
        assert!(store.get(id).unwrap().unwrap().completed);
    }

    #[test]
    fn resync_schedules_live_only() {
        let (mut c, _, probe, _) = setup(at(2024, 1, 1, 0, 0));
        let draft = ReminderDraft::new("Run", at(2024, 4, 1, 6, 0)).with_rule(RecurrenceRule::daily(1), 2);
        let out = c.create_series(&draft).unwrap();
        c.complete(out.created[0]).unwrap();
        c.move_to_bin(out.created[1]).unwrap();
        probe.clear();
        assert_eq!(c.resync().unwrap(), 1);
        assert_eq!(probe.events(), vec![Event::Schedule(out.created[2], 3)]);
    }

    proptest! {
        #[test]
        fn resize_keeps_earliest_members(original in 0u32..12, desired in 0u32..12, interval in 1u32..4) {
            let (mut c, store, _, _) = setup(at(2024, 1, 1, 0, 0));
            let rule = RecurrenceRule::daily(interval);
            let draft = ReminderDraft::new("Tick", at(2024, 2, 1, 8, 0)).with_rule(rule, original);
            let out = c.create_series(&draft).unwrap();
            let before = dues(&store);

            c.edit_series(out.series_id.unwrap(), &draft.clone().with_rule(rule, desired)).unwrap();
            let after = dues(&store);
            prop_assert_eq!(after.len(), desired as usize + 1);
            let shared = after.len().min(before.len());
            prop_assert_eq!(&after[..shared], &before[..shared]);
            for pair in after.windows(2) {
                prop_assert_eq!(pair[1], nth(pair[0], rule, 1));
            }
        }
    }
}
