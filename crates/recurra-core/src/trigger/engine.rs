//! In-app trigger state machine.
//!
//! Pure state with an explicit `now`; the [`super::service`] actor drives it.
//!
//! ## Timer states
//!
//! ```text
//! Unscheduled -> Armed -> Fired
//!                   \---> Cancelled
//! ```
//!
//! All timers share one min-heap of `(fire_at, generation, id)`. Re-arming or
//! cancelling bumps the timer's generation, which turns any older heap entry
//! for the same occurrence into a no-op when it is popped.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Settlement;
use crate::reminder::{Occurrence, OccurrenceId};
use crate::storage::Config;
use crate::time::overdue_by;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Unscheduled,
    Armed,
    Fired,
    Cancelled,
}

#[derive(Debug, Clone)]
struct Timer {
    occurrence: Occurrence,
    generation: u64,
    state: TimerState,
}

/// Serializable view of the last-shown map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShownEntry {
    pub occurrence_id: OccurrenceId,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TriggerEngine {
    timers: HashMap<OccurrenceId, Timer>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, OccurrenceId)>>,
    next_generation: u64,
    last_shown: HashMap<OccurrenceId, DateTime<Utc>>,
    /// Presented and waiting for complete / snooze / dismiss.
    active: BTreeSet<OccurrenceId>,
    catch_up_window: Duration,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new(Duration::minutes(10))
    }
}

impl TriggerEngine {
    pub fn new(catch_up_window: Duration) -> Self {
        Self {
            timers: HashMap::new(),
            heap: BinaryHeap::new(),
            next_generation: 0,
            last_shown: HashMap::new(),
            active: BTreeSet::new(),
            catch_up_window,
        }
    }

    pub fn with_config(config: &Config) -> Self {
        Self::new(config.catch_up_window())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self, id: OccurrenceId) -> TimerState {
        self.timers
            .get(&id)
            .map(|t| t.state)
            .unwrap_or(TimerState::Unscheduled)
    }

    pub fn armed_count(&self) -> usize {
        self.timers
            .values()
            .filter(|t| t.state == TimerState::Armed)
            .count()
    }

    /// Armed timers ordered by fire time.
    pub fn armed(&self) -> Vec<(OccurrenceId, DateTime<Utc>)> {
        let mut armed: Vec<_> = self
            .timers
            .iter()
            .filter(|(_, t)| t.state == TimerState::Armed)
            .map(|(id, t)| (*id, t.occurrence.due))
            .collect();
        armed.sort_by_key(|(id, at)| (*at, *id));
        armed
    }

    pub fn active(&self) -> Vec<OccurrenceId> {
        self.active.iter().copied().collect()
    }

    pub fn last_shown(&self, id: OccurrenceId) -> Option<DateTime<Utc>> {
        self.last_shown.get(&id).copied()
    }

    /// Earliest live deadline, discarding stale heap entries on the way.
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((at, generation, id))) = self.heap.peek().copied() {
            if self.is_current(id, generation) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    /// Whether presenting `occurrence` at `now` would be a fresh presentation.
    ///
    /// Shown before: only again when the due time moved past the last
    /// presentation and has been reached.
    pub fn should_present(&self, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        if !occurrence.is_live() || occurrence.due > now {
            return false;
        }
        match self.last_shown.get(&occurrence.id) {
            None => true,
            Some(shown_at) => occurrence.due > *shown_at,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm a timer for a future, live occurrence. Anything else cancels.
    pub fn arm(&mut self, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        if !occurrence.is_upcoming(now) {
            self.cancel(occurrence.id);
            return false;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.timers.insert(
            occurrence.id,
            Timer {
                occurrence: occurrence.clone(),
                generation,
                state: TimerState::Armed,
            },
        );
        self.heap
            .push(Reverse((occurrence.due, generation, occurrence.id)));
        tracing::debug!(occurrence = %occurrence.id, due = %occurrence.due, "trigger armed");
        true
    }

    /// Cancel an armed timer. Idempotent.
    pub fn cancel(&mut self, id: OccurrenceId) -> bool {
        match self.timers.get_mut(&id) {
            Some(timer) if timer.state == TimerState::Armed => {
                timer.state = TimerState::Cancelled;
                self.next_generation += 1;
                timer.generation = self.next_generation;
                true
            }
            _ => false,
        }
    }

    /// Fire every timer due by `now`; returns what should be presented.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<Occurrence> {
        let mut presented = Vec::new();
        while let Some(Reverse((at, generation, id))) = self.heap.peek().copied() {
            if at > now {
                break;
            }
            self.heap.pop();
            if !self.is_current(id, generation) {
                continue;
            }
            let occurrence = match self.timers.get_mut(&id) {
                Some(timer) => {
                    timer.state = TimerState::Fired;
                    timer.occurrence.clone()
                }
                None => continue,
            };
            if self.present_if_needed(&occurrence, now) {
                presented.push(occurrence);
            } else {
                tracing::debug!(occurrence = %id, "trigger fired, presentation suppressed");
            }
        }
        presented
    }

    /// Safe-add presentation path: presents at most once per due time.
    pub fn present_if_needed(&mut self, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        if !self.should_present(occurrence, now) {
            return false;
        }
        self.last_shown.insert(occurrence.id, now);
        self.active.insert(occurrence.id);
        true
    }

    /// Cold-start / resume sweep.
    ///
    /// Re-arms every upcoming occurrence and returns the ones overdue by no
    /// more than the catch-up window that should be presented now.
    pub fn resume(&mut self, occurrences: &[Occurrence], now: DateTime<Utc>) -> Vec<Occurrence> {
        let mut caught_up = Vec::new();
        for occurrence in occurrences {
            if occurrence.is_upcoming(now) {
                self.arm(occurrence, now);
            } else if occurrence.is_live()
                && overdue_by(occurrence.due, now) <= self.catch_up_window
                && self.present_if_needed(occurrence, now)
            {
                caught_up.push(occurrence.clone());
            }
        }
        tracing::info!(
            armed = self.armed_count(),
            caught_up = caught_up.len(),
            "trigger resume sweep"
        );
        caught_up
    }

    /// User completed the presented occurrence.
    pub fn completed(&mut self, id: OccurrenceId) {
        self.active.remove(&id);
        self.cancel(id);
    }

    /// User dismissed the presentation without acting on the reminder.
    pub fn dismissed(&mut self, id: OccurrenceId) {
        self.active.remove(&id);
    }

    /// User snoozed; `occurrence` carries the new due time.
    pub fn snoozed(&mut self, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        self.active.remove(&occurrence.id);
        self.arm(occurrence, now)
    }

    /// Drop every trace of an occurrence that no longer exists.
    pub fn forget(&mut self, id: OccurrenceId) {
        self.cancel(id);
        self.timers.remove(&id);
        self.active.remove(&id);
        self.last_shown.remove(&id);
    }

    /// A committed change to an occurrence that may already be on screen.
    pub fn settle(&mut self, id: OccurrenceId, settlement: Settlement) {
        match settlement {
            Settlement::Removed => self.forget(id),
            Settlement::Completed => self.completed(id),
            Settlement::Replaced => self.dismissed(id),
        }
    }

    /// Align with the store contents after changes made elsewhere.
    ///
    /// Occurrences missing from `known` are forgotten. Ones that are no
    /// longer live lose their timer and presentation but keep their
    /// last-shown time. Returns how many were forgotten.
    pub fn reconcile(&mut self, known: &[Occurrence]) -> usize {
        let known: HashMap<OccurrenceId, &Occurrence> = known.iter().map(|o| (o.id, o)).collect();
        let tracked: BTreeSet<OccurrenceId> = self
            .timers
            .keys()
            .chain(self.last_shown.keys())
            .chain(self.active.iter())
            .copied()
            .collect();

        let mut forgotten = 0;
        for id in tracked {
            match known.get(&id) {
                None => {
                    self.forget(id);
                    forgotten += 1;
                }
                Some(occurrence) if !occurrence.is_live() => self.completed(id),
                Some(_) => {}
            }
        }
        if forgotten > 0 {
            tracing::debug!(forgotten, "dropped trigger state for removed occurrences");
        }
        forgotten
    }

    pub fn export_last_shown(&self) -> Vec<ShownEntry> {
        let mut entries: Vec<ShownEntry> = self
            .last_shown
            .iter()
            .map(|(id, at)| ShownEntry {
                occurrence_id: *id,
                shown_at: *at,
            })
            .collect();
        entries.sort_by_key(|e| (e.shown_at, e.occurrence_id));
        entries
    }

    pub fn import_last_shown(&mut self, entries: impl IntoIterator<Item = ShownEntry>) {
        for entry in entries {
            self.last_shown.insert(entry.occurrence_id, entry.shown_at);
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn is_current(&self, id: OccurrenceId, generation: u64) -> bool {
        self.timers
            .get(&id)
            .is_some_and(|t| t.generation == generation && t.state == TimerState::Armed)
    }
}
