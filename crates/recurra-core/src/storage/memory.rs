//! In-process occurrence store.
//!
//! Clones share committed records, so a test can keep a handle while the
//! coordinator owns another. Failure switches simulate an unreachable store
//! and a refused commit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{sort_by_due, Change, OccurrenceFilter, OccurrenceStore};
use crate::error::PersistenceError;
use crate::reminder::{Occurrence, OccurrenceId};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<OccurrenceId, Occurrence>,
    unreachable: bool,
    fail_next_save: bool,
    saves: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    staged: Vec<Change>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store vanished.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Refuse the next commit.
    pub fn fail_next_save(&self) {
        self.lock().fail_next_save = true;
    }

    /// Number of successful commits.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// All committed records ordered by due time.
    pub fn snapshot(&self) -> Vec<Occurrence> {
        let mut all: Vec<Occurrence> = self.lock().records.values().cloned().collect();
        sort_by_due(&mut all);
        all
    }

    pub fn staged(&self) -> &[Change] {
        &self.staged
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OccurrenceStore for MemoryStore {
    fn fetch(&self, filter: &OccurrenceFilter) -> Result<Vec<Occurrence>, PersistenceError> {
        let state = self.lock();
        if state.unreachable {
            return Err(PersistenceError::Unavailable("memory store offline".into()));
        }
        let mut found: Vec<Occurrence> = state
            .records
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        sort_by_due(&mut found);
        Ok(found)
    }

    fn insert(&mut self, occurrence: Occurrence) {
        self.staged.push(Change::Insert(occurrence));
    }

    fn update(&mut self, occurrence: Occurrence) {
        self.staged.push(Change::Update(occurrence));
    }

    fn delete(&mut self, id: OccurrenceId) {
        self.staged.push(Change::Delete(id));
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.unreachable {
            return Err(PersistenceError::Unavailable("memory store offline".into()));
        }
        if state.fail_next_save {
            state.fail_next_save = false;
            return Err(PersistenceError::CommitFailed("injected commit failure".into()));
        }
        for change in staged {
            match change {
                Change::Insert(o) | Change::Update(o) => {
                    state.records.insert(o.id, o);
                }
                Change::Delete(id) => {
                    state.records.remove(&id);
                }
            }
        }
        state.saves += 1;
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn occ(title: &str, day: u32) -> Occurrence {
        let due = Utc.with_ymd_and_hms(2024, 4, day, 9, 0, 0).unwrap();
        Occurrence::new(title, due, due)
    }

    #[test]
    fn staged_writes_are_invisible_until_save() {
        let mut store = MemoryStore::new();
        store.insert(occ("a", 1));
        assert!(store.fetch(&OccurrenceFilter::all()).unwrap().is_empty());
        store.save().unwrap();
        assert_eq!(store.fetch(&OccurrenceFilter::all()).unwrap().len(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn failed_save_drops_staged_changes() {
        let mut store = MemoryStore::new();
        store.fail_next_save();
        store.insert(occ("a", 1));
        assert!(matches!(store.save(), Err(PersistenceError::CommitFailed(_))));
        assert!(store.staged().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn clones_share_committed_records() {
        let mut store = MemoryStore::new();
        let observer = store.clone();
        let b = occ("b", 3);
        let a = occ("a", 2);
        store.insert(b.clone());
        store.insert(a.clone());
        store.save().unwrap();
        let seen = observer.snapshot();
        assert_eq!(seen[0].id, a.id);
        assert_eq!(seen[1].id, b.id);
    }

    #[test]
    fn unreachable_store_fails_fetch() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        assert!(matches!(
            store.fetch(&OccurrenceFilter::all()),
            Err(PersistenceError::Unavailable(_))
        ));
    }
}
