mod config;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use config::{Config, FollowUpConfig, NotificationsConfig, SeriesConfig, TriggersConfig};
pub use database::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, PersistenceError};
use crate::reminder::{Occurrence, OccurrenceId, SeriesId};

/// Returns `~/.config/recurra[-dev]/` based on RECURRA_ENV.
///
/// Set RECURRA_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RECURRA_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("recurra-dev")
    } else {
        base_dir.join("recurra")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Query over occurrence records. Unset fields don't constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceFilter {
    pub id: Option<OccurrenceId>,
    pub series_id: Option<SeriesId>,
    pub deleted: Option<bool>,
    pub completed: Option<bool>,
    /// Inclusive lower bound on `due`.
    pub due_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `due`.
    pub due_before: Option<DateTime<Utc>>,
}

impl OccurrenceFilter {
    /// Everything, including the bin.
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything outside the bin.
    pub fn active() -> Self {
        Self {
            deleted: Some(false),
            ..Self::default()
        }
    }

    /// Only the bin.
    pub fn bin() -> Self {
        Self {
            deleted: Some(true),
            ..Self::default()
        }
    }

    pub fn by_id(id: OccurrenceId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Series members outside the bin.
    pub fn series(series_id: SeriesId) -> Self {
        Self {
            series_id: Some(series_id),
            deleted: Some(false),
            ..Self::default()
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due_from(mut self, from: DateTime<Utc>) -> Self {
        self.due_from = Some(from);
        self
    }

    pub fn due_before(mut self, before: DateTime<Utc>) -> Self {
        self.due_before = Some(before);
        self
    }

    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        self.id.map_or(true, |id| occurrence.id == id)
            && self.series_id.map_or(true, |s| occurrence.series_id == Some(s))
            && self.deleted.map_or(true, |d| occurrence.deleted == d)
            && self.completed.map_or(true, |c| occurrence.completed == c)
            && self.due_from.map_or(true, |from| occurrence.due >= from)
            && self.due_before.map_or(true, |before| occurrence.due < before)
    }
}

/// Durable CRUD over occurrence records.
///
/// Writes are staged and only become visible to `fetch` after `save`
/// succeeds. No atomicity across records is assumed by callers.
pub trait OccurrenceStore {
    /// Committed records matching `filter`, ordered by due time.
    fn fetch(&self, filter: &OccurrenceFilter) -> Result<Vec<Occurrence>, PersistenceError>;

    fn get(&self, id: OccurrenceId) -> Result<Option<Occurrence>, PersistenceError> {
        Ok(self.fetch(&OccurrenceFilter::by_id(id))?.into_iter().next())
    }

    fn insert(&mut self, occurrence: Occurrence);

    fn update(&mut self, occurrence: Occurrence);

    fn delete(&mut self, id: OccurrenceId);

    /// Commit staged writes. Staged writes are dropped either way.
    fn save(&mut self) -> Result<(), PersistenceError>;

    /// Drop staged writes without committing.
    fn discard(&mut self);
}

/// One staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert(Occurrence),
    Update(Occurrence),
    Delete(OccurrenceId),
}

pub(crate) fn sort_by_due(records: &mut [Occurrence]) {
    records.sort_by(|a, b| a.due.cmp(&b.due).then_with(|| a.id.cmp(&b.id)));
}
