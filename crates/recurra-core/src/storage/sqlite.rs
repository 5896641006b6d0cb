//! SQLite-backed occurrence store.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};

use super::database::{format_ts, parse_ts, Database};
use super::{Change, OccurrenceFilter, OccurrenceStore};
use crate::error::PersistenceError;
use crate::reminder::{FollowUp, Frequency, Occurrence, OccurrenceId, RecurrenceRule, SeriesId};

const COLUMNS: &str = "id, title, due_at, completed, deleted, series_id, frequency, interval, \
                       followup_interval, followup_count, completed_at, created_at";

/// Decode one `occurrences` row.
fn row_to_occurrence(row: &Row) -> Result<Occurrence, PersistenceError> {
    let id_raw: String = row.get(0)?;
    let corrupt = |message: String| PersistenceError::Corrupt {
        id: id_raw.clone(),
        message,
    };

    let id: OccurrenceId = id_raw.parse().map_err(|e| corrupt(format!("{e}")))?;
    let due_raw: String = row.get(2)?;
    let due = parse_ts(&due_raw).map_err(|e| corrupt(format!("due_at: {e}")))?;
    let series_id = match row.get::<_, Option<String>>(5)? {
        Some(raw) => Some(raw.parse::<SeriesId>().map_err(|e| corrupt(format!("{e}")))?),
        None => None,
    };
    let frequency_raw: String = row.get(6)?;
    let frequency: Frequency = frequency_raw
        .parse()
        .map_err(|e| corrupt(format!("{e}")))?;
    let completed_at = match row.get::<_, Option<String>>(10)? {
        Some(raw) => Some(parse_ts(&raw).map_err(|e| corrupt(format!("completed_at: {e}")))?),
        None => None,
    };
    let created_raw: String = row.get(11)?;
    let created_at = parse_ts(&created_raw).map_err(|e| corrupt(format!("created_at: {e}")))?;

    Ok(Occurrence {
        id,
        title: row.get(1)?,
        due,
        completed: row.get(3)?,
        deleted: row.get(4)?,
        series_id,
        rule: RecurrenceRule::new(frequency, row.get(7)?),
        follow_up: FollowUp::new(row.get(8)?, row.get(9)?),
        completed_at,
        created_at,
    })
}

/// Translate a filter into a WHERE clause and its bound values.
fn where_clause(filter: &OccurrenceFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(id) = filter.id {
        clauses.push("id = ?");
        values.push(Value::Text(id.to_string()));
    }
    if let Some(series_id) = filter.series_id {
        clauses.push("series_id = ?");
        values.push(Value::Text(series_id.to_string()));
    }
    if let Some(deleted) = filter.deleted {
        clauses.push("deleted = ?");
        values.push(Value::Integer(i64::from(deleted)));
    }
    if let Some(completed) = filter.completed {
        clauses.push("completed = ?");
        values.push(Value::Integer(i64::from(completed)));
    }
    if let Some(from) = filter.due_from {
        clauses.push("due_at >= ?");
        values.push(Value::Text(format_ts(from)));
    }
    if let Some(before) = filter.due_before {
        clauses.push("due_at < ?");
        values.push(Value::Text(format_ts(before)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Occurrence store over the `occurrences` table.
pub struct SqliteStore {
    db: Database,
    staged: Vec<Change>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            staged: Vec::new(),
        }
    }

    /// Open the default on-disk database.
    pub fn open() -> Result<Self, PersistenceError> {
        Ok(Self::new(Database::open()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl OccurrenceStore for SqliteStore {
    fn fetch(&self, filter: &OccurrenceFilter) -> Result<Vec<Occurrence>, PersistenceError> {
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT {COLUMNS} FROM occurrences {clause} ORDER BY due_at, id");
        let mut stmt = self.db.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;

        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            found.push(row_to_occurrence(row)?);
        }
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
        if staged.is_empty() {
            return Ok(());
        }

        let commit_failed = |e: rusqlite::Error| PersistenceError::CommitFailed(e.to_string());
        let tx = self.db.conn_mut().transaction().map_err(commit_failed)?;
        for change in &staged {
            match change {
                Change::Insert(o) | Change::Update(o) => {
                    tx.execute(
                        &format!(
                            "INSERT OR REPLACE INTO occurrences ({COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                        ),
                        params![
                            o.id.to_string(),
                            o.title,
                            format_ts(o.due),
                            o.completed,
                            o.deleted,
                            o.series_id.map(|s| s.to_string()),
                            o.rule.frequency.as_str(),
                            o.rule.step(),
                            o.follow_up.interval_minutes,
                            o.follow_up.repeat_count,
                            o.completed_at.map(format_ts),
                            format_ts(o.created_at),
                        ],
                    )
                    .map_err(commit_failed)?;
                }
                Change::Delete(id) => {
                    tx.execute("DELETE FROM occurrences WHERE id = ?1", params![id.to_string()])
                        .map_err(commit_failed)?;
                }
            }
        }
        tx.commit().map_err(commit_failed)?;
        tracing::debug!(changes = staged.len(), "committed occurrence changes");
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
    }
}
