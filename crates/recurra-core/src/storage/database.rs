//! SQLite connection handling.
//!
//! Owns the connection, runs migrations on open and provides the key-value
//! table used for small pieces of application state (e.g. the trigger
//! engine's last-shown map).

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use super::data_dir;
use super::migrations;
use crate::error::PersistenceError;

/// Fixed-width UTC format, so lexicographic order equals time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).map(|naive| naive.and_utc())
}

/// SQLite database shared by the occurrence store and the notification outbox.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/recurra/recurra.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        Self::open_at(dir.join("recurra.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        migrations::migrate(&conn)
            .map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub(crate) fn into_connection(self) -> Connection {
        self.conn
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}
