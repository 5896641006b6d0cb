//! Database schema migrations for recurra.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: occurrence records and the kv table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS occurrences (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            due_at              TEXT NOT NULL,
            completed           INTEGER NOT NULL DEFAULT 0,
            deleted             INTEGER NOT NULL DEFAULT 0,
            series_id           TEXT,
            frequency           TEXT NOT NULL DEFAULT 'none',
            interval            INTEGER NOT NULL DEFAULT 1,
            followup_interval   INTEGER NOT NULL DEFAULT 0,
            followup_count      INTEGER NOT NULL DEFAULT 0,
            completed_at        TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_occurrences_due_at ON occurrences(due_at);
        CREATE INDEX IF NOT EXISTS idx_occurrences_series ON occurrences(series_id, due_at);",
    )?;
    set_schema_version(conn, 1)
}

/// v2: notification outbox (pending and delivered requests).
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notifications (
            id              TEXT PRIMARY KEY,
            occurrence_id   TEXT NOT NULL,
            sequence        INTEGER NOT NULL DEFAULT 0,
            title           TEXT NOT NULL,
            fire_at         TEXT,
            snooze_minutes  INTEGER NOT NULL DEFAULT 10,
            delivered       INTEGER NOT NULL DEFAULT 0,
            scheduled_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_fire_at ON notifications(delivered, fire_at);",
    )?;
    set_schema_version(conn, 2)
}
