//! Subcommand implementations and the state they share.

pub mod bin;
pub mod config;
pub mod notify;
pub mod reminder;
pub mod sweep;
pub mod watch;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use recurra_core::trigger::ShownEntry;
use recurra_core::{
    Clock, Config, Database, NotificationDispatcher, OccurrenceId, SeriesCoordinator, SqliteNotificationOutbox,
    SqliteStore, SystemClock, TriggerEngine,
};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// kv key holding the trigger engine's last-shown map.
const LAST_SHOWN_KEY: &str = "trigger.last_shown";

/// Everything a command needs, opened against the data directory.
pub struct App {
    pub config: Config,
    pub coordinator: SeriesCoordinator<SqliteStore>,
    pub outbox: Arc<SqliteNotificationOutbox>,
}

impl App {
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let outbox = Arc::new(SqliteNotificationOutbox::new(Database::open()?, Arc::clone(&clock)));
        let coordinator = SeriesCoordinator::new(SqliteStore::open()?, clock)
            .with_channel(NotificationDispatcher::with_config(Arc::clone(&outbox), &config));
        Ok(Self {
            config,
            coordinator,
            outbox,
        })
    }

    /// Trigger engine with the persisted last-shown map loaded.
    pub fn trigger_engine(&self) -> CliResult<TriggerEngine> {
        let mut engine = TriggerEngine::with_config(&self.config);
        if let Some(raw) = self.coordinator.store().database().kv_get(LAST_SHOWN_KEY)? {
            match serde_json::from_str::<Vec<ShownEntry>>(&raw) {
                Ok(entries) => engine.import_last_shown(entries),
                Err(e) => tracing::warn!("ignoring unreadable last-shown state: {e}"),
            }
        }
        Ok(engine)
    }

    pub fn save_last_shown(&self, entries: &[ShownEntry]) -> CliResult {
        let raw = serde_json::to_string(entries)?;
        self.coordinator.store().database().kv_set(LAST_SHOWN_KEY, &raw)?;
        Ok(())
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_id(raw: &str) -> CliResult<OccurrenceId> {
    Ok(raw.parse()?)
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD HH:MM` (UTC).
pub fn parse_time(raw: &str) -> CliResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("invalid time '{raw}', expected e.g. 2024-05-01T09:00").into())
}

/// Comma-separated `YYYY-MM-DD` list.
pub fn parse_dates(raw: &str) -> CliResult<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let date = NaiveDate::parse_from_str(part, "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{part}': {e}"))?;
        dates.push(date);
    }
    Ok(dates)
}
