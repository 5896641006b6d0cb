//! SQLite-backed notification service.
//!
//! Stands in for the OS notification center when running from the CLI:
//! requests survive between invocations and `deliver_due` plays the part of
//! the OS showing them.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::gateway::{Delivery, NotificationAction, NotificationPayload, NotificationRequest, NotificationService};
use super::ids::NotificationId;
use crate::error::DispatchError;
use crate::storage::database::{format_ts, parse_ts, Database};
use crate::time::Clock;

fn unavailable(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Unavailable(e.to_string())
}

fn row_to_request(row: &Row) -> rusqlite::Result<Result<NotificationRequest, String>> {
    let id_raw: String = row.get(0)?;
    let title: String = row.get(1)?;
    let fire_at: Option<String> = row.get(2)?;
    let snooze_minutes: u32 = row.get(3)?;

    let id: NotificationId = match id_raw.parse() {
        Ok(id) => id,
        Err(e) => return Ok(Err(format!("{id_raw}: {e}"))),
    };
    let delivery = match fire_at {
        Some(raw) => match parse_ts(&raw) {
            Ok(at) => Delivery::At(at),
            Err(e) => return Ok(Err(format!("{id_raw}: fire_at {e}"))),
        },
        None => Delivery::Immediate,
    };
    Ok(Ok(NotificationRequest {
        id,
        delivery,
        payload: NotificationPayload {
            occurrence_id: id.occurrence_id,
            title,
            sequence: id.sequence,
            actions: vec![
                NotificationAction::Complete,
                NotificationAction::Snooze {
                    minutes: snooze_minutes,
                },
            ],
        },
    }))
}

fn snooze_minutes_of(request: &NotificationRequest) -> u32 {
    request
        .payload
        .actions
        .iter()
        .find_map(|a| match a {
            NotificationAction::Snooze { minutes } => Some(*minutes),
            NotificationAction::Complete => None,
        })
        .unwrap_or(10)
}

pub struct SqliteNotificationOutbox {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteNotificationOutbox {
    /// `clock` stamps each request's `scheduled_at`.
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Mutex::new(db.into_connection()),
            clock,
        }
    }

    /// Mark every pending request due by `now` as delivered and return them.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> Result<Vec<NotificationRequest>, DispatchError> {
        let due: Vec<NotificationRequest> = self
            .list(false)?
            .into_iter()
            .filter(|r| r.delivery.is_due(now))
            .collect();
        let conn = self.lock();
        for request in &due {
            conn.execute(
                "UPDATE notifications SET delivered = 1 WHERE id = ?1",
                params![request.id.to_string()],
            )
            .map_err(unavailable)?;
        }
        Ok(due)
    }

    fn list(&self, delivered: bool) -> Result<Vec<NotificationRequest>, DispatchError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, fire_at, snooze_minutes FROM notifications
                 WHERE delivered = ?1 ORDER BY COALESCE(fire_at, ''), id",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![delivered], row_to_request)
            .map_err(unavailable)?;

        let mut out = Vec::new();
        for row in rows {
            match row.map_err(unavailable)? {
                Ok(request) => out.push(request),
                Err(message) => tracing::warn!("skipping malformed notification row: {message}"),
            }
        }
        Ok(out)
    }

    fn remove(&self, ids: &[NotificationId], delivered: bool) -> Result<(), DispatchError> {
        let conn = self.lock();
        for id in ids {
            conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND delivered = ?2",
                params![id.to_string(), delivered],
            )
            .map_err(unavailable)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationService for SqliteNotificationOutbox {
    fn schedule(&self, request: NotificationRequest) -> Result<(), DispatchError> {
        let fire_at = match request.delivery {
            Delivery::At(at) => Some(format_ts(at)),
            Delivery::Immediate => None,
        };
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO notifications
                 (id, occurrence_id, sequence, title, fire_at, snooze_minutes, delivered, scheduled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    request.id.to_string(),
                    request.payload.occurrence_id.to_string(),
                    request.payload.sequence,
                    request.payload.title,
                    fire_at,
                    snooze_minutes_of(&request),
                    format_ts(self.clock.now()),
                ],
            )
            .map_err(|e| DispatchError::Rejected {
                id: request.id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn cancel_pending(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        self.remove(ids, false)
    }

    fn cancel_delivered(&self, ids: &[NotificationId]) -> Result<(), DispatchError> {
        self.remove(ids, true)
    }

    fn list_pending(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        self.list(false)
    }

    fn list_delivered(&self) -> Result<Vec<NotificationRequest>, DispatchError> {
        self.list(true)
    }
}
