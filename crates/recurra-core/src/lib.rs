//! # Recurra Core Library
//!
//! Scheduling engine for recurring reminders. It expands recurrence rules into
//! concrete occurrences, keeps whole series consistent when they are edited or
//! deleted, and delivers each occurrence through two channels: OS notifications
//! and in-app presentation triggers.
//!
//! ## Architecture
//!
//! - **Recurrence**: pure calendar arithmetic from an anchor and a rule
//! - **Series**: the mutation coordinator; cancels deliveries before a commit
//!   and schedules them after it
//! - **Notify**: primary and follow-up notification requests with stable ids
//! - **Trigger**: in-app timers with catch-up and de-duplication, run as a
//!   single tokio task
//! - **Storage**: SQLite occurrence store and TOML configuration
//!
//! ## Key Components
//!
//! - [`SeriesCoordinator`]: every create / edit / delete / complete flow
//! - [`NotificationDispatcher`]: OS notification policy
//! - [`TriggerEngine`] and [`TriggerService`]: in-app presentation
//! - [`SqliteStore`] and [`Config`]: persistence

pub mod channel;
pub mod error;
pub mod notify;
pub mod recurrence;
pub mod reminder;
pub mod series;
pub mod storage;
pub mod time;
pub mod trigger;

pub use channel::{DeliveryChannel, Settlement};
pub use error::{ConfigError, CoreError, DispatchError, PersistenceError, Result, ValidationError};
pub use notify::{
    InMemoryNotificationService, NotificationAction, NotificationDispatcher, NotificationId,
    NotificationService, SqliteNotificationOutbox,
};
pub use reminder::{Frequency, FollowUp, Occurrence, OccurrenceId, RecurrenceRule, ReminderDraft, SeriesId};
pub use series::{EditOutcome, MutationOutcome, SeriesCoordinator};
pub use storage::{Config, Database, MemoryStore, OccurrenceFilter, OccurrenceStore, SqliteStore};
pub use time::{Clock, ManualClock, SystemClock};
pub use trigger::{PresentationSurface, TriggerEngine, TriggerHandle, TriggerService};
