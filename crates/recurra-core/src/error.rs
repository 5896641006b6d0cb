//! Core error types for recurra-core.
//!
//! Persistence failures abort a mutation and reach the caller. Dispatch
//! failures are logged by the dispatcher and never abort a mutation; they only
//! surface from direct gateway calls.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for recurra-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store unreachable or commit refused
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Notification service refused a request
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Referenced record no longer exists
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Occurrence store errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Store could not be reached at all
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Commit of staged changes failed
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be decoded
    #[error("Corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },
}

/// Notification service errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Service refused to schedule a request
    #[error("Notification service rejected '{id}': {reason}")]
    Rejected { id: String, reason: String },

    /// Service is not reachable (permissions revoked, daemon down)
    #[error("Notification service unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Custom recurrence without any date
    #[error("Custom recurrence requires at least one date")]
    EmptyDateSet,

    /// Identifier could not be parsed
    #[error("Malformed identifier '{0}'")]
    MalformedId(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

impl CoreError {
    pub fn not_found(id: impl ToString) -> Self {
        CoreError::NotFound { id: id.to_string() }
    }

    /// Whether the error only means the target vanished under us.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
