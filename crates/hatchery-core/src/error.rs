//! Core error types for hatchery-core.
//!
//! Nothing in this crate is fatal to the host process: every error here
//! describes either a rejected operation (no state change) or a warning the
//! presentation layer should surface while local state stands.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for hatchery-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A requested transition or selection was rejected.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The unlock sequence has no next item.
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    /// Durable storage failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote recording failed. Local state is unaffected.
    #[error("Remote error: {0}")]
    Remote(#[from] RecorderError),
}

/// Rejected selections and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Only the next unclaimed item may be selected or claimed.
    #[error("Item {requested} is out of order: next available is {expected}")]
    OutOfOrder { requested: u32, expected: u32 },

    /// Selection cannot change while a session is running or paused.
    #[error("A session is already active")]
    SessionActive,

    /// `start()` needs both a duration and an item.
    #[error("Cannot start: {missing} not selected")]
    IncompleteSelection { missing: &'static str },

    /// Duration outside the configured bounds.
    #[error("Invalid duration {minutes} min: must be between {min} and {max}")]
    InvalidDuration { minutes: u32, min: u32, max: u32 },

    /// Forfeit/pause/resume with nothing running.
    #[error("No active session")]
    NoActiveSession,

    /// The operation is not valid in the current status.
    #[error("Cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },
}

/// The whole collectible sequence has been claimed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Nothing left to unlock: all {total} items are claimed")]
pub struct ExhaustedError {
    pub total: u32,
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Could not resolve the data directory.
    #[error("Data directory unavailable: {0}")]
    DataDir(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Database connection poisoned")]
    Poisoned,

    /// A stored value could not be read, so it must not be overwritten yet.
    #[error("'{0}' has not been read from storage; refusing to overwrite it")]
    Unread(&'static str),
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

    /// Unknown dotted key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Errors from the remote session recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Transport-level failure (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// No auth token available from the auth collaborator.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Base URL could not be joined with the endpoint path.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Persistence(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_message_names_both_ids() {
        let err = ValidationError::OutOfOrder {
            requested: 5,
            expected: 3,
        };
        assert_eq!(
            err.to_string(),
            "Item 5 is out of order: next available is 3"
        );
    }

    #[test]
    fn validation_converts_into_core_error() {
        let err: CoreError = ValidationError::SessionActive.into();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::SessionActive)
        ));
    }

    #[test]
    fn exhausted_is_transparent() {
        let err: CoreError = ExhaustedError { total: 12 }.into();
        assert_eq!(
            err.to_string(),
            "Nothing left to unlock: all 12 items are claimed"
        );
    }

    #[test]
    fn rusqlite_error_maps_to_query_failed() {
        let err: DatabaseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }

    #[test]
    fn unread_storage_surfaces_as_persistence() {
        let err: CoreError = DatabaseError::Unread("unlocked_sequence").into();
        assert!(matches!(err, CoreError::Persistence(DatabaseError::Unread(_))));
        assert_eq!(
            err.to_string(),
            "Persistence error: 'unlocked_sequence' has not been read from storage; refusing to overwrite it"
        );
    }
}
