//! SQLite-backed durable storage.
//!
//! Provides persistent storage for:
//! - Key-value application state (the unlock ledger lives here)
//! - Completed sessions awaiting backend acknowledgement

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations, KeyValueStore};
use crate::error::DatabaseError;

/// A completed session that the backend has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSession {
    /// Client-generated key; the backend deduplicates on it.
    pub idempotency_key: String,
    pub item_id: u32,
    pub duration_minutes: u32,
    pub task_id: Option<i64>,
    /// Reward computed locally at completion time.
    pub local_reward: u32,
    pub completed_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// SQLite database shared by the ledger and the outbox.
///
/// The connection sits behind a mutex so one instance can be handed to
/// several services as `Arc<Database>`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/hatchery/hatchery.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::DataDir(e.to_string()))?;
        Self::open_at(dir.join("hatchery.db"))
    }

    /// Open (or create) a database file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and previews).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Insert a pending session. Re-inserting the same key is a no-op.
    pub fn insert_pending(&self, pending: &PendingSession) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO pending_sessions
                (idempotency_key, item_id, duration_minutes, task_id, local_reward,
                 completed_at, attempts, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                pending.idempotency_key,
                pending.item_id,
                pending.duration_minutes,
                pending.task_id,
                pending.local_reward,
                pending.completed_at.to_rfc3339(),
                pending.attempts,
                pending.last_error,
            ],
        )?;
        Ok(())
    }

    /// All pending sessions, oldest first.
    pub fn list_pending(&self) -> Result<Vec<PendingSession>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT idempotency_key, item_id, duration_minutes, task_id, local_reward,
                    completed_at, attempts, last_error
             FROM pending_sessions
             ORDER BY completed_at ASC, item_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let completed_at: String = row.get(5)?;
            let completed_at = DateTime::parse_from_rfc3339(&completed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(PendingSession {
                idempotency_key: row.get(0)?,
                item_id: row.get(1)?,
                duration_minutes: row.get(2)?,
                task_id: row.get(3)?,
                local_reward: row.get(4)?,
                completed_at,
                attempts: row.get(6)?,
                last_error: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Remove an acknowledged session. Returns whether a row was deleted.
    pub fn delete_pending(&self, idempotency_key: &str) -> Result<bool, DatabaseError> {
        let changed = self.conn()?.execute(
            "DELETE FROM pending_sessions WHERE idempotency_key = ?1",
            params![idempotency_key],
        )?;
        Ok(changed > 0)
    }

    /// Record a failed delivery attempt.
    pub fn record_attempt(&self, idempotency_key: &str, error: &str) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "UPDATE pending_sessions
             SET attempts = attempts + 1, last_error = ?2
             WHERE idempotency_key = ?1",
            params![idempotency_key, error],
        )?;
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        self.kv_get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.kv_set(key, value)
    }
}
