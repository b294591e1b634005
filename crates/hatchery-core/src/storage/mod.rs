mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, RemoteConfig, TimerConfig};
pub use database::{Database, PendingSession};

use std::path::PathBuf;

use crate::error::DatabaseError;

/// Minimal durable key-value interface the unlock ledger writes through.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, DatabaseError>;
    fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}

/// Returns `~/.config/hatchery[-dev]/` based on HATCHERY_ENV.
///
/// Set HATCHERY_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HATCHERY_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("hatchery-dev")
    } else {
        base_dir.join("hatchery")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
