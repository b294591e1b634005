//! TOML-based application configuration.
//!
//! Stores:
//! - Timer bounds and the length of one reward minute
//! - Remote recorder endpoint settings
//!
//! Configuration is stored at `~/.config/hatchery/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Countdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Wall-clock seconds in one reward minute.
    #[serde(default = "default_seconds_per_minute")]
    pub seconds_per_minute: u32,
    #[serde(default = "default_min_minutes")]
    pub min_minutes: u32,
    #[serde(default = "default_max_minutes")]
    pub max_minutes: u32,
    /// Period of the tick driver.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Remote recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/hatchery/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_seconds_per_minute() -> u32 {
    60
}
fn default_min_minutes() -> u32 {
    5
}
fn default_max_minutes() -> u32 {
    120
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_base_url() -> String {
    "http://localhost:8000/api/".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            seconds_per_minute: default_seconds_per_minute(),
            min_minutes: default_min_minutes(),
            max_minutes: default_max_minutes(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TimerConfig {
    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seconds_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.seconds_per_minute".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.min_minutes == 0 || self.min_minutes > self.max_minutes {
            return Err(ConfigError::InvalidValue {
                key: "timer.min_minutes".into(),
                message: format!(
                    "must be between 1 and max_minutes ({})",
                    self.max_minutes
                ),
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.tick_interval_ms".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) => {
                        return Err(ConfigError::UnknownKey(key.to_string()))
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::path()?)
    }

    /// Load from an explicit path, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the defaults cannot
    /// be written.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.timer.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Call [`Config::save`] to persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// into the field's type or violates the timer bounds.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.timer.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.timer.seconds_per_minute, 60);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let parsed: Config = toml::from_str("[timer]\nseconds_per_minute = 1\n").unwrap();
        assert_eq!(parsed.timer.seconds_per_minute, 1);
        assert_eq!(parsed.timer.min_minutes, 5);
        assert_eq!(parsed.timer.max_minutes, 120);
        assert_eq!(parsed.remote, RemoteConfig::default());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.max_minutes").as_deref(), Some("120"));
        assert_eq!(
            cfg.get("remote.base_url").as_deref(),
            Some("http://localhost:8000/api/")
        );
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn set_updates_number_and_string() {
        let mut cfg = Config::default();
        cfg.set("timer.seconds_per_minute", "1").unwrap();
        cfg.set("remote.base_url", "https://api.example.com/").unwrap();
        assert_eq!(cfg.timer.seconds_per_minute, 1);
        assert_eq!(cfg.remote.base_url, "https://api.example.com/");
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("timer.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("timer.max_minutes", "lots"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("timer.seconds_per_minute", "0").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("timer.min_minutes", "10").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().timer.min_minutes, 10);
    }

    #[test]
    fn load_from_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timer = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
