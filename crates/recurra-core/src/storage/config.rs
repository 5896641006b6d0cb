//! TOML-based application configuration.
//!
//! Stores scheduling preferences:
//! - Notification delivery (grace window, snooze length)
//! - In-app trigger catch-up window
//! - Default follow-up fan-out and series length
//!
//! Configuration is stored at `~/.config/recurra/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::reminder::FollowUp;

/// OS notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How long after the due time a missed primary is still sent immediately.
    #[serde(default = "default_grace_window_secs")]
    pub grace_window_secs: u64,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,
}

/// In-app trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overdue occurrences newer than this are re-presented on resume.
    #[serde(default = "default_catch_up_window_minutes")]
    pub catch_up_window_minutes: u32,
}

/// Follow-up defaults applied when a draft doesn't set its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUpConfig {
    #[serde(default)]
    pub interval_minutes: u32,
    #[serde(default)]
    pub repeat_count: u32,
}

/// Series defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Additional occurrences materialized when a count isn't given.
    #[serde(default = "default_series_count")]
    pub default_count: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/recurra/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
    #[serde(default)]
    pub follow_up: FollowUpConfig,
    #[serde(default)]
    pub series: SeriesConfig,
}

/// Upper bound for configurable windows (one year).
const MAX_WINDOW_SECS: i64 = 365 * 24 * 3600;

fn default_true() -> bool {
    true
}
fn default_grace_window_secs() -> u64 {
    60
}
fn default_snooze_minutes() -> u32 {
    10
}
fn default_catch_up_window_minutes() -> u32 {
    10
}
fn default_series_count() -> u32 {
    10
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_window_secs: default_grace_window_secs(),
            snooze_minutes: default_snooze_minutes(),
        }
    }
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            catch_up_window_minutes: default_catch_up_window_minutes(),
        }
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            default_count: default_series_count(),
        }
    }
}

impl FollowUpConfig {
    pub fn as_follow_up(&self) -> FollowUp {
        FollowUp::new(self.interval_minutes, self.repeat_count)
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(format!("cannot parse '{value}' as bool: {e}")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|e| invalid(format!("cannot parse '{value}' as number: {e}")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot overwrite a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults if it doesn't exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
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

    /// Set a config value by key without persisting.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("using default configuration: {e}");
            Self::default()
        })
    }

    pub fn grace_window(&self) -> chrono::Duration {
        let secs = i64::try_from(self.notifications.grace_window_secs).unwrap_or(i64::MAX);
        chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS))
    }

    pub fn catch_up_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.triggers.catch_up_window_minutes))
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
        assert_eq!(parsed.notifications.grace_window_secs, 60);
        assert_eq!(parsed.triggers.catch_up_window_minutes, 10);
        assert_eq!(parsed.notifications.snooze_minutes, 10);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("[notifications]\nsnooze_minutes = 5\n").unwrap();
        assert_eq!(parsed.notifications.snooze_minutes, 5);
        assert_eq!(parsed.notifications.grace_window_secs, 60);
        assert!(parsed.triggers.enabled);
        assert_eq!(parsed.series.default_count, 10);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert_eq!(cfg.get("triggers.catch_up_window_minutes").as_deref(), Some("10"));
        assert!(cfg.get("notifications.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("notifications.grace_window_secs", "90").unwrap();
        cfg.set("triggers.enabled", "false").unwrap();
        assert_eq!(cfg.notifications.grace_window_secs, 90);
        assert!(!cfg.triggers.enabled);
        assert_eq!(cfg.grace_window(), chrono::Duration::seconds(90));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_types() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("notifications.volume", "3"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("notifications.enabled", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("notifications", "1").is_err());
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.follow_up.repeat_count, 0);

        let mut changed = cfg.clone();
        changed.set("follow_up.repeat_count", "3").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().follow_up.repeat_count, 3);
    }
}
