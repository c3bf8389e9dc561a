//! TOML-based application configuration.
//!
//! Stores:
//! - Check-in and escalation windows, cadence and polling intervals
//! - Escalation message rotation and the final message
//! - Relay and account service endpoints
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::notifier::MessageCycle;
use crate::switch::SwitchSettings;

/// Longest accepted monitoring or escalation window: one year.
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
/// Longest accepted cadence, tick, poll or reminder interval: one day.
const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Timer configuration. Read once per session; not changed mid-cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    #[serde(default = "default_monitoring_window")]
    pub monitoring_window_secs: u64,
    #[serde(default = "default_escalation_window")]
    pub escalation_window_secs: u64,
    #[serde(default = "default_1000")]
    pub cadence_interval_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub reachability_poll_ms: u64,
    #[serde(default = "default_1000")]
    pub tick_interval_ms: u64,
    /// Check-in prompt while monitoring; 0 turns it off.
    #[serde(default = "default_1000")]
    pub reminder_interval_ms: u64,
}

/// Escalation texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Sent in rotation while escalating.
    #[serde(default = "default_message_cycle")]
    pub cycle: Vec<String>,
    /// Sent once to every contact when the escalation window elapses.
    #[serde(default = "default_final_message")]
    pub final_message: String,
}

/// Message relay (delivery and reachability listing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Account service (incident recording).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Also report incidents to the account service, not only the local log.
    #[serde(default = "default_true")]
    pub report_incidents: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub account: AccountConfig,
}

// Default functions
fn default_monitoring_window() -> u64 {
    5
}
fn default_escalation_window() -> u64 {
    20
}
fn default_1000() -> u64 {
    1000
}
fn default_poll_ms() -> u64 {
    3000
}
fn default_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_relay_url() -> String {
    "http://127.0.0.1:5000".into()
}
fn default_account_url() -> String {
    "http://127.0.0.1:3000".into()
}

pub fn default_message_cycle() -> Vec<String> {
    vec![
        "I missed my check-in. Please call me.".into(),
        "Still no check-in from me. Please reach out now.".into(),
        "I may need help. Please check on me.".into(),
        "This is an automatic alert: I have not responded.".into(),
    ]
}

pub fn default_final_message() -> String {
    "No response after repeated alerts. Please check on me in person or contact emergency services."
        .into()
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            monitoring_window_secs: default_monitoring_window(),
            escalation_window_secs: default_escalation_window(),
            cadence_interval_ms: 1000,
            reachability_poll_ms: default_poll_ms(),
            tick_interval_ms: 1000,
            reminder_interval_ms: 1000,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            cycle: default_message_cycle(),
            final_message: default_final_message(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_url(),
            timeout_secs: 10,
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            base_url: default_account_url(),
            timeout_secs: 10,
            report_incidents: true,
        }
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
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|e| invalid(e.to_string()))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
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

    /// Load from disk, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
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

    /// Set a config value by key, validate, and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// the result fails validation, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.switch_settings()?;
        *self = updated;
        self.save()
    }

    /// Durations and texts for a new machine.
    ///
    /// # Errors
    ///
    /// Rejects zero or out-of-range windows and intervals and an empty
    /// message cycle.
    pub fn switch_settings(&self) -> Result<SwitchSettings, ConfigError> {
        let t = &self.timers;
        let monitoring_window = seconds("timers.monitoring_window_secs", t.monitoring_window_secs)?;
        let escalation_window = seconds("timers.escalation_window_secs", t.escalation_window_secs)?;
        let cadence_interval = millis("timers.cadence_interval_ms", t.cadence_interval_ms)?;
        let tick_interval = millis("timers.tick_interval_ms", t.tick_interval_ms)?;
        self.reachability_poll_interval()?;
        let reminder_interval = match t.reminder_interval_ms {
            0 => None,
            ms => Some(millis("timers.reminder_interval_ms", ms)?),
        };
        let messages = MessageCycle::new(self.messages.cycle.clone(), &self.messages.final_message)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "messages.cycle".into(),
                message: "at least one message is required".into(),
            })?;

        Ok(SwitchSettings {
            monitoring_window,
            escalation_window,
            cadence_interval,
            tick_interval,
            reminder_interval,
            messages,
        })
    }

    pub fn reachability_poll_interval(&self) -> Result<Duration, ConfigError> {
        millis("timers.reachability_poll_ms", self.timers.reachability_poll_ms)
    }
}

fn seconds(key: &str, value: u64) -> Result<Duration, ConfigError> {
    bounded(key, value, MAX_WINDOW_SECS).and_then(|v| {
        Duration::try_seconds(v).ok_or_else(|| out_of_range(key, MAX_WINDOW_SECS))
    })
}

fn millis(key: &str, value: u64) -> Result<Duration, ConfigError> {
    bounded(key, value, MAX_INTERVAL_MS).and_then(|v| {
        Duration::try_milliseconds(v).ok_or_else(|| out_of_range(key, MAX_INTERVAL_MS))
    })
}

fn bounded(key: &str, value: u64, max: u64) -> Result<i64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        });
    }
    if value > max {
        return Err(out_of_range(key, max));
    }
    i64::try_from(value).map_err(|_| out_of_range(key, max))
}

fn out_of_range(key: &str, max: u64) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: format!("must be at most {max}"),
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
        assert_eq!(parsed.timers.monitoring_window_secs, 5);
        assert_eq!(parsed.timers.escalation_window_secs, 20);
        assert_eq!(parsed.messages.cycle.len(), 4);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[timers]\nmonitoring_window_secs = 60\n").unwrap();
        assert_eq!(parsed.timers.monitoring_window_secs, 60);
        assert_eq!(parsed.timers.escalation_window_secs, 20);
        assert_eq!(parsed.relay.timeout_secs, 10);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timers.monitoring_window_secs").as_deref(), Some("5"));
        assert_eq!(cfg.get("account.report_incidents").as_deref(), Some("true"));
        assert!(cfg.get("timers.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "timers.escalation_window_secs", "45").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "timers.escalation_window_secs").unwrap(),
            &serde_json::Value::Number(45.into())
        );
    }

    #[test]
    fn set_json_value_by_path_updates_list() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "messages.cycle", r#"["a","b"]"#).unwrap();
        let cycle = Config::get_json_value_by_path(&json, "messages.cycle").unwrap();
        assert_eq!(cycle.as_array().unwrap().len(), 2);
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "relay.nonexistent", "x");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_type() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "timers.tick_interval_ms", "soon");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn switch_settings_converts_units() {
        let settings = Config::default().switch_settings().unwrap();
        assert_eq!(settings.monitoring_window, Duration::seconds(5));
        assert_eq!(settings.cadence_interval, Duration::milliseconds(1000));
        assert_eq!(settings.messages.len(), 4);
    }

    #[test]
    fn switch_settings_rejects_huge_values() {
        let mut cfg = Config::default();
        cfg.timers.monitoring_window_secs = u64::MAX;
        assert!(matches!(
            cfg.switch_settings(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "timers.monitoring_window_secs"
        ));

        let mut cfg = Config::default();
        cfg.timers.monitoring_window_secs = 9_223_372_036_854_775;
        assert!(cfg.switch_settings().is_err());

        let mut cfg = Config::default();
        cfg.timers.cadence_interval_ms = i64::MAX as u64;
        assert!(cfg.switch_settings().is_err());

        let mut cfg = Config::default();
        cfg.timers.escalation_window_secs = MAX_WINDOW_SECS;
        assert!(cfg.switch_settings().is_ok());
    }

    #[test]
    fn reminder_zero_disables_it() {
        let mut cfg = Config::default();
        assert_eq!(
            cfg.switch_settings().unwrap().reminder_interval,
            Some(Duration::seconds(1))
        );
        cfg.timers.reminder_interval_ms = 0;
        assert!(cfg.switch_settings().unwrap().reminder_interval.is_none());
    }

    #[test]
    fn switch_settings_rejects_zero_window_and_empty_cycle() {
        let mut cfg = Config::default();
        cfg.timers.escalation_window_secs = 0;
        assert!(cfg.switch_settings().is_err());

        let mut cfg = Config::default();
        cfg.messages.cycle.clear();
        assert!(cfg.switch_settings().is_err());
    }
}
