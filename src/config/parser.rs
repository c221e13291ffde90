use super::ConfigError;
use super::validator::{parse_admin_channels, parse_duration};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_PERSISTENCE_FILE: &str = "subscriptions.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Guild id to admin text channel id. Entries here win over persisted ones.
    #[serde(default)]
    pub admin_channels: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            debounce_interval: default_debounce_interval(),
        }
    }
}

impl NotificationConfig {
    /// Quiet interval for the debouncer. Never fails: anything that is not a
    /// strictly positive duration falls back to the default.
    pub fn debounce_interval(&self) -> Duration {
        match parse_duration(&self.debounce_interval) {
            Ok(interval) if !interval.is_zero() => interval,
            Ok(_) => {
                warn!(
                    "debounce interval '{}' must be positive, using default {:?}",
                    self.debounce_interval, DEFAULT_DEBOUNCE_INTERVAL
                );
                DEFAULT_DEBOUNCE_INTERVAL
            }
            Err(err) => {
                warn!(
                    "invalid debounce interval '{}': {}, using default {:?}",
                    self.debounce_interval, err, DEFAULT_DEBOUNCE_INTERVAL
                );
                DEFAULT_DEBOUNCE_INTERVAL
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_file")]
    pub file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file: default_persistence_file(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            info!(
                "config file {} not found, using defaults and environment",
                path.display()
            );
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bot_token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty (set DISCORD_TOKEN)".to_string(),
            ));
        }

        if self.persistence.file.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "persistence.file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DISCORD_TOKEN") {
            self.auth.bot_token = value;
        }
        if let Some(value) = lookup("DEBOUNCE_INTERVAL").filter(|v| !v.trim().is_empty()) {
            self.notifications.debounce_interval = value;
        }
        if let Some(value) = lookup("PERSISTENCE_FILE").filter(|v| !v.trim().is_empty()) {
            self.persistence.file = value;
        }
        if let Some(value) = lookup("ADMIN_CHANNELS") {
            let pairs = parse_admin_channels(&value);
            if !pairs.is_empty() {
                info!(
                    "loaded {} admin channels from ADMIN_CHANNELS environment variable",
                    pairs.len()
                );
            }
            self.admin_channels.extend(pairs);
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_debounce_interval() -> String {
    "3s".to_string()
}

fn default_persistence_file() -> String {
    DEFAULT_PERSISTENCE_FILE.to_string()
}
