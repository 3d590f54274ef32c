//! Server configuration.
//!
//! Read from a TOML file (path in `ADMS_CONFIG`, default `adms.toml`); a
//! missing file means all defaults. `DATABASE_URL` and `ADMS_LISTEN`
//! override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adms_core::{Timebase, TzOffset};
use adms_service::Settings;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ADMS_CONFIG";

/// Config file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "adms.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub database_url: String,
    /// Server baseline offset from UTC, in hours. Half hours are allowed.
    pub server_utc_offset: TzOffset,
    pub auto_checkout_at: String, // "HH:MM" server-local
    pub sweep_interval_secs: u64,
    pub alias_ttl_secs: u64,
    pub dedup_window_secs: u64,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: "attendance.db".to_string(),
            server_utc_offset: TzOffset::default(),
            auto_checkout_at: "23:59".to_string(),
            sweep_interval_secs: 300,
            alias_ttl_secs: 24 * 60 * 60,
            dedup_window_secs: 60,
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Load from the file named by [`CONFIG_ENV`] and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_path(&Self::config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Parse a config file. A missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database_url = url;
        }
        if let Some(listen) = lookup("ADMS_LISTEN").filter(|v| !v.is_empty()) {
            self.listen = listen.parse().map_err(|_| ConfigError::Invalid {
                field: "ADMS_LISTEN",
                value: listen.clone(),
            })?;
        }
        Ok(())
    }

    /// Server-local time of day at which open sessions are closed.
    pub fn auto_checkout_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.auto_checkout_at.trim(), "%H:%M").map_err(|_| {
            ConfigError::Invalid {
                field: "auto_checkout_at",
                value: self.auto_checkout_at.clone(),
            }
        })
    }

    /// Service settings derived from this config.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            timebase: Timebase::new(self.server_utc_offset),
            dedup_window: seconds(self.dedup_window_secs),
            auto_checkout_at: self.auto_checkout_time()?,
            alias_ttl: seconds(self.alias_ttl_secs),
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

fn seconds(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        let settings = config.settings().unwrap();
        assert_eq!(settings.dedup_window, chrono::Duration::seconds(60));
        assert_eq!(
            settings.auto_checkout_at,
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
        assert_eq!(config.listen.port(), 8080);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adms.toml");
        std::fs::write(
            &path,
            r#"
listen = "127.0.0.1:9000"
server_utc_offset = 5.5
auto_checkout_at = "18:30"
webhook_url = "http://localhost:9999/events"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_path(&path).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.server_utc_offset, TzOffset::from_minutes(330));
        assert_eq!(config.database_url, "attendance.db");
        assert_eq!(
            config.settings().unwrap().auto_checkout_at,
            NaiveTime::from_hms_opt(18, 30, 0).unwrap()
        );
        assert!(config.webhook_url.is_some());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(|key| match key {
                "DATABASE_URL" => Some("/var/lib/adms.db".into()),
                "ADMS_LISTEN" => Some("127.0.0.1:7000".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database_url, "/var/lib/adms.db");
        assert_eq!(config.listen.port(), 7000);

        let err = config
            .apply_overrides(|key| (key == "ADMS_LISTEN").then(|| "nope".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ADMS_LISTEN", .. }));
    }

    #[test]
    fn test_bad_cutoff() {
        let config = ServerConfig {
            auto_checkout_at: "25:00".into(),
            ..ServerConfig::default()
        };
        assert!(config.settings().is_err());
    }
}
