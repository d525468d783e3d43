//! FMS Configuration Module
//!
//! Backend location and sync cadence. Config is stored in
//! `~/.config/fms/config.toml` (or `$FMS_CONFIG_DIR/config.toml`).
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (`--api-url`)
//! 2. Environment variables (`FMS_API_URL`)
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FmsError;

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FmsConfig {
    /// Base URL of the task backend
    pub api_url: Option<String>,

    /// Sync cadence, in seconds
    #[serde(default)]
    pub timings: TimingSettings,
}

/// Sync cadence as written in `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    pub refresh_interval: u64,
    pub countdown_tick: u64,
    pub bootstrap_attempts: u32,
    pub bootstrap_delay: u64,
    pub upload_poll_interval: u64,
    pub notification_ttl: u64,
    pub reload_delay: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            refresh_interval: 120,
            countdown_tick: 1,
            bootstrap_attempts: 5,
            bootstrap_delay: 2,
            upload_poll_interval: 5,
            notification_ttl: 4,
            reload_delay: 3,
        }
    }
}

/// Resolved timers handed to the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    /// Period of the scheduled refresh; also the countdown window
    pub refresh_interval: Duration,
    pub countdown_tick: Duration,
    /// Total bootstrap fetches, including the first
    pub bootstrap_attempts: u32,
    pub bootstrap_delay: Duration,
    pub upload_poll_interval: Duration,
    pub notification_ttl: Duration,
    pub reload_delay: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        TimingSettings::default().to_timings()
    }
}

impl TimingSettings {
    pub fn to_timings(&self) -> SyncTimings {
        SyncTimings {
            refresh_interval: Duration::from_secs(self.refresh_interval.max(1)),
            countdown_tick: Duration::from_secs(self.countdown_tick.max(1)),
            bootstrap_attempts: self.bootstrap_attempts.max(1),
            bootstrap_delay: Duration::from_secs(self.bootstrap_delay),
            upload_poll_interval: Duration::from_secs(self.upload_poll_interval.max(1)),
            notification_ttl: Duration::from_secs(self.notification_ttl),
            reload_delay: Duration::from_secs(self.reload_delay),
        }
    }
}

impl FmsConfig {
    /// Get the config directory path
    ///
    /// `$FMS_CONFIG_DIR` when set, otherwise `~/.config/fms/` on Unix and
    /// `%APPDATA%/fms/` on Windows.
    pub fn config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("FMS_CONFIG_DIR").filter(|d| !d.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fms")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, FmsError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self, FmsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| FmsError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| FmsError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    pub fn with_env(self) -> Self {
        let env_url = std::env::var("FMS_API_URL").ok();
        self.with_api_url_override(env_url)
    }

    /// Replace `api_url` when an override is present and non-empty
    pub fn with_api_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url);
        }
        self
    }

    /// Effective backend base URL, validated and without trailing slash
    pub fn api_url(&self) -> Result<String, FmsError> {
        let raw = self.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let parsed = url::Url::parse(raw).map_err(|e| FmsError::Config {
            reason: format!("Invalid api_url '{}': {}", raw, e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FmsError::Config {
                reason: format!("api_url must be http(s), got '{}'", parsed.scheme()),
            });
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn timings(&self) -> SyncTimings {
        self.timings.to_timings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_timings_match_dashboard_cadence() {
        let timings = SyncTimings::default();
        assert_eq!(timings.refresh_interval, Duration::from_secs(120));
        assert_eq!(timings.countdown_tick, Duration::from_secs(1));
        assert_eq!(timings.bootstrap_attempts, 5);
        assert_eq!(timings.bootstrap_delay, Duration::from_secs(2));
        assert_eq!(timings.upload_poll_interval, Duration::from_secs(5));
        assert_eq!(timings.notification_ttl, Duration::from_secs(4));
        assert_eq!(timings.reload_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = FmsConfig::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, FmsConfig::default());
    }

    #[test]
    fn test_load_partial_timings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "api_url = \"http://fms.local:5000/\"\n[timings]\nrefresh_interval = 30\n",
        )
        .unwrap();

        let config = FmsConfig::load_from(&path).unwrap();
        assert_eq!(config.api_url().unwrap(), "http://fms.local:5000");
        assert_eq!(config.timings().refresh_interval, Duration::from_secs(30));
        assert_eq!(config.timings().bootstrap_attempts, 5);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "api_url = [").unwrap();
        assert!(matches!(
            FmsConfig::load_from(&path),
            Err(FmsError::Config { .. })
        ));
    }

    #[test]
    fn test_override_skips_empty_values() {
        let config = FmsConfig {
            api_url: Some("http://from-file:5000".into()),
            ..Default::default()
        };
        let kept = config.clone().with_api_url_override(Some("  ".into()));
        assert_eq!(kept.api_url.as_deref(), Some("http://from-file:5000"));

        let replaced = config.with_api_url_override(Some("http://from-env:9000".into()));
        assert_eq!(replaced.api_url().unwrap(), "http://from-env:9000");
    }

    #[test]
    fn test_api_url_validation() {
        assert_eq!(FmsConfig::default().api_url().unwrap(), DEFAULT_API_URL);

        let bad = FmsConfig {
            api_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(bad.api_url().is_err());

        let ftp = FmsConfig {
            api_url: Some("ftp://files.local".into()),
            ..Default::default()
        };
        assert!(ftp.api_url().is_err());
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let settings = TimingSettings {
            refresh_interval: 0,
            bootstrap_attempts: 0,
            ..Default::default()
        };
        let timings = settings.to_timings();
        assert_eq!(timings.refresh_interval, Duration::from_secs(1));
        assert_eq!(timings.bootstrap_attempts, 1);
    }
}
