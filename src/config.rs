//! Configuration file parser for `config.toml`.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted and logged as warnings.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: PathBuf,

    pub sync: SyncConfig,
}

/// Settings for the sync engine, its fetcher and the scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minutes between scheduled runs over all users.
    pub interval_minutes: u64,

    /// A feed synced less than this many seconds ago is considered fresh.
    pub staleness_window_secs: u64,

    /// Stretch the staleness window to the publisher's `<ttl>` hint when it
    /// is longer than `staleness_window_secs`.
    pub respect_feed_ttl: bool,

    /// Total time budget for one feed request.
    pub request_timeout_secs: u64,

    pub connect_timeout_secs: u64,

    /// Responses larger than this are rejected.
    pub max_feed_size_bytes: usize,

    /// Feeds synced at the same time during a fan-out. 1 = sequential.
    pub max_concurrent_feeds: usize,

    pub max_redirects: usize,

    pub user_agent: String,

    /// Permit subscriptions pointing at loopback and private addresses.
    pub allow_private_addresses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/var/lib/syndication/syndication.db"),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            staleness_window_secs: 60,
            respect_feed_ttl: false,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_feed_size_bytes: 10 * 1024 * 1024,
            max_concurrent_feeds: 1,
            max_redirects: 5,
            user_agent: concat!("syndication/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_addresses: false,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["database_path", "sync"];

const SYNC_KEYS: &[&str] = &[
    "interval_minutes",
    "staleness_window_secs",
    "respect_feed_ttl",
    "request_timeout_secs",
    "connect_timeout_secs",
    "max_feed_size_bytes",
    "max_concurrent_feeds",
    "max_redirects",
    "user_agent",
    "allow_private_addresses",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path.display(),
            interval_minutes = config.sync.interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, TOP_LEVEL_KEYS, "");
            if let Some(toml::Value::Table(sync)) = raw.get("sync") {
                warn_unknown_keys(sync, SYNC_KEYS, "sync.");
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.interval_minutes == 0 {
            return Err(ConfigError::Invalid("sync.interval_minutes must be at least 1".into()));
        }
        if self.sync.max_concurrent_feeds == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_concurrent_feeds must be at least 1".into(),
            ));
        }
        if self.sync.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path cannot be empty".into()));
        }
        Ok(())
    }
}

fn warn_unknown_keys(table: &toml::Table, known: &[&str], prefix: &str) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(key = %format!("{prefix}{key}"), "Unknown key in config file, ignoring");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("syndication_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.interval(), Duration::from_secs(300));
        assert_eq!(config.sync.staleness_window(), Duration::from_secs(60));
        assert_eq!(config.sync.max_concurrent_feeds, 1);
        assert!(!config.sync.respect_feed_ttl);
        assert!(!config.sync.allow_private_addresses);
        assert!(config.sync.user_agent.starts_with("syndication/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/syndication_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        assert_eq!(Config::from_toml("  \n \n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sync_section_uses_defaults_for_missing() {
        let config = Config::from_toml("[sync]\nstaleness_window_secs = 120\n").unwrap();
        assert_eq!(config.sync.staleness_window_secs, 120);
        assert_eq!(config.sync.interval_minutes, 5);
        assert_eq!(config.database_path, Config::default().database_path);
    }

    #[test]
    fn test_full_config_file() {
        let path = write_config(
            "full",
            r#"
database_path = "/tmp/syndication.db"

[sync]
interval_minutes = 15
staleness_window_secs = 30
respect_feed_ttl = true
request_timeout_secs = 5
connect_timeout_secs = 2
max_feed_size_bytes = 1024
max_concurrent_feeds = 8
max_redirects = 2
user_agent = "test-agent"
allow_private_addresses = true
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/syndication.db"));
        assert_eq!(config.sync.interval(), Duration::from_secs(900));
        assert_eq!(config.sync.staleness_window(), Duration::from_secs(30));
        assert!(config.sync.respect_feed_ttl);
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.sync.max_feed_size_bytes, 1024);
        assert_eq!(config.sync.max_concurrent_feeds, 8);
        assert_eq!(config.sync.max_redirects, 2);
        assert_eq!(config.sync.user_agent, "test-agent");
        assert!(config.sync.allow_private_addresses);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("[sync]\ninterval_minutes = \"often\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml(
            "surprise = 1\n[sync]\ninterval_minutes = 10\ncolour = \"blue\"\n",
        )
        .unwrap();
        assert_eq!(config.sync.interval_minutes, 10);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Config::from_toml("[sync]\ninterval_minutes = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::from_toml("[sync]\nmax_concurrent_feeds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
