//! Configuration management for Tributary.
//!
//! Configuration is read from `~/.config/tributary/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod interval;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::TributaryError;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub polling: PollingConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub subscriptions: SubscriptionsConfig,
}

/// Scheduler timings shared by the polling tiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval of the high-frequency tier (default: 1h)
    #[serde(with = "interval")]
    pub high_interval: Duration,

    /// Interval of the low-frequency tier (default: 24h)
    #[serde(with = "interval")]
    pub low_interval: Duration,

    /// Delay before the first tick after startup (default: 10s)
    #[serde(with = "interval")]
    pub startup_delay: Duration,

    /// Retry rounds after a pass for feeds that failed (default: 3)
    pub retry_count: u32,

    /// Delay between retry rounds (default: 10s)
    #[serde(with = "interval")]
    pub retry_interval: Duration,

    /// Auto feeds that published within this many days poll on the high tier (default: 30)
    pub active_days: i64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            high_interval: Duration::from_secs(3600),
            low_interval: Duration::from_secs(86400),
            startup_delay: Duration::from_secs(10),
            retry_count: 3,
            retry_interval: Duration::from_secs(10),
            active_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resident unpinned feeds kept fully in memory (default: 32)
    pub capacity: usize,

    /// Never write cache files (default: false)
    pub read_only: bool,

    /// Cache directory (default: `<cache dir>/tributary/feeds`)
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            read_only: false,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent string to use
    pub user_agent: String,

    /// HTML alternate-link hops followed per fetch (default: 3)
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("tributary/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    /// Subscription tree file (default: `<data dir>/tributary/subscriptions.json`)
    pub path: Option<PathBuf>,

    /// Window in which tree changes are coalesced into one save (default: 1000)
    pub save_debounce_ms: u64,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            path: None,
            save_debounce_ms: 1000,
        }
    }
}

/// Upper bound for `polling.active_days` (a century).
pub const MAX_ACTIVE_DAYS: i64 = 36_500;

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".into()));
        }
        if self.polling.high_interval.is_zero() || self.polling.low_interval.is_zero() {
            return Err(ConfigError::Invalid("polling intervals must be non-zero".into()));
        }
        if !(0..=MAX_ACTIVE_DAYS).contains(&self.polling.active_days) {
            return Err(ConfigError::Invalid(format!(
                "polling.active_days must be between 0 and {}",
                MAX_ACTIVE_DAYS
            )));
        }
        Ok(())
    }

    /// Get the default config file path: `~/.config/tributary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tributary").join("config.toml"))
    }

    /// Directory holding the per-feed cache files.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.cache.directory {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join("tributary").join("feeds"))
                .ok_or(ConfigError::NoConfigDir),
        }
    }

    /// File holding the subscription tree.
    pub fn subscriptions_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.subscriptions.path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("tributary").join("subscriptions.json"))
                .ok_or(ConfigError::NoConfigDir),
        }
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Tributary Configuration
#
# Intervals can be written as "30s", "15m", "1h", "1d" or plain seconds.

[polling]
# Feeds that published recently (or are set to High)
high_interval = "1h"

# Everything else that isn't switched off
low_interval = "24h"

# Wait this long after startup before the first poll
startup_delay = "10s"

# Retry rounds for feeds that failed during a pass
retry_count = 3
retry_interval = "10s"

# Auto feeds that published within this many days count as active
active_days = 30

[cache]
# Feeds kept fully in memory; the rest are stashed to disk
capacity = 32

# Never write cache files
read_only = false

# directory = "/path/to/cache"

[http]
timeout_secs = 30
max_redirects = 3

[subscriptions]
# path = "/path/to/subscriptions.json"

# Coalesce tree changes made within this window into one save
save_debounce_ms = 1000
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for TributaryError {
    fn from(err: ConfigError) -> Self {
        TributaryError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.polling.high_interval, Duration::from_secs(3600));
        assert_eq!(config.polling.low_interval, Duration::from_secs(86400));
        assert_eq!(config.cache.capacity, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[polling]
high_interval = "15m"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.polling.high_interval, Duration::from_secs(900));
        assert_eq!(config.polling.retry_count, 3);
        assert_eq!(config.subscriptions.save_debounce_ms, 1000);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.polling.startup_delay, Duration::from_secs(10));
        assert!(!config.cache.read_only);
    }

    #[test]
    fn test_load_from_rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache]\ncapacity = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_active_days_must_be_in_range() {
        let mut config = Config::default();
        config.polling.active_days = MAX_ACTIVE_DAYS;
        assert!(config.validate().is_ok());

        for days in [-1, MAX_ACTIVE_DAYS + 1, i64::MAX] {
            config.polling.active_days = days;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[polling]\nhigh_interval = \"often\"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_explicit_directories_win() {
        let mut config = Config::default();
        config.cache.directory = Some(PathBuf::from("/tmp/feeds"));
        config.subscriptions.path = Some(PathBuf::from("/tmp/subs.json"));
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/feeds"));
        assert_eq!(config.subscriptions_path().unwrap(), PathBuf::from("/tmp/subs.json"));
    }
}
