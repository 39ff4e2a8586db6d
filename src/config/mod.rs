//! Configuration management for herald
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daily push schedule
    pub schedule: ScheduleConfig,

    /// Key-value store backend
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Defaults for per-account configuration
    pub accounts: AccountDefaults,

    /// Static account table for the webhook transport
    pub directory: DirectoryConfig,
}

/// Daily push schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Whether the daily trigger is armed
    pub enable_schedule: bool,

    /// Time of day, "HH:MM" or a window "HH:MM-HH:MM"
    pub schedule_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enable_schedule: false,
            schedule_time: String::from("08:00"),
        }
    }
}

/// Store backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, lost on exit
    #[default]
    Memory,
    /// Redis server
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend to use
    pub backend: StoreBackend,

    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Namespace for every key
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::from("redis://localhost:6379"),
            pool_size: 8,
            key_prefix: String::from("notice"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Defaults applied to lazily created account configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountDefaults {
    /// Base delay between two deliveries, in milliseconds (500-10000)
    pub default_push_interval_ms: u64,

    /// Retry count (0-10); stored but not consumed by the push loop
    pub default_retry_count: u32,

    /// Whether accounts seen for the first time are enabled
    pub auto_enable_new_accounts: bool,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            default_push_interval_ms: 2000,
            default_retry_count: 3,
            auto_enable_new_accounts: true,
        }
    }
}

/// Static account table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Accounts reachable through a webhook
    pub accounts: Vec<DirectoryAccount>,
}

/// One account reachable through a webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAccount {
    /// Account identifier
    pub uin: String,

    /// Display name
    #[serde(default)]
    pub nickname: String,

    /// Joined group ids
    #[serde(default)]
    pub groups: Vec<String>,

    /// Endpoint that relays messages for this account
    pub webhook_url: String,

    /// Optional bearer token sent with each request
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

/// Allowed push interval range, in milliseconds
pub const PUSH_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 500..=10_000;

/// Allowed retry count range
pub const RETRY_COUNT_RANGE: std::ops::RangeInclusive<u32> = 0..=10;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(enabled) = env_parse::<bool>("HERALD_ENABLE_SCHEDULE") {
            self.schedule.enable_schedule = enabled;
        }
        if let Ok(time) = std::env::var("HERALD_SCHEDULE_TIME") {
            self.schedule.schedule_time = time;
        }
        if let Some(backend) = env_parse::<StoreBackend>("HERALD_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.store.url = url;
        }
        if let Ok(prefix) = std::env::var("HERALD_KEY_PREFIX") {
            self.store.key_prefix = prefix;
        }
        if let Ok(level) = std::env::var("HERALD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HERALD_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(interval) = env_parse::<u64>("HERALD_PUSH_INTERVAL_MS") {
            self.accounts.default_push_interval_ms = interval;
        }
        if let Some(retries) = env_parse::<u32>("HERALD_RETRY_COUNT") {
            self.accounts.default_retry_count = retries;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            anyhow::bail!("store.pool_size must be greater than 0");
        }

        if self.store.key_prefix.trim().is_empty() {
            anyhow::bail!("store.key_prefix must not be empty");
        }

        if !PUSH_INTERVAL_RANGE_MS.contains(&self.accounts.default_push_interval_ms) {
            anyhow::bail!(
                "accounts.default_push_interval_ms must be within 500..=10000, got {}",
                self.accounts.default_push_interval_ms
            );
        }

        if !RETRY_COUNT_RANGE.contains(&self.accounts.default_retry_count) {
            anyhow::bail!(
                "accounts.default_retry_count must be within 0..=10, got {}",
                self.accounts.default_retry_count
            );
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        for account in &self.directory.accounts {
            if account.uin.trim().is_empty() {
                anyhow::bail!("directory account uin must not be empty");
            }
            url::Url::parse(&account.webhook_url).with_context(|| {
                format!("Invalid webhook URL for account {}", account.uin)
            })?;
        }

        Ok(())
    }
}
