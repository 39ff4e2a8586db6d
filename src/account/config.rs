//! Per-account configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{AccountDefaults, PUSH_INTERVAL_RANGE_MS, RETRY_COUNT_RANGE};
use crate::error::{Error, Result};

/// Delivery settings of one account
///
/// `retry_count` is stored and validated, but the push loop makes exactly
/// one attempt per group regardless of its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub enabled: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    pub push_interval_ms: u64,
    pub retry_count: u32,
    /// Milliseconds since the Unix epoch, 0 when never pushed
    pub last_push_time: i64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self::from_defaults(&AccountDefaults::default())
    }
}

impl AccountConfig {
    /// Fresh configuration seeded from global defaults
    pub fn from_defaults(defaults: &AccountDefaults) -> Self {
        Self {
            enabled: defaults.auto_enable_new_accounts,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            push_interval_ms: defaults.default_push_interval_ms,
            retry_count: defaults.default_retry_count,
            last_push_time: 0,
        }
    }

    /// Overlay stored hash fields; stored values win over `self`
    ///
    /// Unreadable or out-of-range fields are skipped with a warning.
    pub fn merge_fields(mut self, uin: &str, fields: &HashMap<String, String>) -> Self {
        for (name, raw) in fields {
            let applied = match name.as_str() {
                "enabled" => raw.parse::<bool>().map(|v| self.enabled = v).is_ok(),
                "whitelist" => serde_json::from_str::<Vec<String>>(raw)
                    .map(|v| self.whitelist = v)
                    .is_ok(),
                "blacklist" => serde_json::from_str::<Vec<String>>(raw)
                    .map(|v| self.blacklist = v)
                    .is_ok(),
                "push_interval" => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|v| PUSH_INTERVAL_RANGE_MS.contains(v))
                    .map(|v| self.push_interval_ms = v)
                    .is_some(),
                "retry_count" => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|v| RETRY_COUNT_RANGE.contains(v))
                    .map(|v| self.retry_count = v)
                    .is_some(),
                "last_push_time" => raw.parse::<i64>().map(|v| self.last_push_time = v).is_ok(),
                _ => true,
            };
            if !applied {
                tracing::warn!(uin, field = %name, value = %raw, "Ignoring unreadable account config field");
            }
        }
        self
    }

    /// Hash fields for storage
    pub fn to_fields(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("enabled".into(), self.enabled.to_string()),
            ("whitelist".into(), serde_json::to_string(&self.whitelist)?),
            ("blacklist".into(), serde_json::to_string(&self.blacklist)?),
            ("push_interval".into(), self.push_interval_ms.to_string()),
            ("retry_count".into(), self.retry_count.to_string()),
            ("last_push_time".into(), self.last_push_time.to_string()),
        ])
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !PUSH_INTERVAL_RANGE_MS.contains(&self.push_interval_ms) {
            return Err(Error::validation(format!(
                "push interval must be within 500-10000 ms, got {}",
                self.push_interval_ms
            )));
        }
        if !RETRY_COUNT_RANGE.contains(&self.retry_count) {
            return Err(Error::validation(format!(
                "retry count must be within 0-10, got {}",
                self.retry_count
            )));
        }
        Ok(())
    }

    /// Base delay between two deliveries
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }
}
