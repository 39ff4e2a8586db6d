//! Namespaced key names

use chrono::NaiveDate;

/// Builds every key herald reads or writes
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    /// Create a key builder for the given namespace
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The namespace in use
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// String: id of the current notice
    pub fn current(&self) -> String {
        format!("{}:current", self.prefix)
    }

    /// List: archived and recalled notice ids, newest first
    pub fn history(&self) -> String {
        format!("{}:history", self.prefix)
    }

    /// Hash: one notice record
    pub fn notice(&self, id: &str) -> String {
        format!("{}:ann:{}", self.prefix, id)
    }

    /// Set: global whitelist
    pub fn whitelist(&self) -> String {
        format!("{}:whitelist", self.prefix)
    }

    /// Set: global blacklist
    pub fn blacklist(&self) -> String {
        format!("{}:blacklist", self.prefix)
    }

    /// Hash: progress of one push job
    pub fn progress(&self, job_id: &str) -> String {
        format!("{}:progress:{}", self.prefix, job_id)
    }

    /// Hash: per-account configuration
    pub fn account_config(&self, uin: &str) -> String {
        format!("{}:account:{}:config", self.prefix, uin)
    }

    /// Set: last observed groups of an account
    pub fn account_groups(&self, uin: &str) -> String {
        format!("{}:account:{}:groups", self.prefix, uin)
    }

    /// Hash: aggregate push statistics for one day
    pub fn push_stats(&self, date: NaiveDate) -> String {
        format!("{}:stats:push:{}", self.prefix, date.format("%Y-%m-%d"))
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self::new("notice")
    }
}
