//! Key-value store substrate
//!
//! Everything herald persists goes through the [`KvStore`] trait, which
//! exposes only hash/set/list/counter primitives plus key expiry. Two
//! implementations ship with the crate:
//!
//! - [`MemoryStore`] - in-process store for single-process runs and tests
//! - [`RedisStore`] - pooled Redis connection via `deadpool-redis`
//!
//! Key names are never built ad hoc; use [`Keys`] so every entry lives under
//! the configured namespace.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald::store::{KvStore, MemoryStore, Keys};
//!
//! let store = MemoryStore::new();
//! let keys = Keys::new("notice");
//! store.sadd(&keys.whitelist(), &["10001".to_string()]).await?;
//! ```

mod keys;
mod memory;
mod redis_store;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use self::keys::Keys;
pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisStore, RedisStoreConfig};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or pool acquisition failed
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// A command reached the backend but failed
    #[error("Store command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    /// The key holds a value of a different type
    #[error("Key '{key}' holds a {found} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A stored value could not be interpreted
    #[error("Corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Redis protocol error
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

impl StoreError {
    /// Create a command error
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt value error
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Connection-level failures are worth retrying, data errors are not
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Command { .. } => true,
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            Self::WrongType { .. } | Self::Corrupt { .. } => false,
        }
    }
}

/// Abstract key-value store
///
/// Mirrors the subset of Redis semantics herald relies on. List indices are
/// inclusive and may be negative (counted from the tail), exactly as
/// `LRANGE`/`LTRIM` interpret them.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value, clearing any TTL
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a key of any type; returns whether it existed
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Set a time-to-live on an existing key; returns whether the key exists
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Read every field of a hash (empty when the key is missing)
    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Write one hash field
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Write several hash fields at once
    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// Atomically add `delta` to an integer hash field and return the new value
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Add set members; returns how many were newly inserted
    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize>;

    /// Remove set members; returns how many were present
    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<usize>;

    /// All members of a set (empty when the key is missing)
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Push to the head of a list; returns the new length
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    /// Keep only the inclusive `[start, stop]` range of a list
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;

    /// Read the inclusive `[start, stop]` range of a list
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;
}

/// Resolve Redis-style inclusive list bounds against a list length
///
/// Returns `None` when the range selects nothing.
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}
