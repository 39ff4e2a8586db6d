//! Time-bounded in-process cache

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Map of values that go stale `ttl` after insertion
///
/// Entries are never refreshed in place: writers call
/// [`invalidate`](Self::invalidate) and the next reader repopulates.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() < self.ttl
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, fetched_at)) if self.is_fresh(*fetched_at) => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value fetched now
    pub async fn insert(&self, key: K, value: V) {
        self.entries
            .lock()
            .await
            .insert(key, (value, Instant::now()));
    }

    /// Drop one entry
    pub async fn invalidate(&self, key: &K) {
        self.entries.lock().await.remove(key);
    }
}
