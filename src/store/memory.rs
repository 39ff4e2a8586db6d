//! In-process store
//!
//! Behaves like a single Redis database: typed values, per-key TTLs and
//! atomic counters. Expired keys are dropped lazily on access.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{resolve_range, KvStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::List(_) => "list",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Map-backed [`KvStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        entries.len()
    }

    /// Whether the store holds no live keys
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of a key, if it has one
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        live_entry(&mut entries, key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, e| !e.is_expired(now));
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Fetch or create a hash at `key`
fn hash_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut HashMap<String, String>> {
    let now = Instant::now();
    if live_entry(entries, key, now).is_none() {
        entries.insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
    }
    match entries.get_mut(key).map(|e| &mut e.value) {
        Some(Value::Hash(h)) => Ok(h),
        Some(other) => Err(wrong_type(key, "hash", other)),
        None => Err(StoreError::command("HSET", "entry vanished")),
    }
}

fn set_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut BTreeSet<String>> {
    let now = Instant::now();
    if live_entry(entries, key, now).is_none() {
        entries.insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
    }
    match entries.get_mut(key).map(|e| &mut e.value) {
        Some(Value::Set(s)) => Ok(s),
        Some(other) => Err(wrong_type(key, "set", other)),
        None => Err(StoreError::command("SADD", "entry vanished")),
    }
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut VecDeque<String>> {
    let now = Instant::now();
    if live_entry(entries, key, now).is_none() {
        entries.insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
    }
    match entries.get_mut(key).map(|e| &mut e.value) {
        Some(Value::List(l)) => Ok(l),
        Some(other) => Err(wrong_type(key, "list", other)),
        None => Err(StoreError::command("LPUSH", "entry vanished")),
    }
}

/// Redis deletes containers once they become empty
fn drop_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(|e| e.value.is_empty()) {
        entries.remove(key);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, Instant::now()).map(|e| &e.value) {
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let existed = live_entry(&mut entries, key, Instant::now()).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match live_entry(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, Instant::now()).map(|e| &e.value) {
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(other) => Err(wrong_type(key, "hash", other)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        hash_mut(&mut entries, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        let hash = hash_mut(&mut entries, key)?;
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock().await;
        let hash = hash_mut(&mut entries, key)?;
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                StoreError::corrupt(key, format!("field '{field}' is not an integer"))
            })?,
            None => 0,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut entries = self.entries.lock().await;
        let set = set_mut(&mut entries, key)?;
        Ok(members.iter().filter(|m| set.insert((*m).clone())).count())
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        let removed = match live_entry(&mut entries, key, Instant::now()).map(|e| &mut e.value) {
            Some(Value::Set(s)) => members.iter().filter(|m| s.remove(*m)).count(),
            Some(other) => return Err(wrong_type(key, "set", other)),
            None => 0,
        };
        drop_if_empty(&mut entries, key);
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, Instant::now()).map(|e| &e.value) {
            Some(Value::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, "set", other)),
            None => Ok(Vec::new()),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        let list = list_mut(&mut entries, key)?;
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, Instant::now()).map(|e| &mut e.value) {
            Some(Value::List(list)) => match resolve_range(list.len(), start, stop) {
                Some((from, to)) => {
                    list.truncate(to + 1);
                    list.drain(..from);
                }
                None => list.clear(),
            },
            Some(other) => return Err(wrong_type(key, "list", other)),
            None => {}
        }
        drop_if_empty(&mut entries, key);
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key, Instant::now()).map(|e| &e.value) {
            Some(Value::List(list)) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(other) => Err(wrong_type(key, "list", other)),
            None => Ok(Vec::new()),
        }
    }
}
