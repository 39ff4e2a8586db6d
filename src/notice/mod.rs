//! Notice lifecycle store
//!
//! Owns the announcement records and everything else persisted alongside
//! them: the current-notice slot, the bounded history list, push-job
//! progress counters, per-account configuration hashes and daily push
//! statistics.
//!
//! # Lifecycle
//!
//! ```text
//! publish ──► current ──edit──► current
//!               │
//!               ├── publish (next) ──► archived ──► history
//!               └── recall ──────────► recalled ──► history
//! ```
//!
//! At most one notice is `current`. History keeps the 50 most recent ids;
//! older records are deleted by [`NoticeStore::cleanup_expired`].

mod id;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::filter::{ListAction, ListFilterEngine, ListKind, ListUpdate};
use crate::store::{KvStore, Keys};

pub use self::id::{generate_notice_id, is_notice_id, NOTICE_ID_LEN};

// ============================================================================
// Constants
// ============================================================================

/// Number of history ids retained
pub const HISTORY_LIMIT: usize = 50;

/// Notice records expire this long after creation
pub const NOTICE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Push-job progress expires this long after creation
pub const PUSH_JOB_TTL: Duration = Duration::from_secs(3600);

/// Account configuration freshness window
pub const ACCOUNT_CONFIG_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Account group snapshot lifetime
pub const ACCOUNT_GROUPS_TTL: Duration = Duration::from_secs(3600);

/// Daily push statistics lifetime
pub const PUSH_STATS_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Notice
// ============================================================================

/// Lifecycle state of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeStatus {
    /// Installed in the current slot
    Current,
    /// Superseded by a newer notice
    Archived,
    /// Withdrawn by an operator
    Recalled,
}

impl NoticeStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Archived => "archived",
            Self::Recalled => "recalled",
        }
    }
}

impl fmt::Display for NoticeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoticeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "archived" => Ok(Self::Archived),
            "recalled" => Ok(Self::Recalled),
            other => Err(format!("unknown notice status '{other}'")),
        }
    }
}

/// One announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Eight-character id, see [`generate_notice_id`]
    pub id: String,
    /// Announcement body
    pub content: String,
    /// User who published it
    pub creator: String,
    /// Local wall-clock time of publication
    pub timestamp: String,
    /// Lifecycle state
    pub status: NoticeStatus,
    /// Whether a push run has completed for this notice
    pub pushed: bool,
    /// Creation instant, milliseconds since the Unix epoch
    pub created: i64,
}

impl Notice {
    /// Rebuild a notice from its stored hash
    ///
    /// Returns `None` when any of content, creator, timestamp or status is
    /// missing or unreadable.
    pub fn from_fields(id: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let content = fields.get("content").filter(|v| !v.is_empty())?;
        let creator = fields.get("creator").filter(|v| !v.is_empty())?;
        let timestamp = fields.get("timestamp").filter(|v| !v.is_empty())?;
        let status = fields.get("status")?.parse().ok()?;

        Some(Self {
            id: id.to_string(),
            content: content.clone(),
            creator: creator.clone(),
            timestamp: timestamp.clone(),
            status,
            pushed: fields.get("push").is_some_and(|v| v == "pushed"),
            created: fields
                .get("created")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        })
    }

    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("content".to_string(), self.content.clone()),
            ("creator".to_string(), self.creator.clone()),
            ("timestamp".to_string(), self.timestamp.clone()),
            ("status".to_string(), self.status.as_str().to_string()),
            (
                "push".to_string(),
                if self.pushed { "pushed" } else { "pending" }.to_string(),
            ),
            ("created".to_string(), self.created.to_string()),
        ]
    }

    /// Creation instant
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created).single()
    }

    /// Whether a scheduled push should pick this notice up
    pub fn is_deliverable(&self) -> bool {
        self.status == NoticeStatus::Current && !self.pushed
    }
}

// ============================================================================
// Push job
// ============================================================================

/// Progress state of a push job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushJobStatus {
    Pending,
    Finished,
}

impl PushJobStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Finished => "finished",
        }
    }
}

/// Progress record of one broadcast run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    pub id: String,
    pub total: u64,
    pub sent: u64,
    pub status: PushJobStatus,
    /// Creation instant, milliseconds since the Unix epoch
    pub created: i64,
}

impl PushJob {
    fn from_fields(id: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let status = match fields.get("status")?.as_str() {
            "pending" => PushJobStatus::Pending,
            "finished" => PushJobStatus::Finished,
            _ => return None,
        };
        let number = |name: &str| fields.get(name).and_then(|v| v.parse::<u64>().ok());

        Some(Self {
            id: id.to_string(),
            total: number("total")?,
            sent: number("sent").unwrap_or(0),
            status,
            created: fields
                .get("created")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        })
    }
}

// ============================================================================
// Push statistics
// ============================================================================

/// Aggregate outcome of one day's most recent push run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushStatsRecord {
    pub total_accounts: u64,
    pub enabled_accounts: u64,
    pub total_groups: u64,
    pub pushable_groups: u64,
    pub success_count: u64,
    pub failed_count: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PushStatsRecord {
    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("total_accounts".into(), self.total_accounts.to_string()),
            ("enabled_accounts".into(), self.enabled_accounts.to_string()),
            ("total_groups".into(), self.total_groups.to_string()),
            ("pushable_groups".into(), self.pushable_groups.to_string()),
            ("success_count".into(), self.success_count.to_string()),
            ("failed_count".into(), self.failed_count.to_string()),
            ("timestamp".into(), self.timestamp.to_string()),
        ]
    }

    fn from_fields(fields: &HashMap<String, String>) -> Self {
        let number = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        Self {
            total_accounts: number("total_accounts"),
            enabled_accounts: number("enabled_accounts"),
            total_groups: number("total_groups"),
            pushable_groups: number("pushable_groups"),
            success_count: number("success_count"),
            failed_count: number("failed_count"),
            timestamp: fields
                .get("timestamp")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Persistence for notices and the data that travels with them
pub struct NoticeStore {
    store: Arc<dyn KvStore>,
    keys: Keys,
    lists: ListFilterEngine,
    /// Serialises publish/edit/recall so the current slot changes atomically
    lifecycle: Mutex<()>,
}

impl fmt::Debug for NoticeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeStore")
            .field("prefix", &self.keys.prefix())
            .finish()
    }
}

impl NoticeStore {
    /// Create a store over the given backend
    pub fn new(store: Arc<dyn KvStore>, keys: Keys) -> Self {
        let lists = ListFilterEngine::new(Arc::clone(&store), keys.clone());
        Self {
            store,
            keys,
            lists,
            lifecycle: Mutex::new(()),
        }
    }

    /// Global whitelist/blacklist engine sharing this store
    pub fn lists(&self) -> &ListFilterEngine {
        &self.lists
    }

    /// Key namespace in use
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    async fn current_id(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(&self.keys.current())
            .await?
            .filter(|id| !id.is_empty()))
    }

    /// Read one notice record by id, whatever its status
    pub async fn get_notice(&self, id: &str) -> Result<Option<Notice>> {
        let fields = self.store.hget_all(&self.keys.notice(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Notice::from_fields(id, &fields))
    }

    /// The current notice, if one is installed and intact
    pub async fn get_current_notice(&self) -> Result<Option<Notice>> {
        let Some(id) = self.current_id().await? else {
            return Ok(None);
        };

        let fields = self.store.hget_all(&self.keys.notice(&id)).await?;
        if fields.is_empty() {
            tracing::debug!(notice_id = %id, "Current slot points at a missing record");
            return Ok(None);
        }

        match Notice::from_fields(&id, &fields) {
            Some(notice) if notice.status == NoticeStatus::Current => Ok(Some(notice)),
            Some(notice) => {
                tracing::debug!(
                    notice_id = %id,
                    status = notice.status.as_str(),
                    "Current slot points at a non-current notice"
                );
                Ok(None)
            }
            None => {
                tracing::warn!(notice_id = %id, "Notice record is incomplete");
                Ok(None)
            }
        }
    }

    /// Publish a new notice, archiving the previous current one
    pub async fn create_notice(&self, content: &str, creator: &str) -> Result<Notice> {
        let _guard = self.lifecycle.lock().await;

        if let Some(previous) = self.get_current_notice().await? {
            self.store
                .hset(
                    &self.keys.notice(&previous.id),
                    "status",
                    NoticeStatus::Archived.as_str(),
                )
                .await?;
            self.store.lpush(&self.keys.history(), &previous.id).await?;
            tracing::info!(notice_id = %previous.id, "Archived previous notice");
            self.cleanup_expired().await?;
        }

        let notice = Notice {
            id: generate_notice_id(),
            content: content.to_string(),
            creator: creator.to_string(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            status: NoticeStatus::Current,
            pushed: false,
            created: Utc::now().timestamp_millis(),
        };

        let key = self.keys.notice(&notice.id);
        self.store.hset_multiple(&key, &notice.to_fields()).await?;
        self.store.expire(&key, NOTICE_TTL).await?;
        self.store.set(&self.keys.current(), &notice.id).await?;

        tracing::info!(notice_id = %notice.id, creator = %creator, "Published notice");
        Ok(notice)
    }

    /// Replace the content of the current notice
    ///
    /// Returns `false` when there is no current notice.
    pub async fn edit_notice(&self, content: &str) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;

        let Some(notice) = self.get_current_notice().await? else {
            return Ok(false);
        };
        self.store
            .hset(&self.keys.notice(&notice.id), "content", content)
            .await?;

        tracing::info!(notice_id = %notice.id, "Edited notice");
        Ok(true)
    }

    /// Withdraw the current notice into history
    ///
    /// Returns `false` when there is no current notice.
    pub async fn recall_notice(&self) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;

        let Some(notice) = self.get_current_notice().await? else {
            return Ok(false);
        };
        self.store
            .hset(
                &self.keys.notice(&notice.id),
                "status",
                NoticeStatus::Recalled.as_str(),
            )
            .await?;
        self.store.lpush(&self.keys.history(), &notice.id).await?;
        self.store.del(&self.keys.current()).await?;
        self.cleanup_expired().await?;

        tracing::info!(notice_id = %notice.id, "Recalled notice");
        Ok(true)
    }

    /// One page of history, most recent first
    ///
    /// `page` is 1-based; page 0 is treated as page 1. Records that have
    /// already expired are skipped.
    pub async fn get_history(&self, page: usize, page_size: usize) -> Result<Vec<Notice>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let start = page.max(1).saturating_sub(1).saturating_mul(page_size);
        let stop = start.saturating_add(page_size - 1);
        let (Ok(start), Ok(stop)) = (isize::try_from(start), isize::try_from(stop)) else {
            return Ok(Vec::new());
        };

        let ids = self.store.lrange(&self.keys.history(), start, stop).await?;
        let mut notices = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_notice(&id).await? {
                Some(notice) => notices.push(notice),
                None => tracing::debug!(notice_id = %id, "History entry has no record"),
            }
        }
        Ok(notices)
    }

    /// Restartable page-by-page view over history
    pub fn history_pages(&self, page_size: usize) -> HistoryCursor<'_> {
        HistoryCursor {
            store: self,
            page_size,
            next: 1,
            done: page_size == 0,
        }
    }

    /// Trim history to [`HISTORY_LIMIT`] ids and delete the dropped records
    ///
    /// Returns the number of records deleted.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let history_key = self.keys.history();
        let ids = self.store.lrange(&history_key, 0, -1).await?;
        if ids.len() <= HISTORY_LIMIT {
            return Ok(0);
        }

        let dropped = &ids[HISTORY_LIMIT..];
        self.store
            .ltrim(&history_key, 0, HISTORY_LIMIT as isize - 1)
            .await?;
        for id in dropped {
            self.store.del(&self.keys.notice(id)).await?;
        }

        tracing::debug!(deleted = dropped.len(), "Cleaned up notice history");
        Ok(dropped.len())
    }

    /// Mark a notice as pushed; no-op for unknown ids
    pub async fn set_notice_pushed(&self, id: &str) -> Result<()> {
        let key = self.keys.notice(id);
        if self.store.hget_all(&key).await?.is_empty() {
            tracing::debug!(notice_id = %id, "Cannot mark missing notice as pushed");
            return Ok(());
        }
        self.store.hset(&key, "push", "pushed").await?;
        Ok(())
    }

    /// Manage a global whitelist or blacklist
    pub async fn update_list(
        &self,
        kind: ListKind,
        action: ListAction,
        group_ids: &[String],
    ) -> Result<ListUpdate> {
        self.lists.update_list(kind, action, group_ids).await
    }

    // ------------------------------------------------------------------------
    // Push progress
    // ------------------------------------------------------------------------

    /// Create a pending push job sized to `total` targets
    pub async fn init_push_progress(&self, total: u64) -> Result<PushJob> {
        let job = PushJob {
            id: uuid::Uuid::new_v4().simple().to_string(),
            total,
            sent: 0,
            status: PushJobStatus::Pending,
            created: Utc::now().timestamp_millis(),
        };

        let key = self.keys.progress(&job.id);
        self.store
            .hset_multiple(
                &key,
                &[
                    ("total".to_string(), total.to_string()),
                    ("sent".to_string(), "0".to_string()),
                    ("status".to_string(), job.status.as_str().to_string()),
                    ("created".to_string(), job.created.to_string()),
                ],
            )
            .await?;
        self.store.expire(&key, PUSH_JOB_TTL).await?;

        tracing::debug!(job_id = %job.id, total, "Initialised push progress");
        Ok(job)
    }

    /// Count one more attempted target and return the new sent total
    pub async fn update_push_progress(&self, job_id: &str) -> Result<u64> {
        let sent = self
            .store
            .hincr_by(&self.keys.progress(job_id), "sent", 1)
            .await?;
        Ok(u64::try_from(sent).unwrap_or(0))
    }

    /// Mark a push job finished
    pub async fn finish_push_progress(&self, job_id: &str) -> Result<()> {
        self.store
            .hset(
                &self.keys.progress(job_id),
                "status",
                PushJobStatus::Finished.as_str(),
            )
            .await?;
        Ok(())
    }

    /// Read a push job's progress
    pub async fn get_push_progress(&self, job_id: &str) -> Result<Option<PushJob>> {
        let fields = self.store.hget_all(&self.keys.progress(job_id)).await?;
        Ok(PushJob::from_fields(job_id, &fields))
    }

    // ------------------------------------------------------------------------
    // Push statistics
    // ------------------------------------------------------------------------

    /// Store today's aggregate push statistics
    pub async fn record_push_stats(&self, record: &PushStatsRecord) -> Result<()> {
        let key = self.keys.push_stats(Local::now().date_naive());
        self.store.hset_multiple(&key, &record.to_fields()).await?;
        self.store.expire(&key, PUSH_STATS_TTL).await?;
        Ok(())
    }

    /// Read the statistics stored for `date`
    pub async fn get_push_stats_record(&self, date: NaiveDate) -> Result<Option<PushStatsRecord>> {
        let fields = self.store.hget_all(&self.keys.push_stats(date)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(PushStatsRecord::from_fields(&fields)))
    }

    // ------------------------------------------------------------------------
    // Account configuration storage
    // ------------------------------------------------------------------------

    /// Raw stored configuration fields of an account
    pub async fn load_account_config(&self, uin: &str) -> Result<HashMap<String, String>> {
        Ok(self.store.hget_all(&self.keys.account_config(uin)).await?)
    }

    /// Persist configuration fields of an account and refresh its TTL
    pub async fn save_account_config(&self, uin: &str, fields: &[(String, String)]) -> Result<()> {
        let key = self.keys.account_config(uin);
        self.store.hset_multiple(&key, fields).await?;
        self.store.expire(&key, ACCOUNT_CONFIG_TTL).await?;
        Ok(())
    }

    /// Replace the stored group snapshot of an account
    pub async fn cache_account_groups(&self, uin: &str, groups: &[String]) -> Result<()> {
        let key = self.keys.account_groups(uin);
        self.store.del(&key).await?;
        if !groups.is_empty() {
            self.store.sadd(&key, groups).await?;
            self.store.expire(&key, ACCOUNT_GROUPS_TTL).await?;
        }
        Ok(())
    }

    /// Last stored group snapshot of an account
    pub async fn cached_account_groups(&self, uin: &str) -> Result<Vec<String>> {
        Ok(self.store.smembers(&self.keys.account_groups(uin)).await?)
    }
}

// ============================================================================
// History cursor
// ============================================================================

/// Lazy, finite, restartable walk over notice history
#[derive(Debug)]
pub struct HistoryCursor<'a> {
    store: &'a NoticeStore,
    page_size: usize,
    next: usize,
    done: bool,
}

impl HistoryCursor<'_> {
    /// Fetch the next non-empty page, or `None` once history is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<Notice>>> {
        if self.done {
            return Ok(None);
        }
        let page = self.store.get_history(self.next, self.page_size).await?;
        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(page))
    }

    /// Start again from the most recent entry
    pub fn reset(&mut self) {
        self.next = 1;
        self.done = self.page_size == 0;
    }
}
