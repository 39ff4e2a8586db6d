//! Whitelist/blacklist filtering
//!
//! Two tiers of lists decide which groups receive a broadcast:
//!
//! 1. the account's own whitelist, then its own blacklist
//!    ([`filter_account_groups`])
//! 2. the global blacklist, then the global whitelist
//!    ([`apply_global_filters`])
//!
//! The composition runs in exactly that order. A group on an account's
//! whitelist is still dropped by the global blacklist, and a group missing
//! from a non-empty global whitelist never survives.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use crate::account::AccountConfig;
use crate::error::{Error, Result};
use crate::store::{KvStore, Keys};

/// Which list an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitelist => f.write_str("whitelist"),
            Self::Blacklist => f.write_str("blacklist"),
        }
    }
}

impl FromStr for ListKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whitelist" | "white" => Ok(Self::Whitelist),
            "blacklist" | "black" => Ok(Self::Blacklist),
            other => Err(Error::validation(format!("unknown list '{other}'"))),
        }
    }
}

/// List operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListAction {
    Add,
    Del,
    View,
}

impl FromStr for ListAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "del" | "delete" | "remove" => Ok(Self::Del),
            "view" | "show" | "list" => Ok(Self::View),
            other => Err(Error::validation(format!("unknown list action '{other}'"))),
        }
    }
}

/// Outcome of adding ids to a list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// Ids newly inserted
    pub added: usize,
    /// Ids that were already members
    pub already_exist: usize,
    /// Normalised input count
    pub total: usize,
    pub new_ids: Vec<String>,
    pub already_exist_ids: Vec<String>,
}

/// Result of [`ListFilterEngine::update_list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "action", content = "result")]
pub enum ListUpdate {
    Added(AddOutcome),
    /// Number of ids actually removed
    Removed(usize),
    /// Current members
    Members(Vec<String>),
}

/// Snapshot of both global lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalLists {
    pub whitelist: HashSet<String>,
    pub blacklist: HashSet<String>,
}

impl GlobalLists {
    /// Whether neither list restricts anything
    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Trim, drop empties and de-duplicate, keeping first-seen order
pub fn normalize_group_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

static DIGIT_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Extract every run of digits from free text as a group id
pub fn parse_group_ids(text: &str) -> Vec<String> {
    let found: Vec<&str> = DIGIT_RUN_REGEX.find_iter(text).map(|m| m.as_str()).collect();
    normalize_group_ids(&found)
}

/// Apply an account's whitelist, then its blacklist
pub fn filter_account_groups(config: &AccountConfig, groups: &[String]) -> Vec<String> {
    let mut filtered: Vec<String> = groups.to_vec();

    if !config.whitelist.is_empty() {
        filtered.retain(|gid| config.whitelist.contains(gid));
    }
    if !config.blacklist.is_empty() {
        filtered.retain(|gid| !config.blacklist.contains(gid));
    }
    filtered
}

/// Apply the global blacklist, then the global whitelist
pub fn apply_global_filters(groups: &[String], lists: &GlobalLists) -> Vec<String> {
    if lists.is_empty() {
        return groups.to_vec();
    }
    let mut filtered: Vec<String> = groups.to_vec();

    if !lists.blacklist.is_empty() {
        filtered.retain(|gid| !lists.blacklist.contains(gid));
    }
    if !lists.whitelist.is_empty() {
        filtered.retain(|gid| lists.whitelist.contains(gid));
    }
    filtered
}

/// Apply a list operation to an in-memory member list
///
/// Used for account-scoped lists, which are stored inline in the account
/// configuration rather than as sets.
pub fn update_member_list(
    members: &mut Vec<String>,
    action: ListAction,
    group_ids: &[String],
) -> Result<ListUpdate> {
    let ids = normalize_group_ids(group_ids);
    if action != ListAction::View && ids.is_empty() {
        return Err(Error::validation("no valid group ids given"));
    }

    match action {
        ListAction::Add => {
            let (existing, fresh): (Vec<String>, Vec<String>) =
                ids.iter().cloned().partition(|id| members.contains(id));
            members.extend(fresh.iter().cloned());
            Ok(ListUpdate::Added(AddOutcome {
                added: fresh.len(),
                already_exist: existing.len(),
                total: ids.len(),
                new_ids: fresh,
                already_exist_ids: existing,
            }))
        }
        ListAction::Del => {
            let before = members.len();
            members.retain(|m| !ids.contains(m));
            Ok(ListUpdate::Removed(before - members.len()))
        }
        ListAction::View => Ok(ListUpdate::Members(members.clone())),
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Global list persistence and filtering
pub struct ListFilterEngine {
    store: Arc<dyn KvStore>,
    keys: Keys,
}

impl ListFilterEngine {
    /// Create an engine over the given store
    pub fn new(store: Arc<dyn KvStore>, keys: Keys) -> Self {
        Self { store, keys }
    }

    fn key(&self, kind: ListKind) -> String {
        match kind {
            ListKind::Whitelist => self.keys.whitelist(),
            ListKind::Blacklist => self.keys.blacklist(),
        }
    }

    /// Add, remove or view members of a global list
    ///
    /// Input ids are trimmed and de-duplicated first; an add or del whose
    /// normalised input is empty fails without touching the store.
    pub async fn update_list(
        &self,
        kind: ListKind,
        action: ListAction,
        group_ids: &[String],
    ) -> Result<ListUpdate> {
        let key = self.key(kind);
        let ids = normalize_group_ids(group_ids);
        if action != ListAction::View && ids.is_empty() {
            tracing::warn!(list = %kind, ?action, "List update without valid group ids");
            return Err(Error::validation("no valid group ids given"));
        }

        match action {
            ListAction::View => {
                let members = self.store.smembers(&key).await?;
                tracing::debug!(list = %kind, count = members.len(), "Viewed list");
                Ok(ListUpdate::Members(members))
            }
            ListAction::Add => {
                let existing: HashSet<String> =
                    self.store.smembers(&key).await?.into_iter().collect();
                let (already, fresh): (Vec<String>, Vec<String>) =
                    ids.iter().cloned().partition(|id| existing.contains(id));

                let added = if fresh.is_empty() {
                    0
                } else {
                    self.store.sadd(&key, &fresh).await?
                };

                tracing::info!(
                    list = %kind,
                    added,
                    already_exist = already.len(),
                    "Added to list"
                );
                Ok(ListUpdate::Added(AddOutcome {
                    added,
                    already_exist: already.len(),
                    total: ids.len(),
                    new_ids: fresh,
                    already_exist_ids: already,
                }))
            }
            ListAction::Del => {
                let removed = self.store.srem(&key, &ids).await?;
                tracing::info!(list = %kind, removed, "Removed from list");
                Ok(ListUpdate::Removed(removed))
            }
        }
    }

    /// Members of one global list
    pub async fn members(&self, kind: ListKind) -> Result<Vec<String>> {
        Ok(self.store.smembers(&self.key(kind)).await?)
    }

    /// Snapshot both global lists
    pub async fn global_lists(&self) -> Result<GlobalLists> {
        Ok(GlobalLists {
            whitelist: self.members(ListKind::Whitelist).await?.into_iter().collect(),
            blacklist: self.members(ListKind::Blacklist).await?.into_iter().collect(),
        })
    }

    /// Read the global lists and filter `groups` through them
    pub async fn apply_global_filters(&self, groups: &[String]) -> Result<Vec<String>> {
        let lists = self.global_lists().await?;
        Ok(apply_global_filters(groups, &lists))
    }
}
