//! Account registry
//!
//! Enumerates accounts from the host directory (cached for 5 seconds),
//! serves per-account configuration (cached for 30 seconds) and computes
//! the pushable group set of each account.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{Account, AccountConfig, AccountDirectory, AccountSession, TtlCache, CONSOLE_ACCOUNT};
use crate::config::AccountDefaults;
use crate::error::Result;
use crate::filter::{
    apply_global_filters, filter_account_groups, update_member_list, GlobalLists, ListAction,
    ListKind, ListUpdate,
};
use crate::notice::NoticeStore;

/// Lifetime of the enumerated account list
pub const ACCOUNT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Lifetime of a cached account configuration
pub const CONFIG_CACHE_TTL: Duration = Duration::from_secs(30);

/// Per-account line of [`PushStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub uin: String,
    pub nickname: String,
    pub enabled: bool,
    pub total_groups: usize,
    pub pushable_groups: usize,
}

/// Reach of a broadcast under the current configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushStats {
    pub total_accounts: usize,
    pub enabled_accounts: usize,
    pub total_groups: usize,
    pub pushable_groups: usize,
    pub accounts: Vec<AccountStats>,
}

/// Cached view of accounts, their configuration and their targets
pub struct AccountRegistry {
    directory: Arc<dyn AccountDirectory>,
    notices: Arc<NoticeStore>,
    defaults: AccountDefaults,
    accounts: TtlCache<(), Vec<Account>>,
    configs: TtlCache<String, AccountConfig>,
}

impl AccountRegistry {
    /// Create a registry over a directory and the notice store
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        notices: Arc<NoticeStore>,
        defaults: AccountDefaults,
    ) -> Self {
        Self {
            directory,
            notices,
            defaults,
            accounts: TtlCache::new(ACCOUNT_CACHE_TTL),
            configs: TtlCache::new(CONFIG_CACHE_TTL),
        }
    }

    /// The notice store this registry persists into
    pub fn notices(&self) -> &Arc<NoticeStore> {
        &self.notices
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Logged-in accounts with a usable group list
    ///
    /// Served from cache for [`ACCOUNT_CACHE_TTL`] unless `force_refresh`.
    /// Directory failures yield an empty list.
    pub async fn get_all_accounts(&self, force_refresh: bool) -> Vec<Account> {
        if !force_refresh {
            if let Some(accounts) = self.accounts.get(&()).await {
                return accounts;
            }
        }

        let sessions = match self.directory.sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enumerate accounts");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut accounts = Vec::with_capacity(sessions.len());
        for session in sessions {
            let uin = session.uin().to_string();
            if uin.is_empty() || uin == CONSOLE_ACCOUNT || seen.contains(&uin) {
                continue;
            }
            match Account::from_session(session) {
                Some(account) => {
                    seen.insert(uin);
                    accounts.push(account);
                }
                None => tracing::warn!(uin = %uin, "Account has no usable group list, skipping"),
            }
        }

        for account in &accounts {
            if let Err(e) = self
                .notices
                .cache_account_groups(&account.uin, &account.groups)
                .await
            {
                tracing::warn!(uin = %account.uin, error = %e, "Failed to store group snapshot");
            }
        }

        tracing::debug!(count = accounts.len(), "Refreshed account list");
        self.accounts.insert((), accounts.clone()).await;
        accounts
    }

    /// Live session of one account
    pub async fn session(&self, uin: &str) -> Option<Arc<dyn AccountSession>> {
        self.get_all_accounts(false)
            .await
            .into_iter()
            .find(|a| a.uin == uin)
            .map(|a| Arc::clone(a.session()))
    }

    /// Groups of one account; empty when unknown
    pub async fn get_account_groups(&self, uin: &str) -> Vec<String> {
        match self
            .get_all_accounts(false)
            .await
            .into_iter()
            .find(|a| a.uin == uin)
        {
            Some(account) => account.groups,
            None => {
                tracing::warn!(uin, "Unknown account");
                Vec::new()
            }
        }
    }

    /// Groups of every account that has at least one
    pub async fn get_all_account_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.get_all_accounts(false)
            .await
            .into_iter()
            .filter(|a| !a.groups.is_empty())
            .map(|a| (a.uin, a.groups))
            .collect()
    }

    /// De-duplicated union of every account's groups
    pub async fn all_group_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.get_all_accounts(false)
            .await
            .into_iter()
            .flat_map(|a| a.groups)
            .filter(|g| seen.insert(g.clone()))
            .collect()
    }

    /// Last stored group snapshot of an account
    pub async fn cached_account_groups(&self, uin: &str) -> Vec<String> {
        self.notices
            .cached_account_groups(uin)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(uin, error = %e, "Failed to read group snapshot");
                Vec::new()
            })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Configuration of one account, stored values merged over defaults
    ///
    /// Storage failures fall back to the defaults.
    pub async fn get_account_config(&self, uin: &str) -> AccountConfig {
        let key = uin.to_string();
        if let Some(config) = self.configs.get(&key).await {
            return config;
        }

        let base = AccountConfig::from_defaults(&self.defaults);
        match self.notices.load_account_config(uin).await {
            Ok(fields) => {
                let config = base.merge_fields(uin, &fields);
                self.configs.insert(key, config.clone()).await;
                config
            }
            Err(e) => {
                tracing::error!(uin, error = %e, "Failed to load account config, using defaults");
                base
            }
        }
    }

    async fn save_account_config(&self, uin: &str, config: &AccountConfig) -> Result<()> {
        let fields = config.to_fields()?;
        let saved = self.notices.save_account_config(uin, &fields).await;
        self.configs.invalidate(&uin.to_string()).await;
        saved
    }

    /// Persist an account's configuration
    ///
    /// Returns `false` (and logs) when the values are out of range or the
    /// store rejects the write.
    pub async fn update_account_config(&self, uin: &str, config: &AccountConfig) -> bool {
        if let Err(e) = config.validate() {
            tracing::error!(uin, error = %e, "Rejected account config");
            return false;
        }
        match self.save_account_config(uin, config).await {
            Ok(()) => {
                tracing::info!(uin, "Updated account config");
                true
            }
            Err(e) => {
                tracing::error!(uin, error = %e, "Failed to update account config");
                false
            }
        }
    }

    /// Whether pushes through this account are enabled
    pub async fn is_account_enabled(&self, uin: &str) -> bool {
        self.get_account_config(uin).await.enabled
    }

    /// Stamp the time of this account's latest push
    pub async fn record_last_push(&self, uin: &str, at_millis: i64) -> bool {
        let mut config = self.get_account_config(uin).await;
        config.last_push_time = at_millis;
        self.update_account_config(uin, &config).await
    }

    /// Enable or disable every known account
    ///
    /// Returns `(updated, total)`.
    pub async fn set_all_enabled(&self, enabled: bool) -> (usize, usize) {
        let accounts = self.get_all_accounts(false).await;
        let mut updated = 0;
        for account in &accounts {
            let mut config = self.get_account_config(&account.uin).await;
            config.enabled = enabled;
            if self.update_account_config(&account.uin, &config).await {
                updated += 1;
            }
        }
        tracing::info!(enabled, updated, total = accounts.len(), "Bulk account toggle");
        (updated, accounts.len())
    }

    /// Add, remove or view entries of one account's own list
    pub async fn update_account_list(
        &self,
        uin: &str,
        kind: ListKind,
        action: ListAction,
        group_ids: &[String],
    ) -> Result<ListUpdate> {
        let mut config = self.get_account_config(uin).await;
        let members = match kind {
            ListKind::Whitelist => &mut config.whitelist,
            ListKind::Blacklist => &mut config.blacklist,
        };
        let update = update_member_list(members, action, group_ids)?;

        let changed = match &update {
            ListUpdate::Added(outcome) => outcome.added > 0,
            ListUpdate::Removed(count) => *count > 0,
            ListUpdate::Members(_) => false,
        };
        if changed {
            self.save_account_config(uin, &config).await.inspect_err(|e| {
                tracing::error!(uin, list = %kind, error = %e, "Failed to save account list");
            })?;
            tracing::info!(uin, list = %kind, ?action, "Updated account list");
        }
        Ok(update)
    }

    // ========================================================================
    // Targets
    // ========================================================================

    async fn global_lists(&self) -> Option<GlobalLists> {
        match self.notices.lists().global_lists().await {
            Ok(lists) => Some(lists),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read global lists");
                None
            }
        }
    }

    fn pushable(uin: &str, config: &AccountConfig, groups: &[String], lists: &GlobalLists) -> Vec<String> {
        let account_pass = filter_account_groups(config, groups);
        let final_pass = apply_global_filters(&account_pass, lists);
        if final_pass.len() != groups.len() {
            tracing::debug!(
                uin,
                total = groups.len(),
                after_account_lists = account_pass.len(),
                after_global_lists = final_pass.len(),
                "Filtered groups"
            );
        }
        final_pass
    }

    /// Filtered targets of every enabled account
    ///
    /// Accounts left with no groups are omitted. When the global lists
    /// cannot be read nothing is pushable.
    pub async fn get_all_pushable_groups(&self) -> BTreeMap<String, Vec<String>> {
        let all_groups = self.get_all_account_groups().await;
        let Some(lists) = self.global_lists().await else {
            return BTreeMap::new();
        };
        tracing::debug!(
            whitelist = lists.whitelist.len(),
            blacklist = lists.blacklist.len(),
            "Applying global lists"
        );

        let mut result = BTreeMap::new();
        for (uin, groups) in all_groups {
            let config = self.get_account_config(&uin).await;
            if !config.enabled {
                tracing::info!(uin = %uin, "Account disabled, skipping");
                continue;
            }
            let targets = Self::pushable(&uin, &config, &groups, &lists);
            if !targets.is_empty() {
                result.insert(uin, targets);
            }
        }
        result
    }

    /// Account and group counts under the current configuration
    pub async fn get_push_stats(&self) -> PushStats {
        let accounts = self.get_all_accounts(false).await;
        let lists = self.global_lists().await;
        let mut stats = PushStats {
            total_accounts: accounts.len(),
            ..PushStats::default()
        };

        for account in accounts {
            let config = self.get_account_config(&account.uin).await;
            let pushable = match (&lists, config.enabled) {
                (Some(lists), true) => Self::pushable(&account.uin, &config, &account.groups, lists).len(),
                _ => 0,
            };
            if config.enabled {
                stats.enabled_accounts += 1;
            }
            stats.total_groups += account.groups.len();
            stats.pushable_groups += pushable;
            stats.accounts.push(AccountStats {
                uin: account.uin,
                nickname: account.nickname,
                enabled: config.enabled,
                total_groups: account.groups.len(),
                pushable_groups: pushable,
            });
        }
        stats
    }
}
