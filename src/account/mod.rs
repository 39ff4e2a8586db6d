//! Bot accounts and their delivery sessions
//!
//! The host runtime owns the logged-in accounts; herald only enumerates
//! them through an [`AccountDirectory`] and talks to each one via its
//! [`AccountSession`]. [`AccountRegistry`] layers caching, per-account
//! configuration and list filtering on top.
//!
//! [`WebhookDirectory`] is the bundled directory: a static account table
//! whose sessions relay messages through an HTTP webhook.

mod cache;
mod config;
mod registry;
mod webhook;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use self::cache::TtlCache;
pub use self::config::AccountConfig;
pub use self::registry::{
    AccountRegistry, AccountStats, PushStats, ACCOUNT_CACHE_TTL, CONFIG_CACHE_TTL,
};
pub use self::webhook::{WebhookDirectory, WebhookPayload, WebhookSession};

/// Pseudo-account of the local console, never a broadcast target
pub const CONSOLE_ACCOUNT: &str = "stdin";

/// Failure to deliver one message to one group
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The account is no longer logged in
    #[error("No live session for account {uin}")]
    SessionUnavailable { uin: String },

    /// The account is not a member of the group
    #[error("Account {uin} cannot reach group {group_id}")]
    GroupNotFound { uin: String, group_id: String },

    /// The transport answered but refused the message
    #[error("Message rejected: {reason}")]
    Rejected { reason: String },

    /// The account directory could not be enumerated
    #[error("Account directory unavailable: {0}")]
    Directory(String),

    /// HTTP transport failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Whether a later attempt could succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SessionUnavailable { .. } | Self::Directory(_) | Self::Http(_)
        )
    }
}

/// A logged-in account able to post to its groups
#[async_trait]
pub trait AccountSession: Send + Sync {
    /// Account identifier
    fn uin(&self) -> &str;

    /// Display name
    fn nickname(&self) -> &str;

    /// Joined group ids, or `None` when membership cannot be queried
    fn group_ids(&self) -> Option<Vec<String>>;

    /// Whether the account can currently reach `group_id`
    fn has_group(&self, group_id: &str) -> bool {
        self.group_ids()
            .is_some_and(|groups| groups.iter().any(|g| g == group_id))
    }

    /// Post a text message to one group
    async fn send_group_message(&self, group_id: &str, message: &str)
        -> Result<(), DeliveryError>;
}

/// Source of the currently logged-in accounts
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Every session the host knows about, including unusable ones
    async fn sessions(&self) -> Result<Vec<Arc<dyn AccountSession>>, DeliveryError>;
}

/// Snapshot of one usable account
#[derive(Clone)]
pub struct Account {
    pub uin: String,
    pub nickname: String,
    pub groups: Vec<String>,
    session: Arc<dyn AccountSession>,
}

impl Account {
    /// Snapshot a session; `None` when its group membership is unusable
    pub fn from_session(session: Arc<dyn AccountSession>) -> Option<Self> {
        let groups = session.group_ids()?;
        Some(Self {
            uin: session.uin().to_string(),
            nickname: session.nickname().to_string(),
            groups,
            session,
        })
    }

    /// Live session handle
    pub fn session(&self) -> &Arc<dyn AccountSession> {
        &self.session
    }

    /// Display label, `nickname(uin)`
    pub fn label(&self) -> String {
        let name = if self.nickname.is_empty() {
            "unknown"
        } else {
            &self.nickname
        };
        format!("{name}({})", self.uin)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("uin", &self.uin)
            .field("nickname", &self.nickname)
            .field("groups", &self.groups.len())
            .finish()
    }
}
