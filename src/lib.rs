//! herald - Multi-account announcement broadcaster
//!
//! Publishes one "current" announcement and broadcasts it to every chat
//! group reachable through the logged-in bot accounts, paced and filtered
//! per account, either on demand or once a day.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`store`] - Key-value store abstraction (in-memory, Redis)
//! - [`notice`] - Notice lifecycle, history and push-job progress
//! - [`filter`] - Whitelist/blacklist rules and group id handling
//! - [`account`] - Account enumeration, per-account config and transports
//! - [`push`] - Sequential, paced broadcast of the current notice
//! - [`scheduler`] - Daily unattended push
//! - [`metrics`] - Prometheus counters for push runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use herald::account::{AccountRegistry, WebhookDirectory};
//! use herald::config::Config;
//! use herald::notice::NoticeStore;
//! use herald::push::{LogReporter, PushMode, PushOrchestrator};
//! use herald::store::{Keys, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let notices = Arc::new(NoticeStore::new(
//!         Arc::new(MemoryStore::new()),
//!         Keys::new(config.store.key_prefix.clone()),
//!     ));
//!     let directory = Arc::new(WebhookDirectory::new(&config.directory)?);
//!     let registry = Arc::new(AccountRegistry::new(
//!         directory,
//!         Arc::clone(&notices),
//!         config.accounts.clone(),
//!     ));
//!     let orchestrator = PushOrchestrator::new(registry, Arc::clone(&notices));
//!
//!     notices.create_notice("Maintenance tonight at 22:00", "admin").await?;
//!     orchestrator.push(PushMode::Interactive, &LogReporter).await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod notice;
pub mod push;
pub mod scheduler;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::account::{AccountConfig, AccountDirectory, AccountRegistry, AccountSession};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, HeraldErrorTrait, Result};
    pub use crate::filter::{ListAction, ListFilterEngine, ListKind};
    pub use crate::notice::{Notice, NoticeStatus, NoticeStore};
    pub use crate::push::{PushMode, PushOrchestrator, PushOutcome, PushReport};
    pub use crate::scheduler::DailyScheduler;
    pub use crate::store::{KvStore, MemoryStore};
}

// Direct re-exports for convenience
pub use notice::{Notice, NoticeStatus};
pub use push::{PushOutcome, PushReport};
