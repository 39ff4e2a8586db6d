//! Unified error handling for the herald crate
//!
//! Domain modules keep their own error types ([`StoreError`],
//! [`DeliveryError`], [`SchedulerError`]); this module folds them into a
//! single [`Error`] for use across module boundaries.
//!
//! # Architecture
//!
//! - [`HeraldErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use herald::error::{Error, HeraldErrorTrait};
//!
//! fn report(err: &Error) -> String {
//!     if err.is_recoverable() {
//!         format!("temporary failure, try again: {}", err.user_message())
//!     } else {
//!         err.user_message()
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::account::DeliveryError;
pub use crate::scheduler::SchedulerError;
pub use crate::store::StoreError;

/// Common trait for herald error types
pub trait HeraldErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Short message suitable for showing to the operator who issued a command
    fn user_message(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed arguments, rejected without state change
    Validation,
    /// Transport failure for one delivery target
    Delivery,
    /// Persistence read/write failures
    Storage,
    /// Configuration errors
    Config,
    /// Scheduler and timing errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Human-readable category label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation => "invalid input",
            Self::Delivery => "delivery failure",
            Self::Storage => "storage failure",
            Self::Config => "configuration error",
            Self::Scheduler => "scheduler error",
            Self::Other => "error",
        }
    }
}

/// Unified error type for the herald crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed command arguments or empty id lists
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Delivery to a single target failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HeraldErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Delivery(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Config(msg) => msg.clone(),
            Self::Other { context, .. } => context.clone(),
            other => format!("{}: {other}", other.category().label()),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Delivery(_) => ErrorCategory::Delivery,
            Self::Store(_) | Self::Io(_) | Self::Json(_) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
