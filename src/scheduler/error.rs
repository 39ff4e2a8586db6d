//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Unparseable or out-of-range schedule time
    InvalidTime { value: String, reason: String },

    /// Reading state needed to decide on a trigger failed
    StateUnavailable { operation: String, reason: String },

    /// The push run could not be started
    TriggerFailed { reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime { value, reason } => {
                write!(f, "Invalid schedule time '{}': {}", value, reason)
            }
            Self::StateUnavailable { operation, reason } => {
                write!(f, "State unavailable during '{}': {}", operation, reason)
            }
            Self::TriggerFailed { reason } => {
                write!(f, "Trigger execution failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid time error
    pub fn invalid_time(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a state error with context
    pub fn state_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StateUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a trigger failure
    pub fn trigger_failed(reason: impl Into<String>) -> Self {
        Self::TriggerFailed {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// The next daily trigger retries naturally; only configuration errors
    /// need an operator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StateUnavailable { .. } | Self::TriggerFailed { .. }
        )
    }
}
