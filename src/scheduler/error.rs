//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A cycle is already running; the request was not queued
    CycleActive,

    /// Shutdown has begun
    ShuttingDown,

    /// `start` was called more than once
    AlreadyRunning,

    /// Schedule settings cannot drive a timer
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleActive => write!(f, "An automation cycle is already active"),
            Self::ShuttingDown => write!(f, "Scheduler is shutting down"),
            Self::AlreadyRunning => write!(f, "Scheduler is already running"),
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid schedule config '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// A busy scheduler may accept the same request later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CycleActive)
    }
}
