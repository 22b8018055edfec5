//! Unified error handling for the seekarr crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`SeekarrErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use seekarr::error::{Error, SeekarrErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err.description_with_category());
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::automation::AutomationError;
pub use crate::client::ClientError;
pub use crate::detector::DetectionError;
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StorageError;

/// Common trait for all seekarr error types
pub trait SeekarrErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// Message prefixed with the category label
    fn description_with_category(&self) -> String {
        format!("{}: {}", self.category().label(), self)
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, bad status)
    Network,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Scheduler lifecycle errors
    Scheduler,
    /// Another cycle holds the active-cycle slot
    Concurrency,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Human readable label for the category
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Storage => "storage error",
            Self::Config => "configuration error",
            Self::Scheduler => "scheduler error",
            Self::Concurrency => "concurrency conflict",
            Self::Other => "error",
        }
    }
}

/// Unified error type for the seekarr crate
#[derive(Error, Debug)]
pub enum Error {
    /// Media server client errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Detection errors
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    /// Orchestrator errors
    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Activity log storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

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

impl SeekarrErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_recoverable(),
            Self::Detection(e) => e.is_recoverable(),
            Self::Automation(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Storage(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(e) => match e {
                ClientError::InvalidUrl(_) | ClientError::UnknownServer(_) => ErrorCategory::Config,
                _ => ErrorCategory::Network,
            },
            Self::Detection(_) => ErrorCategory::Network,
            Self::Automation(e) => match e {
                AutomationError::CycleActive => ErrorCategory::Concurrency,
                AutomationError::LogStore(_) => ErrorCategory::Storage,
                AutomationError::MissingComponent(_) => ErrorCategory::Config,
            },
            Self::Scheduler(e) => match e {
                SchedulerError::CycleActive => ErrorCategory::Concurrency,
                SchedulerError::InvalidConfig { .. } => ErrorCategory::Config,
                _ => ErrorCategory::Scheduler,
            },
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
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
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let client_err = Error::Client(ClientError::Timeout);
        assert_eq!(client_err.category(), ErrorCategory::Network);

        let busy: Error = SchedulerError::CycleActive.into();
        assert_eq!(busy.category(), ErrorCategory::Concurrency);

        let store: Error = AutomationError::LogStore(StorageError::unavailable("disk full")).into();
        assert_eq!(store.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_is_recoverable() {
        let client_err = Error::Client(ClientError::Timeout);
        assert!(client_err.is_recoverable());

        let unauthorized = Error::Client(ClientError::Unauthorized);
        assert!(!unauthorized.is_recoverable());

        let cancelled = Error::Detection(DetectionError::Cancelled);
        assert!(!cancelled.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("Invalid API key");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert_eq!(
            err.description_with_category(),
            "configuration error: Config error: Invalid API key"
        );
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);

        let wrapped = Error::with_source("Failed to open log", io::Error::other("denied"));
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
