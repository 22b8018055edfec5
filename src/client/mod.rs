//! Media server collaborators
//!
//! The automation core never talks HTTP directly. It asks a
//! [`ServerRegistry`] which servers are enabled and a [`ClientFactory`] for a
//! [`MediaServerClient`] bound to each of them.
//!
//! ```text
//! ┌──────────────────┐  list_enabled_servers  ┌──────────────────────┐
//! │     Detector     │ ─────────────────────▶ │    ServerRegistry    │
//! │   Distributor    │                        └──────────────────────┘
//! │                  │      client_for        ┌──────────────────────┐
//! │                  │ ─────────────────────▶ │    ClientFactory     │
//! └──────────────────┘                        └──────────┬───────────┘
//!                                                        ▼
//!                                             ┌──────────────────────┐
//!                                             │  ArrClient (v3 API)  │
//!                                             └──────────────────────┘
//! ```

mod arr;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Item, ServerId, ServerRef};

pub use arr::ArrClient;
pub use registry::ConfigServerRegistry;

/// Errors raised by media server clients
///
/// Cloneable so a single failure can be attached to detection results and
/// log entries alike.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport-level failure (connect, reset, TLS)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success status from the server
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Rejected API key
    #[error("Unauthorized: check the API key")]
    Unauthorized,

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Base URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No configured server matches the reference
    #[error("Unknown server id {0}")]
    UnknownServer(ServerId),
}

impl ClientError {
    /// Create a status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Unauthorized | Self::Decode(_) | Self::InvalidUrl(_) | Self::UnknownServer(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// API client for one Radarr or Sonarr server
#[async_trait]
pub trait MediaServerClient: Send + Sync {
    /// Monitored items with no file
    async fn get_missing(&self) -> Result<Vec<Item>, ClientError>;

    /// Monitored items whose file is below the quality cutoff
    async fn get_cutoff_unmet(&self) -> Result<Vec<Item>, ClientError>;

    /// Ask the server to search indexers for one item
    async fn trigger_search(&self, item: &Item) -> Result<(), ClientError>;
}

/// Builds clients bound to a server
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, server: &ServerRef) -> Result<Arc<dyn MediaServerClient>, ClientError>;
}

/// Source of the servers taking part in a cycle
pub trait ServerRegistry: Send + Sync {
    /// Enabled servers in rotation order
    fn list_enabled_servers(&self) -> Vec<ServerRef>;
}
