//! seekarr - Fair-share search automation for Radarr and Sonarr
//!
//! Periodically finds missing and below-cutoff items across any number of
//! Radarr and Sonarr servers and triggers a bounded number of searches per
//! cycle, shared fairly between servers.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - Periodic timer, manual triggers and graceful shutdown
//! - [`automation`] - Cycle orchestration and the single-active-cycle guard
//! - [`detector`] - Concurrent per-server polling with timeouts
//! - [`distributor`] - Round-robin allocation and search execution
//! - [`logger`] - Persisted activity log with live-tail subscribers
//! - [`client`] - Radarr/Sonarr v3 API client and server registry
//! - [`storage`] - Activity log stores (SQLite, in-memory)
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus counters for cycles and searches
//! - [`models`] - Core data structures and types
//!
//! # Example
//!
//! ```no_run
//! use seekarr::app::App;
//! use seekarr::config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::build(Config::from_env()?)?;
//!     let result = app
//!         .automation
//!         .run_cycle(&CancellationToken::new(), true, true)
//!         .await?;
//!     println!("{} searches", result.total_triggered);
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod automation;
pub mod client;
pub mod config;
pub mod detector;
pub mod distributor;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::App;
    pub use crate::automation::{Automation, AutomationError, AutomationOptions};
    pub use crate::client::{ClientError, ClientFactory, MediaServerClient, ServerRegistry};
    pub use crate::config::{Config, ConfigProvider, SharedConfig};
    pub use crate::error::{Error, ErrorCategory, Result, SeekarrErrorTrait};
    pub use crate::logger::ActivityLogger;
    pub use crate::models::{Category, CycleResult, Item, LogEntry, LogType, ServerRef, ServerType};
    pub use crate::scheduler::{Scheduler, SchedulerError};
}

// Direct re-exports for convenience
pub use models::{Category, CycleResult, LogEntry, SchedulerStatus, ServerRef, ServerType};
