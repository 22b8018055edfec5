//! Concurrent per-server detection
//!
//! Polls every enabled server's missing and cutoff-unmet lists in parallel.
//! Each poll is its own task with a bounded timeout; a failing server only
//! affects its own result.
//!
//! ```text
//!                     ┌──────────────┐
//!                     │ detect_all() │
//!                     └──────┬───────┘
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//!   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//!   │  Radarr1    │   │  Radarr2    │   │  Sonarr1    │   JoinSet,
//!   │ timeout 15s │   │ timeout 15s │   │ timeout 15s │   child token each
//!   └──────┬──────┘   └──────┬──────┘   └──────┬──────┘
//!          └─────────────────┼─────────────────┘
//!                            ▼
//!              BTreeMap<ServerId, DetectionResult>
//! ```
//!
//! Every enabled server has an entry in the returned map. Servers that had
//! not finished when the parent token fired are reported as
//! [`DetectionError::Cancelled`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, ClientFactory};
use crate::models::{DetectionResult, ServerId, ServerRef};

/// Default per-server poll timeout
pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a server contributed no candidates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Poll exceeded its timeout
    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    /// Cycle was cancelled before the poll finished
    #[error("Detection cancelled")]
    Cancelled,

    /// Client reported an error
    #[error("{0}")]
    Client(#[from] ClientError),

    /// Poll task panicked or was aborted
    #[error("Detection task failed: {0}")]
    TaskFailed(String),
}

impl DetectionError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Client(e) => e.is_recoverable(),
            Self::Cancelled | Self::TaskFailed(_) => false,
        }
    }
}

/// Results of one detection sweep
#[derive(Debug, Clone, Default)]
pub struct DetectionSweep {
    pub results: BTreeMap<ServerId, DetectionResult>,
    /// The parent token fired before every poll finished
    pub cancelled: bool,
}

impl DetectionSweep {
    /// Results whose poll failed
    pub fn failures(&self) -> impl Iterator<Item = &DetectionResult> {
        self.results.values().filter(|r| !r.is_ok())
    }
}

/// Polls servers for candidates
pub struct Detector {
    factory: Arc<dyn ClientFactory>,
    timeout: Duration,
}

impl Detector {
    pub fn with_timeout(factory: Arc<dyn ClientFactory>, timeout: Duration) -> Self {
        Self { factory, timeout }
    }

    /// Poll every enabled server concurrently
    ///
    /// Returns once all polls finish or `cancel` fires. No poll task outlives
    /// this call.
    pub async fn detect_all(
        &self,
        servers: &[ServerRef],
        cancel: &CancellationToken,
    ) -> DetectionSweep {
        let enabled: Vec<&ServerRef> = servers.iter().filter(|s| s.enabled).collect();

        let mut results: BTreeMap<ServerId, DetectionResult> = enabled
            .iter()
            .map(|s| {
                (
                    s.id,
                    DetectionResult::failure((*s).clone(), DetectionError::Cancelled),
                )
            })
            .collect();

        let mut tasks = JoinSet::new();
        let mut task_servers = HashMap::with_capacity(enabled.len());

        for server in enabled {
            let server = server.clone();
            let factory = Arc::clone(&self.factory);
            let timeout = self.timeout;
            let token = cancel.child_token();
            let id = server.id;

            let handle = tasks.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        DetectionResult::failure(server, DetectionError::Cancelled)
                    }
                    result = poll_server(factory, server.clone(), timeout) => result,
                }
            });
            task_servers.insert(handle.id(), id);
        }

        let mut cancelled = false;
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    // child tokens resolve the remaining polls promptly
                    continue;
                }
                joined = tasks.join_next_with_id() => joined,
            };

            match joined {
                None => break,
                Some(Ok((_, result))) => {
                    if let Some(error) = &result.error {
                        tracing::warn!(
                            server = %result.server.name,
                            error = %error,
                            "Detection failed"
                        );
                    } else {
                        tracing::debug!(
                            server = %result.server.name,
                            missing = result.missing_items.len(),
                            cutoff = result.cutoff_items.len(),
                            "Detection completed"
                        );
                    }
                    results.insert(result.server.id, result);
                }
                Some(Err(join_error)) => {
                    let Some(id) = task_servers.get(&join_error.id()).copied() else {
                        continue;
                    };
                    if let Some(entry) = results.get_mut(&id) {
                        tracing::error!(
                            server = %entry.server.name,
                            error = %join_error,
                            "Detection task failed"
                        );
                        entry.error = Some(DetectionError::TaskFailed(join_error.to_string()));
                    }
                }
            }
        }

        DetectionSweep { results, cancelled }
    }
}

async fn poll_server(
    factory: Arc<dyn ClientFactory>,
    server: ServerRef,
    timeout: Duration,
) -> DetectionResult {
    let client = match factory.client_for(&server) {
        Ok(client) => client,
        Err(e) => return DetectionResult::failure(server, e.into()),
    };

    let lists = futures::future::try_join(client.get_missing(), client.get_cutoff_unmet());
    match tokio::time::timeout(timeout, lists).await {
        Ok(Ok((missing, cutoff))) => DetectionResult::success(server, missing, cutoff),
        Ok(Err(e)) => DetectionResult::failure(server, e.into()),
        Err(_) => DetectionResult::failure(server, DetectionError::Timeout(timeout)),
    }
}
