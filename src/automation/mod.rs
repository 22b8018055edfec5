//! Cycle orchestration
//!
//! One cycle runs detection, fair-share distribution and search execution for
//! the four categories and writes the activity log as it goes.
//!
//! ```text
//! try_claim ─▶ cycle_start ─▶ detect_all ─▶ ┌ per category ──────────────┐ ─▶ cycle_end
//!                                 │         │ distribute ─▶ execute ─▶   │
//!                                 ▼         │ search log (+ error logs)  │
//!                       error log per       └────────────────────────────┘
//!                       failed server
//! ```
//!
//! At most one cycle runs at a time. The claim is an RAII [`CycleLease`]; the
//! flag is released when the lease drops, including on unwind.
//!
//! Only log store failures fail a cycle. Server and search errors are
//! recorded as `error` log entries and the cycle carries on.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::{ClientFactory, ServerRegistry};
use crate::config::{AutomationConfig, ConfigProvider};
use crate::detector::{DetectionError, Detector, DEFAULT_DETECTION_TIMEOUT};
use crate::distributor::{distribute, Distributor, ExecutionReport, ServerCandidates};
use crate::logger::ActivityLogger;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::models::{
    Category, CategoryCount, CycleResult, DetectionResult, LogEntry, LogType, ServerId, ServerRef,
};
use crate::storage::StorageError;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the orchestrator
#[derive(Error, Debug)]
pub enum AutomationError {
    /// Another cycle holds the guard
    #[error("An automation cycle is already active")]
    CycleActive,

    /// Activity log could not be written; the cycle is aborted
    #[error("Activity log unavailable: {0}")]
    LogStore(#[from] StorageError),

    /// Builder was missing a required collaborator
    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),
}

impl AutomationError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CycleActive)
    }
}

// ============================================================================
// Cycle guard
// ============================================================================

#[derive(Debug, Default)]
struct CycleGuard {
    active: AtomicBool,
}

/// Proof that the holder owns the single active-cycle slot
///
/// Dropping the lease releases the slot.
#[derive(Debug)]
pub struct CycleLease {
    guard: Arc<CycleGuard>,
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}

// ============================================================================
// Options
// ============================================================================

/// Tunables for cycle execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationOptions {
    /// Per-server poll timeout
    pub detection_timeout: Duration,
    /// Emit one `info` entry per triggered search
    pub log_item_details: bool,
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            detection_timeout: DEFAULT_DETECTION_TIMEOUT,
            log_item_details: false,
        }
    }
}

impl From<&AutomationConfig> for AutomationOptions {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            detection_timeout: config.detection_timeout(),
            log_item_details: config.log_item_details,
        }
    }
}

// ============================================================================
// Automation
// ============================================================================

/// The cycle orchestrator
pub struct Automation {
    registry: Arc<dyn ServerRegistry>,
    detector: Detector,
    distributor: Distributor,
    config: Arc<dyn ConfigProvider>,
    logger: Arc<ActivityLogger>,
    metrics: Arc<dyn MetricsSink>,
    options: AutomationOptions,
    guard: Arc<CycleGuard>,
}

/// Shared orchestrator handle
pub type AutomationHandle = Arc<Automation>;

impl Automation {
    pub fn builder() -> AutomationBuilder {
        AutomationBuilder::default()
    }

    /// Claim the active-cycle slot without waiting
    pub fn try_claim(&self) -> Result<CycleLease, AutomationError> {
        self.guard
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AutomationError::CycleActive)?;
        Ok(CycleLease {
            guard: Arc::clone(&self.guard),
        })
    }

    /// Whether a cycle currently holds the slot
    pub fn is_cycle_active(&self) -> bool {
        self.guard.active.load(Ordering::Acquire)
    }

    pub fn logger(&self) -> &Arc<ActivityLogger> {
        &self.logger
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Claim the slot and run one cycle to completion
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
        is_manual: bool,
        dry_run: bool,
    ) -> Result<CycleResult, AutomationError> {
        let lease = self.try_claim()?;
        self.run_claimed(lease, cancel, is_manual, dry_run).await
    }

    /// Run one cycle under an already claimed lease
    ///
    /// The lease is released when this returns.
    pub async fn run_claimed(
        &self,
        lease: CycleLease,
        cancel: &CancellationToken,
        is_manual: bool,
        dry_run: bool,
    ) -> Result<CycleResult, AutomationError> {
        let started = Instant::now();
        let outcome = self.execute_cycle(cancel, is_manual, dry_run).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &outcome {
            Ok(result) => {
                self.metrics.increment_cycles(false);
                self.metrics.observe_cycle_duration(elapsed);
                tracing::info!(
                    cycle_id = %result.cycle_id,
                    triggered = result.total_triggered,
                    failed = result.total_failed,
                    cancelled = result.cancelled,
                    duration_secs = elapsed,
                    "Cycle finished"
                );
            }
            Err(e) => {
                self.metrics.increment_cycles(true);
                self.metrics.observe_cycle_duration(elapsed);
                tracing::error!(error = %e, "Cycle failed");
            }
        }

        drop(lease);
        outcome
    }

    async fn execute_cycle(
        &self,
        cancel: &CancellationToken,
        is_manual: bool,
        dry_run: bool,
    ) -> Result<CycleResult, AutomationError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let limits = self.config.search_limits();

        tracing::info!(%cycle_id, is_manual, dry_run, "Cycle starting");

        let mode = match (is_manual, dry_run) {
            (true, true) => "manual, dry run",
            (true, false) => "manual",
            (false, true) => "scheduled, dry run",
            (false, false) => "scheduled",
        };
        self.log(
            LogEntry::new(LogType::CycleStart, format!("Cycle started ({mode})")),
            is_manual,
        )
        .await?;

        let servers = self.registry.list_enabled_servers();
        let sweep = self.detector.detect_all(&servers, cancel).await;

        for result in sweep.failures() {
            if let Some(error) = &result.error {
                if *error == DetectionError::Cancelled {
                    continue;
                }
                self.log(
                    LogEntry::new(LogType::Error, format!("Detection failed: {error}"))
                        .with_server(&result.server),
                    is_manual,
                )
                .await?;
            }
        }

        let mut per_category_counts = BTreeMap::new();
        let mut cancelled = sweep.cancelled;

        if !cancelled {
            for category in Category::ALL {
                let candidates = candidates_for(category, &servers, &sweep.results);
                let assignments = distribute(category, limits.get(category), &candidates);
                let report = self
                    .distributor
                    .execute(&assignments, dry_run, cancel)
                    .await;

                self.record_category(category, &report, is_manual, dry_run)
                    .await?;

                per_category_counts.insert(
                    category,
                    CategoryCount {
                        assigned: assignments.len(),
                        triggered: report.triggered(),
                        failed: report.failed(),
                    },
                );

                if report.cancelled {
                    cancelled = true;
                    break;
                }
            }
        }

        let total_triggered = per_category_counts.values().map(|c| c.triggered).sum();
        let total_failed = per_category_counts.values().map(|c| c.failed).sum();

        let summary = if cancelled {
            format!("Cycle cancelled: {total_triggered} searches triggered, {total_failed} failed")
        } else {
            format!("Cycle completed: {total_triggered} searches triggered, {total_failed} failed")
        };
        self.log(
            LogEntry::new(LogType::CycleEnd, summary).with_count(total_triggered),
            is_manual,
        )
        .await?;

        Ok(CycleResult {
            cycle_id,
            started_at,
            ended_at: Utc::now(),
            is_manual,
            is_dry_run: dry_run,
            per_category_counts,
            total_triggered,
            total_failed,
            cancelled,
        })
    }

    /// Metrics and log entries for one executed category
    async fn record_category(
        &self,
        category: Category,
        report: &ExecutionReport,
        is_manual: bool,
        dry_run: bool,
    ) -> Result<(), AutomationError> {
        for outcome in &report.outcomes {
            let server = &outcome.assignment.server;
            if !dry_run {
                self.metrics
                    .increment_searches(server.server_type, category, !outcome.is_ok());
            }

            match &outcome.result {
                Err(e) => {
                    self.log(
                        LogEntry::new(
                            LogType::Error,
                            format!("Search failed for '{}': {e}", outcome.assignment.item.title),
                        )
                        .with_server(server)
                        .with_category(category),
                        is_manual,
                    )
                    .await?;
                }
                Ok(()) if self.options.log_item_details => {
                    let verb = if dry_run { "Would search" } else { "Searched" };
                    self.log(
                        LogEntry::new(
                            LogType::Info,
                            format!("{verb} '{}'", outcome.assignment.item.title),
                        )
                        .with_server(server)
                        .with_category(category),
                        is_manual,
                    )
                    .await?;
                }
                Ok(()) => {}
            }
        }

        let triggered = report.triggered();
        let mut message = if dry_run {
            format!("[dry run] Would trigger {triggered} {} searches", category.label())
        } else {
            format!("Triggered {triggered} {} searches", category.label())
        };
        if !report.tallies.is_empty() {
            let breakdown: Vec<String> = report
                .tallies
                .iter()
                .map(|t| {
                    let mut part = format!("{}: {}", t.server.name, t.triggered);
                    if t.failed > 0 {
                        let _ = write!(part, " ({} failed)", t.failed);
                    }
                    part
                })
                .collect();
            let _ = write!(message, " ({})", breakdown.join(", "));
        }

        let mut entry = LogEntry::new(LogType::Search, message)
            .with_category(category)
            .with_count(triggered);
        entry.server_type = Some(category.server_type());
        self.log(entry, is_manual).await
    }

    async fn log(&self, entry: LogEntry, is_manual: bool) -> Result<(), AutomationError> {
        self.logger.add_log(entry.manual(is_manual)).await?;
        Ok(())
    }
}

/// Candidates for `category` from healthy servers, in rotation order
fn candidates_for(
    category: Category,
    servers: &[ServerRef],
    results: &BTreeMap<ServerId, DetectionResult>,
) -> Vec<ServerCandidates> {
    servers
        .iter()
        .filter(|s| s.serves(category))
        .filter_map(|s| results.get(&s.id))
        .filter(|r| r.is_ok())
        .map(|r| ServerCandidates::new(r.server.clone(), r.candidates(category).to_vec()))
        .collect()
}

impl std::fmt::Debug for Automation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Automation")
            .field("options", &self.options)
            .field("cycle_active", &self.is_cycle_active())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Automation`]
///
/// Registry, client factory, config provider and logger are required;
/// metrics default to [`NoopMetrics`].
#[derive(Default)]
pub struct AutomationBuilder {
    registry: Option<Arc<dyn ServerRegistry>>,
    factory: Option<Arc<dyn ClientFactory>>,
    config: Option<Arc<dyn ConfigProvider>>,
    logger: Option<Arc<ActivityLogger>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    options: AutomationOptions,
}

impl AutomationBuilder {
    pub fn registry(mut self, registry: Arc<dyn ServerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn logger(mut self, logger: Arc<ActivityLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(mut self, options: AutomationOptions) -> Self {
        self.options = options;
        self
    }

    /// Assemble the orchestrator
    ///
    /// # Errors
    ///
    /// Returns `AutomationError::MissingComponent` naming the first missing
    /// collaborator.
    pub fn build(self) -> Result<Automation, AutomationError> {
        let registry = self
            .registry
            .ok_or(AutomationError::MissingComponent("server registry"))?;
        let factory = self
            .factory
            .ok_or(AutomationError::MissingComponent("client factory"))?;
        let config = self
            .config
            .ok_or(AutomationError::MissingComponent("config provider"))?;
        let logger = self
            .logger
            .ok_or(AutomationError::MissingComponent("logger"))?;
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        Ok(Automation {
            registry,
            detector: Detector::with_timeout(Arc::clone(&factory), self.options.detection_timeout),
            distributor: Distributor::new(factory),
            config,
            logger,
            metrics,
            options: self.options,
            guard: Arc::new(CycleGuard::default()),
        })
    }
}
