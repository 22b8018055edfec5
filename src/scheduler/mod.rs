//! Periodic and manual cycle scheduling
//!
//! The scheduler owns the timer that launches scheduled cycles and the entry
//! point for manual runs. It never runs a cycle itself; each cycle is its own
//! task, so the timer loop never blocks on cycle execution.
//!
//! # States
//!
//! ```text
//!             start()                 claim ok
//!  Stopped ───────────▶ Idle ───────────────────▶ CycleActive
//!                        ▲                             │
//!                        └──────── cycle ends ─────────┘
//!
//!  tick while CycleActive or disabled ─▶ `skipped` log entry, nothing queued
//! ```
//!
//! Ticks fire on fixed boundaries (`start + n * interval`). A cycle longer
//! than the interval causes skipped ticks, not drift.
//!
//! # Shutdown
//!
//! [`Scheduler::shutdown`] stops the timer, waits up to the grace period for
//! an active cycle, then cancels it and waits for it to observe cancellation.
//! Launching a cycle and raising the shutdown flag both happen under the
//! `active_cycle` lock, so every launched cycle is awaited by shutdown.

pub mod error;

pub use error::{SchedulerError, SchedulerResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::automation::{Automation, CycleLease};
use crate::config::ConfigProvider;
use crate::models::{CycleResult, LogEntry, LogType, SchedulerStatus};

#[derive(Debug, Default)]
struct SchedulerState {
    is_running: bool,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    last_result: Option<CycleResult>,
}

/// Drives scheduled and manual cycles
pub struct Scheduler {
    automation: Arc<Automation>,
    config: Arc<dyn ConfigProvider>,
    state: RwLock<SchedulerState>,
    started: AtomicBool,
    shutting_down: AtomicBool,
    timer_stop: CancellationToken,
    cycle_cancel: CancellationToken,
    timer_task: Mutex<Option<JoinHandle<()>>>,
    active_cycle: Mutex<Option<JoinHandle<()>>>,
}

/// Shared scheduler handle
pub type SchedulerHandle = Arc<Scheduler>;

impl Scheduler {
    /// Create a stopped scheduler
    pub fn new(automation: Arc<Automation>) -> Self {
        let config = Arc::clone(automation.config());
        Self {
            automation,
            config,
            state: RwLock::new(SchedulerState::default()),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            timer_stop: CancellationToken::new(),
            cycle_cancel: CancellationToken::new(),
            timer_task: Mutex::new(None),
            active_cycle: Mutex::new(None),
        }
    }

    /// Create a scheduler behind a shared handle
    pub fn handle(automation: Arc<Automation>) -> SchedulerHandle {
        Arc::new(Self::new(automation))
    }

    /// Start the periodic timer
    ///
    /// The first tick fires one interval from now.
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let schedule = self.config.schedule_config();
        let period = schedule.interval();
        if period.is_zero() {
            return Err(SchedulerError::invalid_config(
                "interval_hours",
                "must be greater than 0",
            ));
        }

        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let first_tick = Instant::now() + period;
        {
            let mut state = self.write_state();
            state.is_running = true;
            state.next_run = Some(to_utc(first_tick));
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.timer_loop(first_tick, period).await });
        *lock(&self.timer_task) = Some(handle);

        tracing::info!(
            interval_hours = schedule.interval_hours,
            enabled = schedule.enabled,
            "Scheduler started"
        );
        Ok(())
    }

    /// Launch a manual cycle without waiting for it
    ///
    /// Fails immediately with `CycleActive` if a cycle is running; the
    /// request is not queued.
    pub fn trigger_manual(self: &Arc<Self>, dry_run: bool) -> SchedulerResult<()> {
        // held until the handle is stored so shutdown always sees this cycle
        let mut active = lock(&self.active_cycle);
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        // claiming only fails while another cycle holds the lease
        let lease = self
            .automation
            .try_claim()
            .map_err(|_| SchedulerError::CycleActive)?;
        tracing::info!(dry_run, "Manual cycle triggered");
        *active = Some(self.spawn_cycle(lease, true, dry_run));
        Ok(())
    }

    /// Snapshot of the current state
    pub fn status(&self) -> SchedulerStatus {
        let state = self.read_state();
        SchedulerStatus {
            is_running: state.is_running,
            is_cycle_active: self.automation.is_cycle_active(),
            next_run: state.next_run,
            last_run: state.last_run,
            interval_hours: self.config.schedule_config().interval_hours,
        }
    }

    /// Result of the most recently finished cycle
    pub fn last_result(&self) -> Option<CycleResult> {
        self.read_state().last_result.clone()
    }

    /// Stop the timer and wind down any active cycle
    ///
    /// Waits up to `timeout` for the active cycle to finish, then cancels it
    /// and waits until it observes cancellation.
    pub async fn shutdown(&self, timeout: Duration) {
        {
            let _active = lock(&self.active_cycle);
            self.shutting_down.store(true, Ordering::Release);
        }
        self.timer_stop.cancel();

        let timer = lock(&self.timer_task).take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                tracing::warn!(error = %e, "Timer task ended abnormally");
            }
        }

        let active = lock(&self.active_cycle).take();
        if let Some(mut handle) = active {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(_) => tracing::info!("Active cycle finished before shutdown"),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        "Cancelling active cycle after grace period"
                    );
                    self.cycle_cancel.cancel();
                    if let Err(e) = handle.await {
                        tracing::warn!(error = %e, "Cycle task ended abnormally");
                    }
                }
            }
        }

        let mut state = self.write_state();
        state.is_running = false;
        state.next_run = None;
        tracing::info!("Scheduler stopped");
    }

    async fn timer_loop(self: Arc<Self>, first_tick: Instant, period: Duration) {
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = tokio::select! {
                _ = self.timer_stop.cancelled() => break,
                deadline = ticker.tick() => deadline,
            };

            self.write_state().next_run = Some(to_utc(deadline + period));
            self.on_tick().await;
        }

        tracing::debug!("Timer loop stopped");
    }

    async fn on_tick(self: &Arc<Self>) {
        if !self.config.schedule_config().enabled {
            self.log_skipped("Scheduled run skipped: schedule is disabled")
                .await;
            return;
        }

        let launched = {
            let mut active = lock(&self.active_cycle);
            if self.shutting_down.load(Ordering::Acquire) {
                return;
            }
            match self.automation.try_claim() {
                Ok(lease) => {
                    *active = Some(self.spawn_cycle(lease, false, false));
                    true
                }
                Err(_) => false,
            }
        };

        if !launched {
            self.log_skipped("Scheduled run skipped: a cycle is already active")
                .await;
        }
    }

    fn spawn_cycle(
        self: &Arc<Self>,
        lease: CycleLease,
        is_manual: bool,
        dry_run: bool,
    ) -> JoinHandle<()> {
        let token = self.cycle_cancel.child_token();
        let this = Arc::clone(self);

        self.write_state().last_run = Some(Utc::now());

        tokio::spawn(async move {
            let automation = Arc::clone(&this.automation);
            match automation.run_claimed(lease, &token, is_manual, dry_run).await {
                Ok(result) => this.write_state().last_result = Some(result),
                Err(e) => tracing::error!(error = %e, is_manual, "Cycle aborted"),
            }
        })
    }

    async fn log_skipped(&self, message: &str) {
        tracing::info!("{message}");
        let entry = LogEntry::new(LogType::Skipped, message);
        if let Err(e) = self.automation.logger().add_log(entry).await {
            tracing::warn!(error = %e, "Failed to record skipped tick");
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SchedulerState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SchedulerState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wall-clock time of a runtime instant
fn to_utc(instant: Instant) -> DateTime<Utc> {
    let until = instant.saturating_duration_since(Instant::now());
    Utc::now() + chrono::Duration::from_std(until).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, ClientFactory, MediaServerClient, ServerRegistry};
    use crate::config::SharedConfig;
    use crate::logger::ActivityLogger;
    use crate::models::{ScheduleConfig, SearchLimits, ServerRef};
    use crate::storage::MemoryLogStore;

    struct NoServers;

    impl ServerRegistry for NoServers {
        fn list_enabled_servers(&self) -> Vec<ServerRef> {
            Vec::new()
        }
    }

    impl ClientFactory for NoServers {
        fn client_for(
            &self,
            server: &ServerRef,
        ) -> Result<Arc<dyn MediaServerClient>, ClientError> {
            Err(ClientError::UnknownServer(server.id))
        }
    }

    fn scheduler(schedule: ScheduleConfig) -> (SchedulerHandle, Arc<MemoryLogStore>) {
        let store = Arc::new(MemoryLogStore::new());
        let automation = Automation::builder()
            .registry(Arc::new(NoServers))
            .client_factory(Arc::new(NoServers))
            .config(Arc::new(SharedConfig::new(SearchLimits::default(), schedule)))
            .logger(Arc::new(ActivityLogger::new(store.clone())))
            .build()
            .unwrap();
        (Scheduler::handle(Arc::new(automation)), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_rejected() {
        let (scheduler, _store) = scheduler(ScheduleConfig::default());

        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));

        let status = scheduler.status();
        assert!(status.is_running);
        assert!(status.next_run.is_some());
        assert_eq!(status.interval_hours, 6);

        scheduler.shutdown(Duration::from_secs(1)).await;
        assert!(!scheduler.status().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let (scheduler, _store) = scheduler(ScheduleConfig {
            interval_hours: 0,
            enabled: true,
        });
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::InvalidConfig { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_rejected_after_shutdown() {
        let (scheduler, _store) = scheduler(ScheduleConfig::default());
        scheduler.shutdown(Duration::from_secs(1)).await;

        assert_eq!(scheduler.start(), Err(SchedulerError::ShuttingDown));
        assert_eq!(
            scheduler.trigger_manual(false),
            Err(SchedulerError::ShuttingDown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_tick_is_skipped() {
        let (scheduler, store) = scheduler(ScheduleConfig {
            interval_hours: 1,
            enabled: false,
        });
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(3600 + 60)).await;

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log_type, LogType::Skipped);
        assert!(scheduler.last_result().is_none());

        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_records_result() {
        let (scheduler, _store) = scheduler(ScheduleConfig::default());

        scheduler.trigger_manual(true).unwrap();
        scheduler.shutdown(Duration::from_secs(30)).await;

        let result = scheduler.last_result().unwrap();
        assert!(result.is_manual);
        assert!(result.is_dry_run);
        assert!(!result.cancelled);
        assert!(scheduler.status().last_run.is_some());
    }
}
