//! Integration tests for the scheduler timer, manual triggers and shutdown

mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{only_missing_movies, Harness, MockClient, MockServers};
use seekarr::automation::AutomationOptions;
use seekarr::models::{LogType, ScheduleConfig};
use seekarr::scheduler::{Scheduler, SchedulerError, SchedulerHandle};

const HOUR: Duration = Duration::from_secs(3600);

fn slow_harness(detection_delay: Duration, schedule: ScheduleConfig) -> Harness {
    let servers = MockServers::new().radarr(
        1,
        "Radarr1",
        MockClient::with_missing(5).detection_delay(detection_delay),
    );
    let options = AutomationOptions {
        detection_timeout: 24 * HOUR,
        ..AutomationOptions::default()
    };
    Harness::with_options(servers, only_missing_movies(5), schedule, options)
}

fn hourly() -> ScheduleConfig {
    ScheduleConfig {
        interval_hours: 1,
        enabled: true,
    }
}

fn scheduler_for(harness: &Harness) -> SchedulerHandle {
    Scheduler::handle(harness.automation.clone())
}

#[tokio::test(start_paused = true)]
async fn test_tick_runs_scheduled_cycle() {
    let harness = slow_harness(Duration::ZERO, hourly());
    let scheduler = scheduler_for(&harness);

    scheduler.start().unwrap();
    assert!(scheduler.status().next_run.is_some());

    tokio::time::sleep(HOUR + Duration::from_secs(1)).await;

    let starts = harness.entries_of(LogType::CycleStart);
    assert_eq!(starts.len(), 1);
    assert!(!starts[0].is_manual);

    let result = scheduler.last_result().unwrap();
    assert!(!result.is_manual);
    assert_eq!(result.total_triggered, 5);
    assert!(scheduler.status().last_run.is_some());

    scheduler.shutdown(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn test_tick_during_active_cycle_is_skipped() {
    let harness = slow_harness(Duration::from_secs(90 * 60), hourly());
    let scheduler = scheduler_for(&harness);

    scheduler.start().unwrap();
    scheduler.trigger_manual(false).unwrap();

    tokio::time::sleep(Duration::from_secs(61 * 60)).await;

    assert!(scheduler.status().is_cycle_active);
    let skipped = harness.entries_of(LogType::Skipped);
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].message.contains("already active"));
    assert_eq!(harness.entries_of(LogType::CycleStart).len(), 1);

    // manual cycle ends at 90m, next tick at 120m starts a scheduled one
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;

    let starts = harness.entries_of(LogType::CycleStart);
    assert_eq!(starts.len(), 2);
    assert!(starts[0].is_manual);
    assert!(!starts[1].is_manual);
    assert!(scheduler.last_result().unwrap().is_manual);

    scheduler.shutdown(Duration::ZERO).await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_schedule_skips_ticks() {
    let harness = slow_harness(
        Duration::ZERO,
        ScheduleConfig {
            interval_hours: 1,
            enabled: false,
        },
    );
    let scheduler = scheduler_for(&harness);

    scheduler.start().unwrap();
    tokio::time::sleep(2 * HOUR + Duration::from_secs(1)).await;

    let skipped = harness.entries_of(LogType::Skipped);
    assert_eq!(skipped.len(), 2);
    assert!(skipped[0].message.contains("disabled"));
    assert!(harness.entries_of(LogType::CycleStart).is_empty());

    // manual runs are still allowed
    scheduler.trigger_manual(true).unwrap();
    scheduler.shutdown(Duration::from_secs(30)).await;
    assert!(scheduler.last_result().unwrap().is_dry_run);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_manual_triggers_admit_one() {
    let harness = slow_harness(Duration::from_secs(60), hourly());
    let scheduler = scheduler_for(&harness);

    let results: Vec<_> = (0..8).map(|_| scheduler.trigger_manual(false)).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(SchedulerError::CycleActive))
            .count(),
        7
    );

    scheduler.shutdown(Duration::from_secs(120)).await;

    assert_eq!(harness.entries_of(LogType::CycleStart).len(), 1);
    assert_eq!(harness.entries_of(LogType::CycleEnd).len(), 1);
    assert_eq!(harness.servers.total_searches(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_from_many_tasks() {
    let harness = slow_harness(Duration::from_secs(60), hourly());
    let scheduler = scheduler_for(&harness);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let scheduler = scheduler.clone();
        tasks.push(tokio::spawn(async move { scheduler.trigger_manual(false) }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);

    scheduler.shutdown(Duration::from_secs(120)).await;
    assert_eq!(harness.entries_of(LogType::CycleStart).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_cycle_within_grace() {
    let harness = slow_harness(Duration::from_secs(10), hourly());
    let scheduler = scheduler_for(&harness);

    scheduler.start().unwrap();
    scheduler.trigger_manual(false).unwrap();
    scheduler.shutdown(Duration::from_secs(30)).await;

    let result = scheduler.last_result().unwrap();
    assert!(!result.cancelled);
    assert_eq!(result.total_triggered, 5);

    let end = harness.entries_of(LogType::CycleEnd);
    assert!(end[0].message.starts_with("Cycle completed"));

    let status = scheduler.status();
    assert!(!status.is_running);
    assert!(!status.is_cycle_active);
    assert!(status.next_run.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_hung_cycle() {
    let harness = slow_harness(10 * HOUR, hourly());
    let scheduler = scheduler_for(&harness);

    scheduler.trigger_manual(false).unwrap();
    scheduler.shutdown(Duration::from_secs(30)).await;

    let result = scheduler.last_result().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.total_triggered, 0);
    assert_eq!(harness.servers.total_searches(), 0);

    let end = harness.entries_of(LogType::CycleEnd);
    assert_eq!(end.len(), 1);
    assert!(end[0].message.starts_with("Cycle cancelled"));
    assert!(harness.entries_of(LogType::Error).is_empty());

    assert!(!harness.automation.is_cycle_active());
    assert_eq!(harness.metrics.cycles(false), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_hung_search() {
    let servers = MockServers::new().radarr(
        1,
        "Radarr1",
        MockClient::with_missing(3).search_delay(10 * HOUR),
    );
    let harness = Harness::new(servers, only_missing_movies(3));
    let scheduler = scheduler_for(&harness);

    scheduler.trigger_manual(false).unwrap();
    let started = Instant::now();
    scheduler.shutdown(Duration::from_secs(30)).await;
    assert!(started.elapsed() < Duration::from_secs(60));

    let result = scheduler.last_result().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.total_triggered, 0);
    assert_eq!(harness.servers.total_searches(), 0);

    let end = harness.entries_of(LogType::CycleEnd);
    assert_eq!(end.len(), 1);
    assert!(end[0].message.starts_with("Cycle cancelled"));
    assert!(!harness.automation.is_cycle_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_trigger_racing_shutdown_is_awaited() {
    for _ in 0..50 {
        let harness = slow_harness(Duration::ZERO, hourly());
        let scheduler = scheduler_for(&harness);

        let trigger = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger_manual(false) })
        };
        scheduler.shutdown(Duration::from_secs(5)).await;

        match trigger.await.unwrap() {
            Ok(()) => {
                // an admitted cycle has finished by the time shutdown returns
                assert_eq!(harness.entries_of(LogType::CycleEnd).len(), 1);
                assert!(!harness.automation.is_cycle_active());
                assert!(scheduler.last_result().is_some());
            }
            Err(e) => {
                assert_eq!(e, SchedulerError::ShuttingDown);
                assert!(harness.entries().is_empty());
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_new_cycles_after_shutdown() {
    let harness = slow_harness(Duration::ZERO, hourly());
    let scheduler = scheduler_for(&harness);

    scheduler.start().unwrap();
    scheduler.shutdown(Duration::from_secs(1)).await;

    assert_eq!(scheduler.start(), Err(SchedulerError::ShuttingDown));
    assert_eq!(
        scheduler.trigger_manual(false),
        Err(SchedulerError::ShuttingDown)
    );

    tokio::time::sleep(3 * HOUR).await;
    assert!(harness.entries().is_empty());
}
