//! Prometheus metrics for seekarr cycles
//!
//! This module provides metrics tracking for:
//! - Cycles: completed and failed runs, duration
//! - Searches: per server type and category, success and failure
//!
//! # Usage
//!
//! Metrics are registered in a [`Registry`] owned by [`PrometheusMetrics`];
//! nothing is registered in the process-global default registry. Components
//! receive the sink as `Arc<dyn MetricsSink>`; [`NoopMetrics`] discards
//! everything.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

use crate::models::{Category, ServerType};

/// Destination for cycle and search metrics
pub trait MetricsSink: Send + Sync {
    /// Count one finished cycle
    fn increment_cycles(&self, failed: bool);

    /// Count one live search trigger
    fn increment_searches(&self, server_type: ServerType, category: Category, failed: bool);

    /// Record how long a cycle ran
    fn observe_cycle_duration(&self, seconds: f64);
}

fn status_label(failed: bool) -> &'static str {
    if failed {
        "failed"
    } else {
        "success"
    }
}

// ============================================================================
// Prometheus
// ============================================================================

/// Prometheus-backed sink
pub struct PrometheusMetrics {
    registry: Registry,
    cycles: CounterVec,
    searches: CounterVec,
    cycle_duration: Histogram,
}

impl PrometheusMetrics {
    /// Create all metrics in a fresh registry
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles = CounterVec::new(
            Opts::new("seekarr_cycles_total", "Total automation cycles by status"),
            &["status"],
        )?;
        let searches = CounterVec::new(
            Opts::new(
                "seekarr_searches_total",
                "Total search triggers by server type, category and status",
            ),
            &["server_type", "category", "status"],
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "seekarr_cycle_duration_seconds",
                "Automation cycle duration in seconds",
            )
            .buckets(vec![
                1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
            ]),
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            cycles,
            searches,
            cycle_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Current value of `seekarr_cycles_total{status}`
    pub fn cycles(&self, failed: bool) -> u64 {
        self.cycles.with_label_values(&[status_label(failed)]).get() as u64
    }

    /// Current value of `seekarr_searches_total{server_type,category,status}`
    pub fn searches(&self, server_type: ServerType, category: Category, failed: bool) -> u64 {
        self.searches
            .with_label_values(&[server_type.as_str(), category.as_str(), status_label(failed)])
            .get() as u64
    }

    /// Number of observed cycle durations
    pub fn cycle_duration_count(&self) -> u64 {
        self.cycle_duration.get_sample_count()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn increment_cycles(&self, failed: bool) {
        self.cycles.with_label_values(&[status_label(failed)]).inc();
    }

    fn increment_searches(&self, server_type: ServerType, category: Category, failed: bool) {
        self.searches
            .with_label_values(&[server_type.as_str(), category.as_str(), status_label(failed)])
            .inc();
    }

    fn observe_cycle_duration(&self, seconds: f64) {
        self.cycle_duration.observe(seconds);
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

// ============================================================================
// No-op
// ============================================================================

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment_cycles(&self, _failed: bool) {}

    fn increment_searches(&self, _server_type: ServerType, _category: Category, _failed: bool) {}

    fn observe_cycle_duration(&self, _seconds: f64) {}
}
