//! Wiring of the automation stack from a loaded configuration

use std::sync::Arc;

use crate::automation::{Automation, AutomationHandle, AutomationOptions};
use crate::client::ConfigServerRegistry;
use crate::config::{Config, SharedConfig};
use crate::error::{Error, Result};
use crate::logger::ActivityLogger;
use crate::metrics::PrometheusMetrics;
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::storage::{LogStore, SqliteLogStore};

/// Fully assembled application
pub struct App {
    pub config: Config,
    pub shared_config: SharedConfig,
    pub registry: Arc<ConfigServerRegistry>,
    pub logger: Arc<ActivityLogger>,
    pub metrics: Arc<PrometheusMetrics>,
    pub automation: AutomationHandle,
    pub scheduler: SchedulerHandle,
}

impl App {
    /// Validate `config` and build every component on a SQLite log store
    pub fn build(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;
        let store = SqliteLogStore::open(&config.database.sqlite_path)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build every component on the given log store
    pub fn with_store(config: Config, store: Arc<dyn LogStore>) -> Result<Self> {
        let shared_config = SharedConfig::from_config(&config);
        let registry = Arc::new(ConfigServerRegistry::from_config(&config));
        let logger = Arc::new(ActivityLogger::with_capacity(
            store,
            config.automation.subscriber_capacity,
        ));
        let metrics = Arc::new(
            PrometheusMetrics::new()
                .map_err(|e| Error::with_source("Failed to register metrics", e))?,
        );

        let automation = Arc::new(
            Automation::builder()
                .registry(registry.clone())
                .client_factory(registry.clone())
                .config(Arc::new(shared_config.clone()))
                .logger(logger.clone())
                .metrics(metrics.clone())
                .options(AutomationOptions::from(&config.automation))
                .build()?,
        );
        let scheduler = Scheduler::handle(automation.clone());

        tracing::info!(
            servers = config.servers.len(),
            enabled = registry.servers().iter().filter(|s| s.enabled).count(),
            "Automation stack assembled"
        );

        Ok(Self {
            config,
            shared_config,
            registry,
            logger,
            metrics,
            automation,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, SeekarrErrorTrait};
    use crate::storage::MemoryLogStore;

    #[test]
    fn test_invalid_config_is_config_error() {
        let mut config = Config::default();
        config.schedule.interval_hours = 0;

        let err = App::build(config).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[tokio::test]
    async fn test_with_store_wires_components() {
        let app = App::with_store(Config::default(), Arc::new(MemoryLogStore::new())).unwrap();

        assert!(!app.automation.is_cycle_active());
        assert!(!app.scheduler.status().is_running);
        assert_eq!(app.logger.subscriber_count().await, 0);
    }
}
