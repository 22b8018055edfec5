//! Common test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use seekarr::automation::{Automation, AutomationOptions};
use seekarr::client::{ClientError, ClientFactory, MediaServerClient, ServerRegistry};
use seekarr::config::SharedConfig;
use seekarr::logger::ActivityLogger;
use seekarr::metrics::PrometheusMetrics;
use seekarr::models::{
    Item, LogEntry, LogType, ScheduleConfig, SearchLimits, ServerId, ServerRef, ServerType,
};
use seekarr::storage::MemoryLogStore;

/// Create `n` items titled `{prefix}{i}`
pub fn items(prefix: &str, n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| Item::new(i as i64 + 1, format!("{prefix}{i}")))
        .collect()
}

/// Scripted media server
#[derive(Default)]
pub struct MockClient {
    pub missing: Vec<Item>,
    pub cutoff: Vec<Item>,
    pub fail_detection: bool,
    pub detection_delay: Duration,
    pub search_delay: Duration,
    pub fail_search_ids: HashSet<i64>,
    searches: Mutex<Vec<i64>>,
}

impl MockClient {
    pub fn with_missing(n: usize) -> Self {
        Self {
            missing: items("missing", n),
            ..Default::default()
        }
    }

    pub fn with_lists(missing: usize, cutoff: usize) -> Self {
        Self {
            missing: items("missing", missing),
            cutoff: items("cutoff", cutoff),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_detection: true,
            ..Default::default()
        }
    }

    pub fn detection_delay(mut self, delay: Duration) -> Self {
        self.detection_delay = delay;
        self
    }

    pub fn search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn fail_search(mut self, item_id: i64) -> Self {
        self.fail_search_ids.insert(item_id);
        self
    }

    /// Item ids passed to `trigger_search`, in call order
    pub fn searched(&self) -> Vec<i64> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaServerClient for MockClient {
    async fn get_missing(&self) -> Result<Vec<Item>, ClientError> {
        tokio::time::sleep(self.detection_delay).await;
        if self.fail_detection {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        Ok(self.missing.clone())
    }

    async fn get_cutoff_unmet(&self) -> Result<Vec<Item>, ClientError> {
        if self.fail_detection {
            return Err(ClientError::Http("connection refused".to_string()));
        }
        Ok(self.cutoff.clone())
    }

    async fn trigger_search(&self, item: &Item) -> Result<(), ClientError> {
        tokio::time::sleep(self.search_delay).await;
        self.searches.lock().unwrap().push(item.id);
        if self.fail_search_ids.contains(&item.id) {
            return Err(ClientError::status(500, "command rejected"));
        }
        Ok(())
    }
}

/// Registry and client factory over a fixed set of mock servers
#[derive(Default)]
pub struct MockServers {
    servers: Vec<ServerRef>,
    clients: HashMap<ServerId, Arc<MockClient>>,
}

impl MockServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(
        mut self,
        id: ServerId,
        name: &str,
        server_type: ServerType,
        client: MockClient,
    ) -> Self {
        self.servers.push(ServerRef::new(id, name, server_type));
        self.clients.insert(id, Arc::new(client));
        self
    }

    pub fn radarr(self, id: ServerId, name: &str, client: MockClient) -> Self {
        self.server(id, name, ServerType::Radarr, client)
    }

    pub fn sonarr(self, id: ServerId, name: &str, client: MockClient) -> Self {
        self.server(id, name, ServerType::Sonarr, client)
    }

    pub fn client(&self, id: ServerId) -> Arc<MockClient> {
        self.clients[&id].clone()
    }

    /// Total `trigger_search` calls across all servers
    pub fn total_searches(&self) -> usize {
        self.clients.values().map(|c| c.searched().len()).sum()
    }
}

impl ServerRegistry for MockServers {
    fn list_enabled_servers(&self) -> Vec<ServerRef> {
        let mut servers = self.servers.clone();
        servers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        servers
    }
}

impl ClientFactory for MockServers {
    fn client_for(&self, server: &ServerRef) -> Result<Arc<dyn MediaServerClient>, ClientError> {
        self.clients
            .get(&server.id)
            .map(|c| c.clone() as Arc<dyn MediaServerClient>)
            .ok_or(ClientError::UnknownServer(server.id))
    }
}

/// Everything a test needs to drive and inspect cycles
pub struct Harness {
    pub servers: Arc<MockServers>,
    pub store: Arc<MemoryLogStore>,
    pub logger: Arc<ActivityLogger>,
    pub metrics: Arc<PrometheusMetrics>,
    pub config: SharedConfig,
    pub automation: Arc<Automation>,
}

impl Harness {
    pub fn new(servers: MockServers, limits: SearchLimits) -> Self {
        Self::with_options(servers, limits, ScheduleConfig::default(), AutomationOptions::default())
    }

    pub fn with_options(
        servers: MockServers,
        limits: SearchLimits,
        schedule: ScheduleConfig,
        options: AutomationOptions,
    ) -> Self {
        let servers = Arc::new(servers);
        let store = Arc::new(MemoryLogStore::new());
        let logger = Arc::new(ActivityLogger::new(store.clone()));
        let metrics = Arc::new(PrometheusMetrics::new().unwrap());
        let config = SharedConfig::new(limits, schedule);

        let automation = Automation::builder()
            .registry(servers.clone())
            .client_factory(servers.clone())
            .config(Arc::new(config.clone()))
            .logger(logger.clone())
            .metrics(metrics.clone())
            .options(options)
            .build()
            .unwrap();

        Self {
            servers,
            store,
            logger,
            metrics,
            config,
            automation: Arc::new(automation),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.store.entries()
    }

    pub fn entries_of(&self, log_type: LogType) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.log_type == log_type)
            .collect()
    }
}

/// Limits with only one non-zero category
pub fn only_missing_movies(limit: usize) -> SearchLimits {
    SearchLimits {
        missing_movies: limit,
        missing_episodes: 0,
        cutoff_movies: 0,
        cutoff_episodes: 0,
    }
}
