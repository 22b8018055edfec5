//! Configuration management for seekarr
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files, and exposes the resolved values to the
//! automation core through [`ConfigProvider`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::models::{ScheduleConfig, SearchLimits, ServerId, ServerRef, ServerType};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media servers to automate
    pub servers: Vec<ServerConfig>,

    /// Per-category search budget
    pub search: SearchLimits,

    /// Scheduled cycle settings
    pub schedule: ScheduleConfig,

    /// Cycle execution settings
    pub automation: AutomationConfig,

    /// HTTP client settings
    pub client: ClientConfig,

    /// Activity log database
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// One Radarr or Sonarr instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    /// Base URL, e.g. `http://localhost:7878`
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Reference used by the automation core
    pub fn server_ref(&self) -> ServerRef {
        ServerRef {
            id: self.id,
            name: self.name.clone(),
            server_type: self.server_type,
            enabled: self.enabled,
        }
    }
}

/// Cycle execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Per-server detection timeout in seconds
    pub detection_timeout_secs: u64,

    /// Grace period before an active cycle is cancelled on shutdown
    pub shutdown_grace_secs: u64,

    /// Live-tail buffer per subscriber
    pub subscriber_capacity: usize,

    /// Emit one log entry per searched item
    pub log_item_details: bool,

    /// Search commands per second per server
    pub searches_per_second: u32,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            detection_timeout_secs: 15,
            shutdown_grace_secs: 30,
            subscriber_capacity: 100,
            log_item_details: false,
            searches_per_second: 2,
        }
    }
}

impl AutomationConfig {
    #[must_use]
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// HTTP client settings shared by all servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Records requested per page
    pub page_size: usize,

    /// Upper bound on items read per wanted list
    pub max_items_per_list: usize,

    /// Retries for list requests
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            page_size: 250,
            max_items_per_list: 1000,
            max_retries: 2,
            user_agent: format!("seekarr/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/seekarr.db"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            search: SearchLimits::default(),
            schedule: ScheduleConfig::default(),
            automation: AutomationConfig::default(),
            client: ClientConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Servers are read from `SEEKARR_RADARR_URL`/`SEEKARR_RADARR_API_KEY` and
    /// `SEEKARR_SONARR_URL`/`SEEKARR_SONARR_API_KEY` (one of each at most).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let mut next_id: ServerId = 1;
        for server_type in ServerType::all() {
            let prefix = format!("SEEKARR_{}", server_type.as_str().to_uppercase());
            if let Ok(url) = std::env::var(format!("{prefix}_URL")) {
                let api_key = std::env::var(format!("{prefix}_API_KEY"))
                    .with_context(|| format!("{prefix}_URL is set but {prefix}_API_KEY is not"))?;
                let name = std::env::var(format!("{prefix}_NAME"))
                    .unwrap_or_else(|_| format!("{}1", capitalize(server_type.as_str())));
                config.servers.push(ServerConfig {
                    id: next_id,
                    name,
                    server_type,
                    url,
                    api_key,
                    enabled: true,
                });
                next_id += 1;
            }
        }

        let search = &mut config.search;
        if let Some(v) = env_parse("SEEKARR_MISSING_MOVIES_LIMIT") {
            search.missing_movies = v;
        }
        if let Some(v) = env_parse("SEEKARR_MISSING_EPISODES_LIMIT") {
            search.missing_episodes = v;
        }
        if let Some(v) = env_parse("SEEKARR_CUTOFF_MOVIES_LIMIT") {
            search.cutoff_movies = v;
        }
        if let Some(v) = env_parse("SEEKARR_CUTOFF_EPISODES_LIMIT") {
            search.cutoff_episodes = v;
        }

        if let Some(v) = env_parse("SEEKARR_INTERVAL_HOURS") {
            config.schedule.interval_hours = v;
        }
        if let Some(v) = env_parse("SEEKARR_SCHEDULE_ENABLED") {
            config.schedule.enabled = v;
        }

        if let Some(v) = env_parse("SEEKARR_DETECTION_TIMEOUT") {
            config.automation.detection_timeout_secs = v;
        }
        if let Some(v) = env_parse("SEEKARR_SHUTDOWN_GRACE") {
            config.automation.shutdown_grace_secs = v;
        }
        if let Some(v) = env_parse("SEEKARR_LOG_ITEM_DETAILS") {
            config.automation.log_item_details = v;
        }

        if let Some(v) = env_parse("SEEKARR_REQUEST_TIMEOUT") {
            config.client.request_timeout_secs = v;
        }

        if let Ok(path) = std::env::var("SEEKARR_SQLITE_PATH") {
            config.database.sqlite_path = path.into();
        }

        if let Ok(level) = std::env::var("SEEKARR_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("SEEKARR_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.schedule.interval_hours == 0 {
            anyhow::bail!("schedule.interval_hours must be greater than 0");
        }

        if self.automation.detection_timeout_secs == 0 {
            anyhow::bail!("automation.detection_timeout_secs must be greater than 0");
        }

        if self.automation.subscriber_capacity == 0 {
            anyhow::bail!("automation.subscriber_capacity must be greater than 0");
        }

        if self.automation.searches_per_second == 0 {
            anyhow::bail!("automation.searches_per_second must be greater than 0");
        }

        if self.client.request_timeout_secs == 0 {
            anyhow::bail!("client.request_timeout_secs must be greater than 0");
        }

        if self.client.page_size == 0 {
            anyhow::bail!("client.page_size must be greater than 0");
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for server in &self.servers {
            if !ids.insert(server.id) {
                anyhow::bail!("duplicate server id {}", server.id);
            }
            if !names.insert(server.name.as_str()) {
                anyhow::bail!("duplicate server name '{}'", server.name);
            }
            if server.name.trim().is_empty() {
                anyhow::bail!("server {} has an empty name", server.id);
            }
            if server.api_key.trim().is_empty() {
                anyhow::bail!("server '{}' has an empty api_key", server.name);
            }
            url::Url::parse(&server.url)
                .with_context(|| format!("server '{}' has an invalid url", server.name))?;
        }

        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Config Provider
// ============================================================================

/// Source of the per-cycle configuration the automation core reads
pub trait ConfigProvider: Send + Sync {
    /// Search budget for the next cycle
    fn search_limits(&self) -> SearchLimits;

    /// Current schedule settings
    fn schedule_config(&self) -> ScheduleConfig;
}

/// Thread-safe, replaceable view of the limits and schedule sections
///
/// Each read returns a fully resolved copy so a cycle never observes a
/// half-applied update.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<(SearchLimits, ScheduleConfig)>>,
}

impl SharedConfig {
    pub fn new(search: SearchLimits, schedule: ScheduleConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new((search, schedule))),
        }
    }

    /// Build from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.search, config.schedule)
    }

    /// Replace the search limits
    pub fn set_search_limits(&self, limits: SearchLimits) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .0 = limits;
    }

    /// Replace the schedule settings
    pub fn set_schedule(&self, schedule: ScheduleConfig) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .1 = schedule;
    }
}

impl ConfigProvider for SharedConfig {
    fn search_limits(&self) -> SearchLimits {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .0
    }

    fn schedule_config(&self) -> ScheduleConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: ServerId, name: &str, server_type: ServerType) -> ServerConfig {
        ServerConfig {
            id,
            name: name.to_string(),
            server_type,
            url: "http://localhost:7878".to_string(),
            api_key: "secret".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.missing_movies, 10);
        assert_eq!(config.schedule.interval_hours, 6);
        assert_eq!(config.automation.detection_timeout_secs, 15);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.schedule.interval_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_servers_rejected() {
        let mut config = Config::default();
        config.servers = vec![
            server(1, "Radarr1", ServerType::Radarr),
            server(1, "Radarr2", ServerType::Radarr),
        ];
        assert!(config.validate().is_err());

        config.servers = vec![
            server(1, "Radarr1", ServerType::Radarr),
            server(2, "Radarr1", ServerType::Radarr),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = Config::default();
        let mut bad = server(1, "Radarr1", ServerType::Radarr);
        bad.url = "not a url".to_string();
        config.servers = vec![bad];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            [search]
            missing_movies = 3
            missing_episodes = 4
            cutoff_movies = 1
            cutoff_episodes = 2

            [schedule]
            interval_hours = 12
            enabled = false

            [[servers]]
            id = 1
            name = "Radarr1"
            type = "radarr"
            url = "http://radarr:7878"
            api_key = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.search.missing_episodes, 4);
        assert_eq!(config.schedule.interval_hours, 12);
        assert!(!config.schedule.enabled);
        assert_eq!(config.servers.len(), 1);
        assert!(config.servers[0].enabled);
        assert_eq!(config.servers[0].server_type, ServerType::Radarr);
        assert_eq!(config.automation.shutdown_grace_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_config_updates() {
        let shared = SharedConfig::new(SearchLimits::default(), ScheduleConfig::default());
        let view = shared.clone();

        shared.set_search_limits(SearchLimits::uniform(1));
        shared.set_schedule(ScheduleConfig {
            interval_hours: 2,
            enabled: false,
        });

        assert_eq!(view.search_limits(), SearchLimits::uniform(1));
        assert!(!view.schedule_config().enabled);
        assert_eq!(view.schedule_config().interval_hours, 2);
    }

    #[test]
    fn test_timeout_conversions() {
        let config = Config::default();
        assert_eq!(config.automation.detection_timeout(), Duration::from_secs(15));
        assert_eq!(config.client.request_timeout(), Duration::from_secs(30));
    }
}
