// Core data structures for seekarr automation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::detector::DetectionError;

/// Identifier of a configured media server
pub type ServerId = i64;

// ============================================================================
// Servers
// ============================================================================

/// Kind of media server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Movie library
    Radarr,
    /// Series library
    Sonarr,
}

impl ServerType {
    /// Get all server types
    pub fn all() -> Vec<Self> {
        vec![Self::Radarr, Self::Sonarr]
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radarr => "radarr",
            Self::Sonarr => "sonarr",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "radarr" | "movies" => Some(Self::Radarr),
            "sonarr" | "series" | "episodes" => Some(Self::Sonarr),
            _ => None,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown server type: {s}"))
    }
}

/// Reference to a media server as seen by the automation core
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerRef {
    pub id: ServerId,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub enabled: bool,
}

impl ServerRef {
    /// Create an enabled server reference
    pub fn new(id: ServerId, name: impl Into<String>, server_type: ServerType) -> Self {
        Self {
            id,
            name: name.into(),
            server_type,
            enabled: true,
        }
    }

    /// Mark the server as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this server feeds the given category
    pub fn serves(&self, category: Category) -> bool {
        self.server_type == category.server_type()
    }
}

impl fmt::Display for ServerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}#{})", self.name, self.server_type, self.id)
    }
}

/// A movie or episode that can be searched for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Radarr movie id or Sonarr episode id
    pub id: i64,
    pub title: String,
}

impl Item {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Independently limited search class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    MissingMovies,
    MissingEpisodes,
    CutoffMovies,
    CutoffEpisodes,
}

impl Category {
    /// All categories in processing order
    pub const ALL: [Category; 4] = [
        Self::MissingMovies,
        Self::MissingEpisodes,
        Self::CutoffMovies,
        Self::CutoffEpisodes,
    ];

    /// Server type this category routes to
    pub fn server_type(&self) -> ServerType {
        match self {
            Self::MissingMovies | Self::CutoffMovies => ServerType::Radarr,
            Self::MissingEpisodes | Self::CutoffEpisodes => ServerType::Sonarr,
        }
    }

    /// Whether the category draws from the missing list (otherwise cutoff unmet)
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingMovies | Self::MissingEpisodes)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingMovies => "missingMovies",
            Self::MissingEpisodes => "missingEpisodes",
            Self::CutoffMovies => "cutoffMovies",
            Self::CutoffEpisodes => "cutoffEpisodes",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingMovies => "missing movies",
            Self::MissingEpisodes => "missing episodes",
            Self::CutoffMovies => "cutoff unmet movies",
            Self::CutoffEpisodes => "cutoff unmet episodes",
        }
    }

    /// Create from string (camelCase or snake_case)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "").as_str() {
            "missingmovies" => Some(Self::MissingMovies),
            "missingepisodes" => Some(Self::MissingEpisodes),
            "cutoffmovies" => Some(Self::CutoffMovies),
            "cutoffepisodes" => Some(Self::CutoffEpisodes),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown category: {s}"))
    }
}

/// Per-category search budget for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLimits {
    pub missing_movies: usize,
    pub missing_episodes: usize,
    pub cutoff_movies: usize,
    pub cutoff_episodes: usize,
}

impl SearchLimits {
    /// Limit configured for a category
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::MissingMovies => self.missing_movies,
            Category::MissingEpisodes => self.missing_episodes,
            Category::CutoffMovies => self.cutoff_movies,
            Category::CutoffEpisodes => self.cutoff_episodes,
        }
    }

    /// Same limit for every category
    pub fn uniform(limit: usize) -> Self {
        Self {
            missing_movies: limit,
            missing_episodes: limit,
            cutoff_movies: limit,
            cutoff_episodes: limit,
        }
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            missing_movies: 10,
            missing_episodes: 10,
            cutoff_movies: 5,
            cutoff_episodes: 5,
        }
    }
}

/// Timer settings for scheduled cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub interval_hours: u32,
    pub enabled: bool,
}

impl ScheduleConfig {
    /// Interval between scheduled ticks
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.interval_hours) * 3600)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            enabled: true,
        }
    }
}

// ============================================================================
// Cycle data
// ============================================================================

/// Outcome of polling one server during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    pub server: ServerRef,
    pub missing_items: Vec<Item>,
    pub cutoff_items: Vec<Item>,
    pub error: Option<DetectionError>,
}

impl DetectionResult {
    /// Successful poll
    pub fn success(server: ServerRef, missing_items: Vec<Item>, cutoff_items: Vec<Item>) -> Self {
        Self {
            server,
            missing_items,
            cutoff_items,
            error: None,
        }
    }

    /// Failed poll; contributes no candidates
    pub fn failure(server: ServerRef, error: DetectionError) -> Self {
        Self {
            server,
            missing_items: Vec::new(),
            cutoff_items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Candidates this server offers for a category
    pub fn candidates(&self, category: Category) -> &[Item] {
        if self.error.is_some() || !self.server.serves(category) {
            return &[];
        }
        if category.is_missing() {
            &self.missing_items
        } else {
            &self.cutoff_items
        }
    }
}

/// One planned or executed search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub category: Category,
    pub server: ServerRef,
    pub item: Item,
}

/// Per-category totals for a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub assigned: usize,
    pub triggered: usize,
    pub failed: usize,
}

/// Summary of a finished cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub is_manual: bool,
    pub is_dry_run: bool,
    pub per_category_counts: BTreeMap<Category, CategoryCount>,
    pub total_triggered: usize,
    pub total_failed: usize,
    /// Shutdown cancelled the cycle before it finished
    pub cancelled: bool,
}

impl CycleResult {
    /// Counts for one category (zero when the category produced nothing)
    pub fn count(&self, category: Category) -> CategoryCount {
        self.per_category_counts
            .get(&category)
            .copied()
            .unwrap_or_default()
    }
}

/// Snapshot of scheduler state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub is_cycle_active: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub interval_hours: u32,
}

// ============================================================================
// Activity log
// ============================================================================

/// Kind of activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    CycleStart,
    CycleEnd,
    Search,
    Error,
    Skipped,
    Info,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleStart => "cycle_start",
            Self::CycleEnd => "cycle_end",
            Self::Search => "search",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cycle_start" => Some(Self::CycleStart),
            "cycle_end" => Some(Self::CycleEnd),
            "search" => Some(Self::Search),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub server_name: Option<String>,
    pub server_type: Option<ServerType>,
    pub category: Option<Category>,
    pub count: Option<usize>,
    pub message: String,
    pub is_manual: bool,
}

impl LogEntry {
    /// Create a new entry stamped with a fresh id and the current time
    pub fn new(log_type: LogType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            log_type,
            server_name: None,
            server_type: None,
            category: None,
            count: None,
            message: message.into(),
            is_manual: false,
        }
    }

    /// Attach server context
    pub fn with_server(mut self, server: &ServerRef) -> Self {
        self.server_name = Some(server.name.clone());
        self.server_type = Some(server.server_type);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn manual(mut self, is_manual: bool) -> Self {
        self.is_manual = is_manual;
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.log_type
        )?;
        if let Some(server) = &self.server_name {
            write!(f, " {server}")?;
        }
        if let Some(category) = self.category {
            write!(f, " {category}")?;
        }
        if let Some(count) = self.count {
            write!(f, " ({count})")?;
        }
        write!(f, " {}", self.message)
    }
}
