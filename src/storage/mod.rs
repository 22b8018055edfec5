//! Activity log persistence
//!
//! The activity log is the source of truth for what each cycle did. Storage
//! is abstracted behind [`LogStore`] so the logger can be tested against
//! [`MemoryLogStore`] and run against [`SqliteLogStore`] in production.
//!
//! ```text
//! ┌──────────────────┐      append       ┌──────────────────┐
//! │  ActivityLogger  │ ────────────────▶ │     LogStore     │
//! └──────────────────┘                   └────────┬─────────┘
//!                                   ┌─────────────┴─────────────┐
//!                                   ▼                           ▼
//!                          ┌─────────────────┐        ┌─────────────────┐
//!                          │ SqliteLogStore  │        │ MemoryLogStore  │
//!                          └─────────────────┘        └─────────────────┘
//! ```

mod sqlite;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::LogEntry;

pub use sqlite::SqliteLogStore;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by log stores
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Row could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store cannot accept writes
    #[error("Log store unavailable: {0}")]
    Unavailable(String),

    /// Blocking task failed
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Filesystem error while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Durable append-only store for activity entries
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist one entry
    async fn append(&self, entry: &LogEntry) -> StorageResult<()>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: usize) -> StorageResult<Vec<LogEntry>>;

    /// Total number of stored entries
    async fn count(&self) -> StorageResult<usize>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Vector-backed store for tests and ephemeral runs
///
/// Can be switched into a failing mode to simulate an unwritable store.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: Mutex<Vec<LogEntry>>,
    failing: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: &LogEntry) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("memory store is read-only"));
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogType;

    #[tokio::test]
    async fn test_memory_store_append_and_recent() {
        let store = MemoryLogStore::new();
        for i in 0..5 {
            store
                .append(&LogEntry::new(LogType::Info, format!("entry {i}")))
                .await
                .unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 5);

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "entry 4");
        assert_eq!(recent[1].message, "entry 3");
    }

    #[tokio::test]
    async fn test_memory_store_failing_mode() {
        let store = MemoryLogStore::new();
        store.set_failing(true);

        let result = store.append(&LogEntry::new(LogType::Info, "lost")).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.count().await.unwrap(), 0);

        store.set_failing(false);
        store
            .append(&LogEntry::new(LogType::Info, "kept"))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
