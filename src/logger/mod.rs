//! Activity logger with live-tail broadcasting
//!
//! Every entry is persisted to the [`LogStore`] first and only then offered to
//! live subscribers. Each subscriber owns a bounded channel; a subscriber that
//! falls behind loses entries from its live tail but never blocks the
//! producer, and the persisted record stays complete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use crate::models::LogEntry;
use crate::storage::{LogStore, StorageResult};

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Identifier returned by [`ActivityLogger::subscribe`]
pub type SubscriptionId = u64;

/// A live-tail registration
///
/// The receiver yields entries until [`ActivityLogger::unsubscribe`] is called
/// with [`LogSubscription::id`], after which `recv()` drains what is buffered
/// and then returns `None`.
#[derive(Debug)]
pub struct LogSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<LogEntry>,
}

impl LogSubscription {
    /// Receive the next entry
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.receiver.recv().await
    }
}

/// Broadcast statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Entries persisted
    pub persisted: u64,
    /// Entries delivered into subscriber channels
    pub delivered: u64,
    /// Entries dropped because a subscriber channel was full
    pub dropped: u64,
}

/// Durable activity log with non-blocking fan-out
pub struct ActivityLogger {
    store: Arc<dyn LogStore>,
    subscribers: RwLock<HashMap<SubscriptionId, mpsc::Sender<LogEntry>>>,
    next_id: AtomicU64,
    capacity: usize,
    persisted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ActivityLogger {
    /// Create a logger with the default subscriber capacity
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self::with_capacity(store, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a logger with a custom per-subscriber capacity (minimum 1)
    pub fn with_capacity(store: Arc<dyn LogStore>, capacity: usize) -> Self {
        Self {
            store,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            persisted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Persist an entry, then offer it to every live subscriber
    ///
    /// Returns the storage error without broadcasting when persistence fails.
    pub async fn add_log(&self, entry: LogEntry) -> StorageResult<()> {
        self.store.append(&entry).await?;
        self.persisted.fetch_add(1, Ordering::Relaxed);

        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                match tx.try_send(entry.clone()) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(subscriber = id, "Live-tail channel full, entry dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                subscribers.remove(&id);
                tracing::debug!(subscriber = id, "Pruned closed live-tail subscriber");
            }
        }

        Ok(())
    }

    /// Register a new live-tail subscriber
    pub async fn subscribe(&self) -> LogSubscription {
        let (tx, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber = id, "Live-tail subscriber registered");
        LogSubscription { id, receiver }
    }

    /// Deregister a subscriber and close its channel
    ///
    /// Returns `false` if the id was not registered.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "Live-tail subscriber removed");
        }
        removed
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Most recent persisted entries, newest first
    pub async fn recent(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.store.recent(limit).await
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            persisted: self.persisted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ActivityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLogger")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
