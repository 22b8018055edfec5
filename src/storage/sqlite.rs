//! SQLite-backed activity log

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{LogStore, StorageError, StorageResult};
use crate::models::{Category, LogEntry, LogType, ServerType};

/// SQLite implementation of [`LogStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection. Writes run
/// on the blocking pool so the async runtime is never stalled by disk I/O.
pub struct SqliteLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogStore {
    /// Open (or create) a log database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite log store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::unavailable("connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn create_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS activity_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                log_type TEXT NOT NULL,
                server_name TEXT,
                server_type TEXT,
                category TEXT,
                count INTEGER,
                message TEXT NOT NULL,
                is_manual INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp
                ON activity_log(timestamp);

            CREATE INDEX IF NOT EXISTS idx_activity_log_type
                ON activity_log(log_type);
            "#,
    )?;
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        log_type: row.get(2)?,
        server_name: row.get(3)?,
        server_type: row.get(4)?,
        category: row.get(5)?,
        count: row.get(6)?,
        message: row.get(7)?,
        is_manual: row.get(8)?,
    })
}

struct RawRow {
    id: String,
    timestamp: String,
    log_type: String,
    server_name: Option<String>,
    server_type: Option<String>,
    category: Option<String>,
    count: Option<i64>,
    message: String,
    is_manual: bool,
}

impl RawRow {
    fn into_entry(self) -> StorageResult<LogEntry> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::Serialization(format!("bad id '{}': {e}", self.id)))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::Serialization(format!("bad timestamp: {e}")))?;
        let log_type = LogType::parse(&self.log_type).ok_or_else(|| {
            StorageError::Serialization(format!("unknown log type '{}'", self.log_type))
        })?;

        Ok(LogEntry {
            id,
            timestamp,
            log_type,
            server_name: self.server_name,
            server_type: self.server_type.as_deref().and_then(ServerType::parse),
            category: self.category.as_deref().and_then(Category::parse),
            count: self.count.map(|c| c.max(0) as usize),
            message: self.message,
            is_manual: self.is_manual,
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, entry: &LogEntry) -> StorageResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                    INSERT INTO activity_log
                        (id, timestamp, log_type, server_name, server_type,
                         category, count, message, is_manual)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                params![
                    entry.id.to_string(),
                    entry.timestamp.to_rfc3339(),
                    entry.log_type.as_str(),
                    entry.server_name,
                    entry.server_type.map(|t| t.as_str()),
                    entry.category.map(|c| c.as_str()),
                    entry.count.map(|c| c as i64),
                    entry.message,
                    entry.is_manual,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, log_type, server_name, server_type,
                        category, count, message, is_manual
                 FROM activity_log ORDER BY seq DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawRow::into_entry).collect()
        })
        .await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM activity_log", [], |row| row.get(0))?;
            Ok(total as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerRef;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_append_and_read_back() {
        let store = SqliteLogStore::in_memory().unwrap();
        let server = ServerRef::new(1, "Radarr1", ServerType::Radarr);

        let entry = LogEntry::new(LogType::Search, "Triggered 5 searches")
            .with_server(&server)
            .with_category(Category::MissingMovies)
            .with_count(5)
            .manual(true);
        store.append(&entry).await.unwrap();

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);

        let read = &recent[0];
        assert_eq!(read.id, entry.id);
        assert_eq!(read.log_type, LogType::Search);
        assert_eq!(read.server_name.as_deref(), Some("Radarr1"));
        assert_eq!(read.server_type, Some(ServerType::Radarr));
        assert_eq!(read.category, Some(Category::MissingMovies));
        assert_eq!(read.count, Some(5));
        assert!(read.is_manual);
    }

    #[tokio::test]
    async fn test_sqlite_recent_is_newest_first() {
        let store = SqliteLogStore::in_memory().unwrap();
        for i in 0..3 {
            store
                .append(&LogEntry::new(LogType::Info, format!("entry {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent[0].message, "entry 2");
        assert_eq!(recent[1].message, "entry 1");
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_file_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("activity.db");

        {
            let store = SqliteLogStore::open(&path).unwrap();
            store
                .append(&LogEntry::new(LogType::CycleStart, "Cycle started"))
                .await
                .unwrap();
        }

        let reopened = SqliteLogStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_id_rejected() {
        let store = SqliteLogStore::in_memory().unwrap();
        let entry = LogEntry::new(LogType::Info, "once");

        store.append(&entry).await.unwrap();
        let result = store.append(&entry).await;
        assert!(matches!(result, Err(StorageError::Sqlite(_))));
    }
}
