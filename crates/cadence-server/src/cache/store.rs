//! Summary persistence.
//!
//! Summaries are content-addressed, so a stored entry never needs updating:
//! the same key always maps to a summary of the same tracks. Two backends
//! exist: [`MemoryStore`] for single-process deployments and [`SqliteStore`]
//! for summaries that should survive restarts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ttl::TtlCache;

const SCHEMA_VERSION: i32 = 1;

/// Errors from a summary store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A finished summary as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSummary {
    pub text: String,
    /// Model that produced the text.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl CachedSummary {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Key-value storage for generated summaries.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Look up a live summary.
    async fn get(&self, key: &str) -> StoreResult<Option<CachedSummary>>;

    /// Store a summary for `ttl`.
    async fn put(&self, key: &str, summary: CachedSummary, ttl: Duration) -> StoreResult<()>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Shared handle to a summary store.
pub type SharedStore = Arc<dyn SummaryStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local summary store.
#[derive(Debug)]
pub struct MemoryStore {
    cache: TtlCache<String, CachedSummary>,
}

impl MemoryStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(default_ttl),
        }
    }

    /// Bound the number of stored summaries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.cache = self.cache.with_max_entries(max);
        self
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[async_trait]
impl SummaryStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<CachedSummary>> {
        Ok(self.cache.get(&key.to_string()))
    }

    async fn put(&self, key: &str, summary: CachedSummary, ttl: Duration) -> StoreResult<()> {
        self.cache.insert_with_ttl(key.to_string(), summary, ttl);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// Summary store in a SQLite file.
///
/// Queries run on the blocking pool. Expired rows are ignored on read and
/// deleted whenever a new summary is written.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS summaries (
                     key        TEXT PRIMARY KEY,
                     text       TEXT NOT NULL,
                     model      TEXT NOT NULL,
                     created_at TEXT NOT NULL,
                     expires_at INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_summaries_expires ON summaries(expires_at);",
            )?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&*guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SummaryStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<CachedSummary>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT text, model, created_at FROM summaries
                     WHERE key = ?1 AND expires_at > ?2",
                    params![key, Utc::now().timestamp()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row.map(|(text, model, created_at)| CachedSummary {
                text,
                model,
                created_at: parse_dt(&created_at),
            }))
        })
        .await
    }

    async fn put(&self, key: &str, summary: CachedSummary, ttl: Duration) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().timestamp();
            let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
            conn.execute("DELETE FROM summaries WHERE expires_at <= ?1", params![now])?;
            conn.execute(
                "INSERT OR REPLACE INTO summaries (key, text, model, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key,
                    summary.text,
                    summary.model,
                    summary.created_at.to_rfc3339(),
                    expires_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
