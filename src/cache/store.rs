//! SQLite-backed expiring cache for key-service query results.
//!
//! Provides a `CacheStore` that persists JSON-encoded values with creation
//! timestamps, invalidates entries on read once they outlive a caller-chosen
//! expiry window, and supports bulk maintenance (expiry sweeps and storage
//! compaction). One async lock serializes every storage operation, so the
//! store behaves as a monitor: a logical operation completes fully before
//! the next begins, even under concurrent callers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Default expiry window for bulk sweeps, in minutes.
pub const DEFAULT_SWEEP_EXPIRY_MINUTES: i64 = 60;

/// Errors raised by cache storage operations.
///
/// Callers treat the cache as best-effort: a failed read counts as a miss
/// and the authoritative source is consulted instead.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing SQLite store failed
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The database file or its directory could not be created
    #[error("cache storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded as JSON
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The value does not serialize to an object, array, string, number,
    /// or boolean
    #[error("cache values must serialize to an object, array, string, number, or boolean")]
    UnsupportedValue,

    /// A stored creation timestamp could not be parsed
    #[error("invalid cache timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
}

/// Durable, expiring key-value cache backed by a single SQLite file.
///
/// The connection is opened and the schema ensured lazily on first use;
/// initialization is idempotent. Entries are keyed by caller-chosen strings
/// and upserts are last-write-wins.
pub struct CacheStore {
    /// Location of the SQLite database file
    path: PathBuf,
    /// Lazily opened connection; the mutex is the store's single
    /// serialization point
    conn: Mutex<Option<Connection>>,
}

impl CacheStore {
    /// Creates a store backed by the SQLite file at `path`.
    ///
    /// The file and its parent directory are created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    /// Returns the platform-conventional database path
    /// (`~/.cache/keywarden/cache.db` on Linux).
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "keywarden")?;
        Some(project_dirs.cache_dir().join("cache.db"))
    }

    /// Opens the database and ensures the schema exists.
    fn open(path: &Path) -> Result<Connection, CacheError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }

    /// Runs `f` against the connection while holding the store lock,
    /// opening the connection first if this is the first operation.
    async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut guard = self.conn.lock().await;
        let conn = match guard.take() {
            Some(conn) => conn,
            None => Self::open(&self.path)?,
        };
        let result = f(&conn);
        *guard = Some(conn);
        result
    }

    /// Reads the value stored under `key`, decoded into `T`.
    ///
    /// Returns `None` when caching is disabled, the key is absent, or the
    /// entry is older than `expiry_minutes`. In the last case the entry is
    /// deleted as a side effect, so a subsequent read misses outright.
    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
        enabled: bool,
        expiry_minutes: i64,
    ) -> Result<Option<T>, CacheError> {
        if !enabled {
            return Ok(None);
        }
        self.with_conn(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT value, created_at FROM cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((value, created_at)) = row else {
                return Ok(None);
            };

            let created_at = DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);
            if Utc::now() - created_at > Duration::minutes(expiry_minutes) {
                conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
                return Ok(None);
            }

            Ok(Some(serde_json::from_str(&value)?))
        })
        .await
    }

    /// Stores `value` under `key`, replacing any previous entry and
    /// refreshing the creation timestamp.
    ///
    /// The value must serialize to a JSON object, array, string, number, or
    /// boolean; anything else is rejected.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let encoded = serde_json::to_value(value)?;
        if encoded.is_null() {
            return Err(CacheError::UnsupportedValue);
        }
        let text = encoded.to_string();
        let created_at = Utc::now().to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache (key, value, created_at) VALUES (?1, ?2, ?3)",
                params![key, text, created_at],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes the entry under `key`. Absence is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    /// Removes every entry.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache", [])?;
            Ok(())
        })
        .await
    }

    /// Removes every entry whose creation timestamp is older than
    /// `expiry_minutes` ago and returns the number removed.
    ///
    /// Intended for periodic maintenance with a more lenient window than
    /// per-read expiry checks use.
    pub async fn sweep_expired(&self, expiry_minutes: i64) -> Result<usize, CacheError> {
        let cutoff = (Utc::now() - Duration::minutes(expiry_minutes)).to_rfc3339();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute("DELETE FROM cache WHERE created_at < ?1", params![cutoff])?)
            })
            .await?;

        if removed > 0 {
            info!("removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Reclaims storage space after deletions by running `VACUUM`.
    ///
    /// Has no effect on the stored data; logs the database size before and
    /// after for observability.
    pub async fn compact(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            let before_kb = Self::size_kb(conn)?;
            conn.execute_batch("VACUUM")?;
            let after_kb = Self::size_kb(conn)?;
            info!(
                "cache database compacted: {:.2}KB -> {:.2}KB (saved {:.2}KB)",
                before_kb,
                after_kb,
                before_kb - after_kb
            );
            Ok(())
        })
        .await
    }

    /// Current database size in kilobytes, from the SQLite page counters.
    fn size_kb(conn: &Connection) -> Result<f64, CacheError> {
        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
        Ok((page_count * page_size) as f64 / 1024.0)
    }
}
