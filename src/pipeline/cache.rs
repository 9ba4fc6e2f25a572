//! Content-addressed, persistent store for raw extraction responses.
//!
//! Keyed by `fingerprint(instructions_id, chunk_text)`. Entries have no
//! automatic expiry; `clear` is the operator-level invalidation path. A
//! failure to open the cache is the one startup error allowed to halt the
//! whole pipeline.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// A cached raw response and when it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub payload: String,
    pub created_at: String,
}

/// SQLite-backed extraction cache. The connection is mutex-guarded so the
/// store can be shared across worker tasks; each operation is a single
/// statement and therefore atomic per call.
pub struct ExtractionCache {
    conn: Mutex<Connection>,
}

impl ExtractionCache {
    /// Open (or create) the cache at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Look up a raw response by fingerprint.
    pub fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT payload, created_at FROM extraction_cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CachedResponse {
                        payload: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Store a response unless the key already has one. Returns whether a
    /// row was written. `INSERT OR IGNORE` keeps the write atomic, so two
    /// racing workers can never leave the key with different values.
    pub fn put_if_absent(&self, key: &str, payload: &str) -> Result<bool, CacheError> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let conn = self.conn()?;
        let written = conn.execute(
            "INSERT OR IGNORE INTO extraction_cache (key, payload, created_at)
             VALUES (?1, ?2, ?3)",
            params![key, payload, now],
        )?;
        Ok(written > 0)
    }

    /// Number of cached responses.
    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM extraction_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Drop every cached response. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM extraction_cache", [])?;
        Ok(removed)
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations.
fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_extraction_cache.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running cache migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| CacheError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}
