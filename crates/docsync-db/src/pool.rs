//! # Store Handle
//!
//! Opens the SQLite file that backs the outbox snapshot and pull checkpoint.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          docsync store                                  │
//! │                                                                         │
//! │  DbConfig::new(path)      DbConfig::in_memory()                         │
//! │        │                        │                                       │
//! │        └──────────┬─────────────┘                                       │
//! │                   ▼                                                     │
//! │  Database::new(config)                                                  │
//! │     ├── mkdir -p parent         (file only)                             │
//! │     ├── WAL + synchronous=NORMAL (file only)                            │
//! │     ├── SqlitePool              (pool_size connections)                 │
//! │     └── migrations::run_migrations (unless disabled)                    │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │  db.kv() ──► KvRepository  "docsync.outbox" / "docsync.checkpoint"      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! File-backed stores use WAL so `docsync status` can read while
//! `docsync watch` writes. `:memory:` gives every connection its own
//! database, so the in-memory pool holds exactly one connection forever.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::kv::KvRepository;

/// Connections recycle after this long so WAL checkpoints can complete.
const FILE_CONNECTION_LIFETIME: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// How to open the store.
///
/// ```rust,ignore
/// let config = DbConfig::new(data_dir.join("docsync.db")).pool_size(2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,
    /// Upper bound on open connections. Defaults to 4 for files.
    pub pool_size: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    /// Idle connections above the first are closed after this long.
    pub idle_timeout: Option<Duration>,
    /// Apply pending schema migrations while opening.
    pub migrate: bool,
}

impl DbConfig {
    /// A file-backed store. Missing parent directories are created on open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            pool_size: 4,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            migrate: true,
        }
    }

    /// A throwaway store for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            pool_size: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            migrate: true,
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn migrate(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == DbLocation::Memory
    }

    /// Human-readable location for logs.
    pub fn describe(&self) -> String {
        match &self.location {
            DbLocation::File(path) => path.display().to_string(),
            DbLocation::Memory => ":memory:".to_string(),
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        match &self.location {
            DbLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string())),
            DbLocation::File(path) => Ok(SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)),
        }
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let lifetime = match self.location {
            DbLocation::Memory => None,
            DbLocation::File(_) => Some(FILE_CONNECTION_LIFETIME),
        };

        SqlitePoolOptions::new()
            .max_connections(self.pool_size)
            .min_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(lifetime)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Open store. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the store described by `config`, creating it if needed.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(location = %config.describe(), "Opening docsync store");

        if let DbLocation::File(path) = &config.location {
            ensure_parent_dir(path).await?;
        }

        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(pool_size = config.pool_size, "Store pool ready");

        let db = Database { pool };
        if config.migrate {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Key/value access for the engine's persisted state.
    pub fn kv(&self) -> KvRepository {
        KvRepository::new(self.pool.clone())
    }

    /// Drains and closes every connection. Later calls on any clone fail.
    pub async fn close(&self) {
        debug!("Closing docsync store");
        self.pool.close().await;
    }

    /// True while the store answers queries.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

async fn ensure_parent_dir(path: &Path) -> DbResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("{}: {e}", parent.display()))),
        _ => Ok(()),
    }
}
