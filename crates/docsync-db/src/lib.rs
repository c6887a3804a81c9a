//! # docsync-db
//!
//! SQLite home for the two values the sync engine must keep across
//! restarts: the outbox snapshot and the pull checkpoint.
//!
//! ```text
//!   docsync::KeyValueStore  (get_item / set_item / remove_item)
//!             │
//!             ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │ Database (pool.rs)                                   │
//!   │   └─ kv() ──► KvRepository (repository/kv.rs)        │
//!   │                  └─ table kv_store(key, value, ts)   │
//!   │ migrations.rs ── 001_kv_store.sql (embedded)         │
//!   └──────────────────────────────────────────────────────┘
//!             │
//!             ▼
//!   <data dir>/docsync.db   (WAL)
//! ```
//!
//! ```rust,ignore
//! use docsync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("docsync.db")).await?;
//! db.kv().set("docsync.checkpoint", "2024-05-01T12:00:00Z").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};
pub use repository::kv::KvRepository;
