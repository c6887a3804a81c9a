//! # Repository Module
//!
//! SQL lives here and nowhere else.
//!
//! ```text
//! Outbox / SyncOrchestrator
//!      │  store.set_item("docsync.outbox", json)
//!      ▼
//! KeyValueStore for Database (docsync crate)
//!      │  db.kv().set(key, value)
//!      ▼
//! KvRepository ──► kv_store table
//! ```
//!
//! ## Available Repositories
//!
//! - [`kv::KvRepository`] - String key/value rows with timestamps

pub mod kv;
