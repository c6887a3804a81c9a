//! # Durable Key/Value Storage
//!
//! The engine persists exactly two values: the outbox snapshot and the pull
//! checkpoint. Anything that can get/set/remove strings by key can host
//! them.
//!
//! ```text
//! ┌──────────────┐   set_item("docsync.outbox", json)   ┌────────────────────┐
//! │   Outbox     │ ───────────────────────────────────► │  KeyValueStore     │
//! └──────────────┘                                      │                    │
//! ┌──────────────┐   set_item("docsync.checkpoint", ts) │  MemoryStore       │
//! │ Orchestrator │ ───────────────────────────────────► │  docsync_db::      │
//! └──────────────┘                                      │    Database        │
//!                                                       └────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::SyncResult;

/// Storage key of the serialized outbox queue.
pub const OUTBOX_KEY: &str = "docsync.outbox";

/// Storage key of the pull checkpoint (RFC 3339 server time).
pub const CHECKPOINT_KEY: &str = "docsync.checkpoint";

/// Async string key/value store.
///
/// Implementations must make a completed `set_item` visible to every later
/// `get_item`, including after a process restart for durable backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value under `key`, if present.
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removes `key`. Missing keys are not an error.
    async fn remove_item(&self, key: &str) -> SyncResult<()>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> SyncResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// SQLite
// =============================================================================

#[async_trait]
impl KeyValueStore for docsync_db::Database {
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.kv().get(key).await?)
    }

    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        Ok(self.kv().set(key, value).await?)
    }

    async fn remove_item(&self, key: &str) -> SyncResult<()> {
        self.kv().remove(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_db::{Database, DbConfig};

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get_item(OUTBOX_KEY).await.unwrap(), None);

        store.set_item(OUTBOX_KEY, "[]").await.unwrap();
        store.set_item(OUTBOX_KEY, "[1]").await.unwrap();
        assert_eq!(
            store.get_item(OUTBOX_KEY).await.unwrap().as_deref(),
            Some("[1]")
        );

        store.remove_item(OUTBOX_KEY).await.unwrap();
        store.remove_item(OUTBOX_KEY).await.unwrap();
        assert_eq!(store.get_item(OUTBOX_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        exercise(&db).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_closed_pool_is_storage_error() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        let err = db.set_item(CHECKPOINT_KEY, "x").await.unwrap_err();
        assert!(err.is_storage_error());
    }
}
