//! # Key/Value Repository
//!
//! One row per key in `kv_store`. Writes are upserts so the outbox can
//! overwrite its snapshot on every change without a read first.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository over the `kv_store` table.
#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    /// Creates a new KvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Returns the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339();

        debug!(key = %key, bytes = value.len(), "Writing kv entry");

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes `key`. Returns whether a row was removed.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists keys starting with `prefix`, sorted.
    #[cfg(test)]
    pub(crate) async fn keys(&self, prefix: &str) -> DbResult<Vec<String>> {
        let pattern = format!("{}%", escape_like(prefix));

        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv_store WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key ASC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Counts stored keys.
    #[cfg(test)]
    pub(crate) async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let db = db().await;
        assert_eq!(db.kv().get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = db().await;
        let kv = db.kv();

        kv.set("docsync.checkpoint", "a").await.unwrap();
        kv.set("docsync.checkpoint", "b").await.unwrap();

        assert_eq!(kv.get("docsync.checkpoint").await.unwrap().as_deref(), Some("b"));
        assert_eq!(kv.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let db = db().await;
        let kv = db.kv();

        kv.set("k", "v").await.unwrap();
        assert!(kv.remove("k").await.unwrap());
        assert!(!kv.remove("k").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let db = db().await;
        let kv = db.kv();

        kv.set("docsync.outbox", "[]").await.unwrap();
        kv.set("docsync.checkpoint", "x").await.unwrap();
        kv.set("docsync_other", "y").await.unwrap();
        kv.set("app.theme", "dark").await.unwrap();

        let keys = kv.keys("docsync.").await.unwrap();
        assert_eq!(keys, vec!["docsync.checkpoint", "docsync.outbox"]);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            db.kv().set("docsync.outbox", "[1]").await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(
            db.kv().get("docsync.outbox").await.unwrap().as_deref(),
            Some("[1]")
        );
    }
}
