//! Schema migrations, embedded at compile time from `migrations/`.
//!
//! Files are `NNN_what.sql` and are append-only: a shipped file is never
//! edited, a schema change is a new file.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Brings the schema up to date. Already-applied files are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    debug!(known = MIGRATOR.migrations.len(), "Store schema up to date");
    Ok(())
}

/// `(known, applied)` migration counts. A store that was never migrated
/// reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: Option<i64> = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .ok();

    let applied = applied.and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
    Ok((MIGRATOR.migrations.len(), applied))
}
