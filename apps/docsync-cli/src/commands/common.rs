use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docsync::core::OutboxItem;
use docsync::{
    Conflict, HttpTransport, KeyValueStore, NetworkStatusProbe, Outbox, SyncConfig, SyncError,
    SyncOrchestrator, TracingListener, CHECKPOINT_KEY,
};
use docsync_db::{Database, DbConfig};
use tracing::{debug, info};

use crate::error::CliError;

/// Loads config from file and environment; `--db-path` wins over both.
pub fn load_config(
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> Result<SyncConfig, CliError> {
    let mut config = SyncConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.storage.db_path = Some(path);
    }
    Ok(config)
}

pub async fn open_database(config: &SyncConfig) -> Result<Arc<Database>, CliError> {
    let path = config.db_path()?;
    debug!(?path, "Opening local database");
    Ok(Arc::new(Database::new(DbConfig::new(path)).await?))
}

/// Opens the outbox directly, without a transport.
pub async fn open_outbox(config: &SyncConfig) -> Result<(Arc<Database>, Outbox), CliError> {
    let db = open_database(config).await?;
    let outbox = Outbox::open(db.clone(), config.retry_policy()).await?;
    Ok((db, outbox))
}

/// Builds the full engine over HTTP, logging every event.
pub async fn open_engine(
    config: &SyncConfig,
    probe: Option<Arc<dyn NetworkStatusProbe>>,
) -> Result<(Arc<Database>, Arc<SyncOrchestrator>), CliError> {
    if config.server_url().is_none() {
        return Err(CliError::ServerNotConfigured);
    }

    let db = open_database(config).await?;
    let transport = HttpTransport::from_config(config)?;

    let mut builder = SyncOrchestrator::builder()
        .config(config)
        .transport(Arc::new(transport))
        .store(db.clone())
        .conflict_handler(Arc::new(log_conflicts));
    if let Some(probe) = probe {
        builder = builder.probe(probe);
    }

    let orchestrator = builder.build().await?;
    orchestrator.subscribe(Arc::new(TracingListener));
    Ok((db, orchestrator))
}

fn log_conflicts(conflicts: &[Conflict]) {
    for conflict in conflicts {
        let winner = if conflict.local_won() { "local" } else { "server" };
        info!(
            id = %conflict.local.id,
            doc_type = %conflict.local.doc_type,
            doc_key = %conflict.local.doc_key,
            winner,
            "Conflict resolved by last-writer-wins"
        );
    }
}

pub async fn read_checkpoint(
    store: &dyn KeyValueStore,
) -> Result<Option<DateTime<Utc>>, CliError> {
    let Some(raw) = store.get_item(CHECKPOINT_KEY).await? else {
        return Ok(None);
    };

    let at = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| SyncError::CorruptState {
        key: CHECKPOINT_KEY.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(at.with_timezone(&Utc)))
}

/// One line per item: `id  operation type/key  retries=n [gave up]`.
pub fn format_outbox_line(item: &OutboxItem, exhausted: bool) -> String {
    let mutation = &item.mutation;
    let mut line = format!(
        "{}  {:<6} {}/{}  retries={}",
        mutation.id,
        mutation.operation.to_string(),
        mutation.doc_type,
        mutation.doc_key,
        item.retry_count()
    );
    if exhausted {
        line.push_str("  [gave up]");
    }
    line
}
