use docsync::core::Mutation;
use docsync::SyncConfig;
use serde_json::Value;

use crate::commands::common::open_outbox;
use crate::error::CliError;

pub async fn run_queue(
    config: &SyncConfig,
    doc_type: &str,
    doc_key: &str,
    content: Option<&str>,
    delete: bool,
) -> Result<(), CliError> {
    let mutation = build_mutation(config.device_id(), doc_type, doc_key, content, delete)?;
    let id = mutation.id.clone();

    let (db, outbox) = open_outbox(config).await?;
    outbox.add(mutation).await?;
    let pending = outbox.pending_count().await;
    db.close().await;

    println!("Queued {id} ({pending} pending)");
    Ok(())
}

fn build_mutation(
    device_id: &str,
    doc_type: &str,
    doc_key: &str,
    content: Option<&str>,
    delete: bool,
) -> Result<Mutation, CliError> {
    if delete {
        return Ok(Mutation::delete(doc_type, doc_key, device_id));
    }

    let raw = content.unwrap_or("null");
    let content: Value =
        serde_json::from_str(raw).map_err(|e| CliError::InvalidContent(e.to_string()))?;
    Ok(Mutation::upsert(doc_type, doc_key, content, device_id))
}
