use docsync::core::OutboxItem;
use docsync::SyncConfig;
use serde::Serialize;

use crate::commands::common::{format_outbox_line, open_outbox};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboxEntry {
    #[serde(flatten)]
    item: OutboxItem,
    gave_up: bool,
}

pub async fn run_outbox(config: &SyncConfig, as_json: bool) -> Result<(), CliError> {
    let (db, outbox) = open_outbox(config).await?;
    let entries: Vec<OutboxEntry> = outbox
        .items()
        .await
        .into_iter()
        .map(|item| OutboxEntry {
            gave_up: !outbox.should_retry(&item),
            item,
        })
        .collect();
    db.close().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format_outbox_line(&entry.item, entry.gave_up));
    }
    Ok(())
}

pub async fn run_requeue(config: &SyncConfig, id: &str) -> Result<(), CliError> {
    let (db, outbox) = open_outbox(config).await?;
    let result = outbox.requeue(id).await;
    db.close().await;

    result?;
    println!("Requeued {id}; it will be sent on the next sync");
    Ok(())
}

pub async fn run_discard(config: &SyncConfig, id: &str) -> Result<(), CliError> {
    let (db, outbox) = open_outbox(config).await?;
    let result = outbox.discard(id).await;
    db.close().await;

    let item = result?;
    println!(
        "Discarded {} ({} {}/{})",
        item.id(),
        item.mutation.operation,
        item.mutation.doc_type,
        item.mutation.doc_key
    );
    Ok(())
}
