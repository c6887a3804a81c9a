use std::path::PathBuf;

use chrono::{DateTime, Utc};
use docsync::core::SyncStatus;
use docsync::SyncConfig;
use serde::Serialize;

use crate::commands::common::{open_outbox, read_checkpoint};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    device_id: String,
    server_url: Option<String>,
    status: SyncStatus,
    pending: usize,
    gave_up: usize,
    checkpoint: Option<DateTime<Utc>>,
    db_path: PathBuf,
}

pub async fn run_status(config: &SyncConfig, as_json: bool) -> Result<(), CliError> {
    let (db, outbox) = open_outbox(config).await?;
    let pending = outbox.pending_count().await;
    let gave_up = outbox.exhausted().await.len();
    let checkpoint = read_checkpoint(db.as_ref()).await?;
    db.close().await;

    let report = StatusReport {
        device_id: config.device_id().to_string(),
        server_url: config.server_url().map(str::to_string),
        status: resting_status(pending),
        pending,
        gave_up,
        checkpoint,
        db_path: config.db_path()?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

/// Status of an engine that is not running a cycle.
fn resting_status(pending: usize) -> SyncStatus {
    if pending == 0 {
        SyncStatus::Synced
    } else {
        SyncStatus::Pending
    }
}

fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("Status:      {}", report.status),
        format!("Device:      {}", report.device_id),
        format!(
            "Server:      {}",
            report.server_url.as_deref().unwrap_or("(not configured)")
        ),
        format!("Pending:     {}", report.pending),
    ];
    if report.gave_up > 0 {
        lines.push(format!(
            "Gave up:     {} (see `docsync outbox`, then requeue or discard)",
            report.gave_up
        ));
    }
    lines.push(match report.checkpoint {
        Some(at) => format!("Last pull:   {}", at.to_rfc3339()),
        None => "Last pull:   never".to_string(),
    });
    lines.push(format!("Database:    {}", report.db_path.display()));
    lines
}
