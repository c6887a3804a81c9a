use std::sync::Arc;
use std::time::Duration;

use docsync::{ReachabilityProbe, SyncConfig, SyncError, SyncOutcome, SyncReport};
use tracing::{info, warn};
use url::Url;

use crate::commands::common::open_engine;
use crate::error::CliError;

/// Fallback when both `--interval` and `sync.auto_sync_secs` are unset.
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run_sync(config: &SyncConfig) -> Result<(), CliError> {
    let (db, orchestrator) = open_engine(config, None).await?;

    let outcome = orchestrator.sync().await;
    let remaining = orchestrator.pending_count().await;
    drop(orchestrator);
    db.close().await;

    match outcome? {
        SyncOutcome::Completed(report) => println!("{}", describe(&report, remaining)),
        SyncOutcome::Offline => println!("Offline; {remaining} change(s) still queued"),
        SyncOutcome::Skipped => println!("Another sync is already running"),
    }
    Ok(())
}

pub async fn run_watch(config: &SyncConfig, interval_secs: Option<u64>) -> Result<(), CliError> {
    let interval = interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .or_else(|| config.auto_sync_interval())
        .unwrap_or(DEFAULT_WATCH_INTERVAL);

    let server_url = config.server_url().ok_or(CliError::ServerNotConfigured)?;
    let url = Url::parse(server_url).map_err(SyncError::from)?;
    let probe = ReachabilityProbe::start(
        &url,
        Duration::from_secs(config.sync.probe_interval_secs.max(1)),
        config.request_timeout(),
    )?;

    let (db, orchestrator) = open_engine(config, Some(Arc::new(probe))).await?;

    info!(interval_secs = interval.as_secs(), "Watching; press Ctrl+C to stop");
    if let Err(e) = orchestrator.sync().await {
        warn!(error = %e, "Initial sync failed");
    }
    orchestrator.start_auto_sync(interval);

    shutdown_signal().await;

    orchestrator.stop_auto_sync();
    let remaining = orchestrator.pending_count().await;
    drop(orchestrator);
    db.close().await;

    println!("Stopped; {remaining} change(s) still queued");
    Ok(())
}

fn describe(report: &SyncReport, remaining: usize) -> String {
    format!(
        "Sync complete: pushed {}, applied {}, conflicts {}, failed {}, pulled {}; {} queued",
        report.pushed, report.applied, report.conflicts, report.failed, report.pulled, remaining
    )
}

/// Resolves on Ctrl+C, or on SIGTERM under unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
