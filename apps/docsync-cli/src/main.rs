//! # docsync CLI
//!
//! Command-line front end for the docsync engine.
//!
//! ## Commands
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  local only (no network)          network                               │
//! │  ───────────────────────          ───────                               │
//! │  queue <type> <key> ...           sync     one push/pull cycle          │
//! │  status [--json]                  watch    auto-sync until Ctrl+C       │
//! │  outbox [--json]                                                        │
//! │  requeue <id> / discard <id>                                            │
//! │  config show | init                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State lives in the SQLite database at `storage.db_path` (or the platform
//! data directory), so a `queue` issued offline is pushed by a later `sync`.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::load_config;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "info,docsync=debug,sqlx=warn";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Config { command } = cli.command {
        return commands::config::run_config(command, cli.config).await;
    }

    let config = load_config(cli.config, cli.db_path)?;

    match cli.command {
        Commands::Queue {
            doc_type,
            doc_key,
            content,
            delete,
        } => {
            commands::queue::run_queue(&config, &doc_type, &doc_key, content.as_deref(), delete)
                .await
        }
        Commands::Sync => commands::sync::run_sync(&config).await,
        Commands::Status { json } => commands::status::run_status(&config, json).await,
        Commands::Watch { interval } => commands::sync::run_watch(&config, interval).await,
        Commands::Outbox { json } => commands::outbox::run_outbox(&config, json).await,
        Commands::Requeue { id } => commands::outbox::run_requeue(&config, &id).await,
        Commands::Discard { id } => commands::outbox::run_discard(&config, &id).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigCommands;

    #[test]
    fn test_parses_queue_upsert() {
        let cli = Cli::try_parse_from([
            "docsync",
            "queue",
            "note",
            "n-1",
            "--content",
            r#"{"title":"hi"}"#,
        ])
        .unwrap();

        match cli.command {
            Commands::Queue {
                doc_type,
                doc_key,
                content,
                delete,
            } => {
                assert_eq!(doc_type, "note");
                assert_eq!(doc_key, "n-1");
                assert_eq!(content.as_deref(), Some(r#"{"title":"hi"}"#));
                assert!(!delete);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_queue_requires_content_or_delete() {
        assert!(Cli::try_parse_from(["docsync", "queue", "note", "n-1"]).is_err());
        assert!(Cli::try_parse_from([
            "docsync", "queue", "note", "n-1", "--delete", "--content", "{}"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["docsync", "queue", "note", "n-1", "--delete"]).is_ok());
    }

    #[test]
    fn test_global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docsync",
            "status",
            "--json",
            "--config",
            "/tmp/sync.toml",
            "--db-path",
            "/tmp/docsync.db",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Status { json: true }));
        assert_eq!(cli.config.unwrap().to_str(), Some("/tmp/sync.toml"));
        assert_eq!(cli.db_path.unwrap().to_str(), Some("/tmp/docsync.db"));
    }

    #[test]
    fn test_parses_config_init() {
        let cli = Cli::try_parse_from([
            "docsync",
            "config",
            "init",
            "--server-url",
            "https://sync.example.com",
            "--force",
        ])
        .unwrap();

        match cli.command {
            Commands::Config {
                command:
                    ConfigCommands::Init {
                        server_url,
                        token,
                        force,
                    },
            } => {
                assert_eq!(server_url.as_deref(), Some("https://sync.example.com"));
                assert_eq!(token, None);
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
