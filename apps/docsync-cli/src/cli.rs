use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "docsync")]
#[command(about = "Queue document changes offline and sync them with a server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (default: platform config dir/sync.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the local database path
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Queue a change to one document
    Queue {
        /// Document type, e.g. "note"
        doc_type: String,
        /// Document key within its type
        doc_key: String,
        /// New content as JSON
        #[arg(long, value_name = "JSON", conflicts_with = "delete", required_unless_present = "delete")]
        content: Option<String>,
        /// Delete the document instead of writing it
        #[arg(long)]
        delete: bool,
    },
    /// Push queued changes and pull remote ones once
    Sync,
    /// Show the sync state of this device
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing on an interval until interrupted
    Watch {
        /// Seconds between cycles (default: sync.auto_sync_secs)
        #[arg(short, long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// List queued changes
    Outbox {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retry a queued change now, even after it gave up
    Requeue {
        /// Mutation ID
        id: String,
    },
    /// Drop a queued change without sending it
    Discard {
        /// Mutation ID
        id: String,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (token redacted)
    Show,
    /// Write a config file with a fresh device ID
    Init {
        /// Base URL of the sync server
        #[arg(long, value_name = "URL")]
        server_url: Option<String>,
        /// Bearer token for the sync server
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
