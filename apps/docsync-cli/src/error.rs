use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] docsync::SyncError),
    #[error(transparent)]
    Db(#[from] docsync_db::DbError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to render config: {0}")]
    Toml(#[from] toml::ser::Error),
    #[error("Content is not valid JSON: {0}")]
    InvalidContent(String),
    #[error("Config file already exists at {0} (use --force to overwrite)")]
    ConfigExists(PathBuf),
    #[error("No server configured. Run `docsync config init --server-url <URL>` or set DOCSYNC_SERVER_URL.")]
    ServerNotConfigured,
}
