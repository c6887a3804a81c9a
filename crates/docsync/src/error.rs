//! # Engine Errors
//!
//! ```text
//!                    ┌────────────── retryable ──────────────┐
//!   reqwest ───────► │ ConnectionFailed  Timeout  Http(5xx,429)│
//!                    └────────────────────────────────────────┘
//!                      Unauthorized  Http(4xx)  Deserialization
//!   DbError ───────► StorageFailed          ┐
//!   outbox decode ─► CorruptState           ┘ is_storage_error()
//!   toml / url ────► InvalidConfig InvalidUrl ConfigLoad/Save  is_config_error()
//!   validation ────► InvalidMutation
//!   outbox ops ────► DuplicateMutation  ItemNotFound
//!   DocumentApplier ► ApplyFailed
//! ```
//!
//! A server-side conflict is not an error. It arrives as a push result and
//! goes to the conflict handler.

use docsync_core::ValidationError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // ----- configuration -----
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("cannot read config: {0}")]
    ConfigLoadFailed(String),

    #[error("cannot write config: {0}")]
    ConfigSaveFailed(String),

    // ----- transport -----
    /// The server could not be reached at all.
    #[error("server unreachable: {0}")]
    ConnectionFailed(String),

    /// Seconds waited before giving up on the request.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// 401/403. The token source has already been told to invalidate.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server answered {status}: {message}")]
    Http { status: u16, message: String },

    #[error("cannot encode: {0}")]
    SerializationFailed(String),

    #[error("cannot decode: {0}")]
    DeserializationFailed(String),

    // ----- local state -----
    #[error("store failed: {0}")]
    StorageFailed(String),

    /// A persisted value exists but no longer decodes.
    #[error("persisted '{key}' is unreadable: {reason}")]
    CorruptState { key: String, reason: String },

    #[error("mutation rejected: {0}")]
    InvalidMutation(#[from] ValidationError),

    #[error("mutation {id} is already queued")]
    DuplicateMutation { id: String },

    #[error("outbox has no item {id}")]
    ItemNotFound { id: String },

    /// The host's document applier refused a pulled batch.
    #[error("applying pulled documents failed: {0}")]
    ApplyFailed(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl SyncError {
    /// Transient failures worth another attempt on a later cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SyncError::StorageFailed(_) | SyncError::CorruptState { .. }
        )
    }
}

impl From<docsync_db::DbError> for SyncError {
    fn from(err: docsync_db::DbError) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Io => SyncError::SerializationFailed(err.to_string()),
            Category::Syntax | Category::Data | Category::Eof => {
                SyncError::DeserializationFailed(err.to_string())
            }
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// Fallback mapping. The HTTP transport maps status codes and timeouts
/// itself and only lands here for failures without a response.
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SyncError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_timeout() => SyncError::Timeout(0),
            None if err.is_decode() => SyncError::DeserializationFailed(err.to_string()),
            None => SyncError::ConnectionFailed(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}
