//! # Configuration
//!
//! One `sync.toml` per device, overlaid by `DOCSYNC_*` variables.
//!
//! ```text
//!   defaults ──► sync.toml ──► DOCSYNC_* env ──► validate() ──► SyncConfig
//!                  │
//!                  └─ --config <path>, else the platform config dir:
//!                     Linux  ~/.config/docsync/sync.toml
//!                     macOS  ~/Library/Application Support/dev.docsync.docsync/sync.toml
//! ```
//!
//! Every section and every key is optional. A file holding only
//!
//! ```toml
//! [server]
//! url = "https://sync.example.com/api"
//! ```
//!
//! gets a fresh device id, a 30s auto-sync, and the 1s / 300s / 10 attempt
//! retry policy. Full layout: `[device] id name`, `[server] url auth_token
//! request_timeout_secs`, `[sync] auto_sync_secs doc_types
//! probe_interval_secs`, `[retry] base_delay_ms max_delay_ms give_up_after`,
//! `[storage] db_path`.

use docsync_core::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_GIVE_UP_AFTER, DEFAULT_MAX_DELAY_MS};
use docsync_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Environment variable names.
pub mod env {
    pub const DEVICE_ID: &str = "DOCSYNC_DEVICE_ID";
    pub const DEVICE_NAME: &str = "DOCSYNC_DEVICE_NAME";
    pub const SERVER_URL: &str = "DOCSYNC_SERVER_URL";
    pub const AUTH_TOKEN: &str = "DOCSYNC_AUTH_TOKEN";
    pub const AUTO_SYNC_SECS: &str = "DOCSYNC_AUTO_SYNC_SECS";
    pub const DB_PATH: &str = "DOCSYNC_DB_PATH";
}

/// `[device]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// A v4 UUID is generated when absent.
    #[serde(default = "generate_device_id")]
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "docsync device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: generate_device_id(),
            name: default_device_name(),
        }
    }
}

/// Where the server of record lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL; `/sync/push`, `/sync/pull` and `/sync` are appended.
    #[serde(default)]
    pub url: Option<String>,

    /// Static bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            url: None,
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Sync scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Auto-sync interval (seconds). 0 disables auto-sync.
    #[serde(default = "default_auto_sync")]
    pub auto_sync_secs: u64,

    /// Restrict pulls to these document types. Absent means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_types: Option<Vec<String>>,

    /// How often the reachability probe checks the server (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_auto_sync() -> u64 {
    30
}

fn default_probe_interval() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_sync_secs: default_auto_sync(),
            doc_types: None,
            probe_interval_secs: default_probe_interval(),
        }
    }
}

/// Backoff settings for failed mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Attempts after which an item stops being retried automatically.
    #[serde(default = "default_give_up_after")]
    pub give_up_after: u32,
}

fn default_base_delay() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_give_up_after() -> u32 {
    DEFAULT_GIVE_UP_AFTER
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            give_up_after: default_give_up_after(),
        }
    }
}

impl RetrySettings {
    /// Builds the retry policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.base_delay_ms, self.max_delay_ms, self.give_up_after)
    }
}

/// Where durable state lives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Complete docsync configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Defaults plus a freshly generated device id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `config_path` (or the platform default), applies `DOCSYNC_*`
    /// overrides and validates. A missing file is not an error.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let path = config_path.or_else(Self::default_config_path);
        let mut config = match path {
            Some(ref path) if path.is_file() => Self::read_file(path)?,
            Some(ref path) => {
                debug!(path = %path.display(), "No config file; starting from defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
        let config = toml::from_str(&text)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Writes pretty TOML to `config_path` (or the platform default) and
    /// returns where it went.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<PathBuf> {
        let Some(path) = config_path.or_else(Self::default_config_path) else {
            return Err(SyncError::ConfigSaveFailed(
                "no home directory; pass an explicit config path".into(),
            ));
        };

        let save_failed = |e: std::io::Error| {
            SyncError::ConfigSaveFailed(format!("{}: {e}", path.display()))
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(save_failed)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?).map_err(save_failed)?;

        info!(path = %path.display(), "Wrote config");
        Ok(path)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        if let Some(ref raw) = self.server.url {
            let parsed = url::Url::parse(raw)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!("{raw}: expected http or https")));
            }
        }

        if self.server.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "server.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.retry.give_up_after == 0 {
            return Err(SyncError::InvalidConfig(
                "retry.give_up_after must be greater than 0".into(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SyncError::InvalidConfig(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        if let Some(ref types) = self.sync.doc_types {
            if types.iter().any(|t| t.trim().is_empty() || t.contains(',')) {
                return Err(SyncError::InvalidConfig(
                    "sync.doc_types entries must be non-empty and contain no commas".into(),
                ));
            }
        }

        Ok(())
    }

    /// Overlays `DOCSYNC_*` values fetched through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(env::DEVICE_ID) {
            debug!(device_id = %id, "device id from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup(env::DEVICE_NAME) {
            self.device.name = name;
        }

        if let Some(url) = lookup(env::SERVER_URL) {
            debug!(%url, "server url from environment");
            self.server.url = Some(url);
        }

        if let Some(token) = lookup(env::AUTH_TOKEN) {
            self.server.auth_token = Some(token);
        }

        if let Some(secs) = lookup(env::AUTO_SYNC_SECS) {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.auto_sync_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring non-numeric auto-sync interval"),
            }
        }

        if let Some(path) = lookup(env::DB_PATH) {
            self.storage.db_path = Some(PathBuf::from(path));
        }
    }

    /// `sync.toml` in the platform config dir, if a home directory exists.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server.url.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// `None` when `auto_sync_secs` is 0.
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        match self.sync.auto_sync_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Configured path, else `<data dir>/docsync.db`.
    pub fn db_path(&self) -> SyncResult<PathBuf> {
        if let Some(ref path) = self.storage.db_path {
            return Ok(path.clone());
        }

        project_dirs()
            .map(|dirs| dirs.data_dir().join("docsync.db"))
            .ok_or_else(|| {
                SyncError::InvalidConfig(
                    "No home directory found; set storage.db_path or DOCSYNC_DB_PATH".into(),
                )
            })
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "docsync", "docsync")
}
