//! # docsync: Offline-First Sync Engine
//!
//! Accumulates local document mutations while disconnected and reconciles
//! them with a server of record when connectivity returns.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           docsync Engine                                │
//! │                                                                         │
//! │  Host app / CLI                                                         │
//! │       │ queue_mutation / sync / subscribe                               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    SyncOrchestrator                             │   │
//! │  │   status machine · single-flight cycles · auto-sync task        │   │
//! │  └──────┬──────────────┬──────────────┬──────────────┬────────────┘   │
//! │         │              │              │              │                 │
//! │         ▼              ▼              ▼              ▼                 │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌──────────────────┐    │
//! │  │  Outbox    │ │ Transport  │ │  Network   │ │ Listeners /      │    │
//! │  │ (durable   │ │ (HTTP push │ │  probe     │ │ conflict handler │    │
//! │  │  queue)    │ │  / pull)   │ │            │ │ / doc applier    │    │
//! │  └─────┬──────┘ └─────┬──────┘ └────────────┘ └──────────────────┘    │
//! │        │              │                                                 │
//! │        ▼              ▼                                                 │
//! │  KeyValueStore   TokenProvider                                          │
//! │  (memory/SQLite) (static/cached)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//! ```rust,ignore
//! use docsync::{HttpTransport, SyncConfig, SyncOrchestrator};
//!
//! let config = SyncConfig::load(None)?;
//! let transport = HttpTransport::from_config(&config)?;
//! let engine = SyncOrchestrator::builder()
//!     .config(&config)
//!     .transport(std::sync::Arc::new(transport))
//!     .build()
//!     .await?;
//!
//! engine.queue_upsert("note", "n-1", serde_json::json!({"title": "hi"})).await?;
//! engine.sync().await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod orchestrator;
pub mod outbox;
pub mod storage;
pub mod transport;

pub use auth::{CachedTokenProvider, StaticToken, TokenInfo, TokenProvider, TokenSource};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use events::{
    Conflict, ConflictChoice, ConflictHandler, DocumentApplier, ListenerId, SyncEventListener,
    TracingListener,
};
pub use network::{
    AlwaysOnline, ConnectivityListener, ManualNetworkProbe, NetworkStatusProbe,
    ReachabilityProbe, Subscription,
};
pub use orchestrator::{SyncOrchestrator, SyncOrchestratorBuilder, SyncOutcome, SyncReport};
pub use outbox::Outbox;
pub use storage::{KeyValueStore, MemoryStore, CHECKPOINT_KEY, OUTBOX_KEY};
pub use transport::{HttpTransport, Transport};

pub use docsync_core as core;
