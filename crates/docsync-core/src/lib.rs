//! # docsync-core
//!
//! Data model and pure decisions of the sync engine: what a mutation is,
//! when a failed one may be retried, which push results are conflicts, and
//! who wins one. Storage and network live in `docsync`.
//!
//! ```text
//!   host app ──► docsync  (Outbox, SyncOrchestrator, HttpTransport)
//!                   │
//!                   ▼
//!              docsync-core
//!                types       Mutation, OutboxItem, MutationResult, Document
//!                retry       min(base * 2^n, max), give up after N
//!                conflict    extract_conflicts, last_writer_wins
//!                validation  identity fields must not be blank
//!
//!              no I/O; constructors stamp `Utc::now()`, nothing else
//!              reads ambient state
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Mutations, outbox items, results, documents, wire envelopes
//! - [`retry`] - Exponential backoff and give-up threshold
//! - [`conflict`] - Conflict extraction and last-writer-wins comparison
//! - [`error`] - Validation error types
//! - [`validation`] - Mutation validation
//!
//! ## Example Usage
//!
//! ```rust
//! use docsync_core::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.next_delay(0), Duration::from_millis(1000));
//! assert_eq!(policy.next_delay(10), Duration::from_millis(300_000));
//! ```

pub mod conflict;
pub mod error;
pub mod retry;
pub mod types;
pub mod validation;

pub use conflict::{extract_conflicts, last_writer_wins};
pub use error::ValidationError;
pub use retry::RetryPolicy;
pub use types::*;
