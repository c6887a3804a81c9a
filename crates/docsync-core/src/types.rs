//! # Domain Types
//!
//! Core types shared by the outbox, the transport and the orchestrator.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Mutation     │   │   OutboxItem    │   │ MutationResult  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │──►│  mutation       │   │  id             │       │
//! │  │  doc_type/key   │   │  attempts       │   │  outcome        │       │
//! │  │  content        │   │  (AttemptState) │   │  (Applied |     │       │
//! │  │  operation      │   └─────────────────┘   │   Conflict |    │       │
//! │  └─────────────────┘                         │   Failed)       │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Document     │   │  PullResponse   │   │   SyncStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  doc_type/key   │   │  documents      │   │  Synced         │       │
//! │  │  content        │   │  server_time    │   │  Pending        │       │
//! │  │  updated_at     │   └─────────────────┘   │  Syncing        │       │
//! │  └─────────────────┘                         │  Error          │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! All wire types serialize as camelCase JSON. Timestamps are RFC 3339 UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// Mutation
// =============================================================================

/// The kind of change a mutation applies to its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create or replace the document content.
    Upsert,
    /// Remove the document.
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Upsert => write!(f, "upsert"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One intended change to one document.
///
/// `id` identifies this mutation instance, not the document: several
/// mutations may target the same `(doc_type, doc_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub id: String,
    pub doc_type: String,
    pub doc_key: String,
    /// Opaque payload; `Null` for deletes.
    #[serde(default)]
    pub content: Value,
    /// Client clock at the time of the change.
    pub client_updated_at: DateTime<Utc>,
    pub device_id: String,
    pub operation: Operation,
}

impl Mutation {
    /// Creates an upsert mutation stamped with a fresh id and the current time.
    pub fn upsert(
        doc_type: impl Into<String>,
        doc_key: impl Into<String>,
        content: Value,
        device_id: impl Into<String>,
    ) -> Self {
        Self::new(doc_type, doc_key, content, device_id, Operation::Upsert)
    }

    /// Creates a delete mutation stamped with a fresh id and the current time.
    pub fn delete(
        doc_type: impl Into<String>,
        doc_key: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self::new(doc_type, doc_key, Value::Null, device_id, Operation::Delete)
    }

    fn new(
        doc_type: impl Into<String>,
        doc_key: impl Into<String>,
        content: Value,
        device_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Mutation {
            id: Uuid::new_v4().to_string(),
            doc_type: doc_type.into(),
            doc_key: doc_key.into(),
            content,
            client_updated_at: Utc::now(),
            device_id: device_id.into(),
            operation,
        }
    }

    /// Overrides the client timestamp.
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.client_updated_at = at;
        self
    }

    /// Returns a copy of this mutation under a new id, stamped `now`.
    ///
    /// Used to re-assert local content after losing a last-writer-wins
    /// comparison: the later timestamp makes it win the next push.
    pub fn reissue(&self, now: DateTime<Utc>) -> Self {
        Mutation {
            id: Uuid::new_v4().to_string(),
            client_updated_at: now,
            ..self.clone()
        }
    }

    /// Returns true if this mutation targets the given document.
    pub fn targets(&self, doc_type: &str, doc_key: &str) -> bool {
        self.doc_type == doc_type && self.doc_key == doc_key
    }
}

// =============================================================================
// Outbox Item
// =============================================================================

/// Retry bookkeeping for an outbox item.
///
/// ```text
///   Fresh ──push failed──► Failed { retry_count: 1, .. }
///                               │
///                          push failed
///                               ▼
///                          Failed { retry_count: 2, .. } ... up to the give-up threshold
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AttemptState {
    /// Never attempted (or reset by a requeue).
    #[default]
    Fresh,

    /// At least one push attempt failed.
    #[serde(rename_all = "camelCase")]
    Failed {
        retry_count: u32,
        last_attempt_at: DateTime<Utc>,
    },
}

/// A queued mutation plus its retry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    pub mutation: Mutation,
    #[serde(default)]
    pub attempts: AttemptState,
}

impl OutboxItem {
    /// Wraps a mutation that has not been attempted yet.
    pub fn new(mutation: Mutation) -> Self {
        OutboxItem {
            mutation,
            attempts: AttemptState::Fresh,
        }
    }

    /// The mutation id.
    pub fn id(&self) -> &str {
        &self.mutation.id
    }

    /// Number of failed push attempts so far.
    pub fn retry_count(&self) -> u32 {
        match self.attempts {
            AttemptState::Fresh => 0,
            AttemptState::Failed { retry_count, .. } => retry_count,
        }
    }

    /// Time of the most recent failed attempt, if any.
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        match self.attempts {
            AttemptState::Fresh => None,
            AttemptState::Failed {
                last_attempt_at, ..
            } => Some(last_attempt_at),
        }
    }

    /// Returns true if the item has never been attempted.
    pub fn is_fresh(&self) -> bool {
        matches!(self.attempts, AttemptState::Fresh)
    }

    /// Records a failed attempt at `now` and returns the new retry count.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> u32 {
        let retry_count = self.retry_count().saturating_add(1);
        self.attempts = AttemptState::Failed {
            retry_count,
            last_attempt_at: now,
        };
        retry_count
    }

    /// Clears retry bookkeeping.
    pub fn reset(&mut self) {
        self.attempts = AttemptState::Fresh;
    }
}

// =============================================================================
// Documents
// =============================================================================

/// A server-side document as returned by pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_type: String,
    pub doc_key: String,
    #[serde(default)]
    pub content: Value,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Document {
    /// Builds the document state a mutation would produce on the server.
    pub fn from_mutation(mutation: &Mutation) -> Self {
        Document {
            doc_type: mutation.doc_type.clone(),
            doc_key: mutation.doc_key.clone(),
            content: mutation.content.clone(),
            updated_at: mutation.client_updated_at,
            device_id: Some(mutation.device_id.clone()),
            deleted: mutation.operation == Operation::Delete,
        }
    }
}

// =============================================================================
// Mutation Results
// =============================================================================

/// Which side won a last-writer-wins comparison, from the server's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    /// The pushed (local) mutation won.
    Incoming,
    /// The document already on the server won.
    Existing,
}

impl ConflictWinner {
    /// Returns true if the local mutation was kept.
    pub fn local_won(&self) -> bool {
        matches!(self, ConflictWinner::Incoming)
    }
}

/// How the server settled a conflicting mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub winner: ConflictWinner,
    /// The document as it stands on the server after resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

/// Structured error reported by the server for one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RemoteErrorRepr")]
pub struct RemoteError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        RemoteError {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    fn unspecified() -> Self {
        RemoteError::new("server rejected mutation without an error body")
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Servers send either a bare message or `{code, message}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RemoteErrorRepr {
    Message(String),
    Structured {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },
}

impl From<RemoteErrorRepr> for RemoteError {
    fn from(repr: RemoteErrorRepr) -> Self {
        match repr {
            RemoteErrorRepr::Message(message) => RemoteError::new(message),
            RemoteErrorRepr::Structured { code, message } => RemoteError { code, message },
        }
    }
}

/// The server's verdict on one pushed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Applied as sent.
    Applied,
    /// Collided with another write; the server settled it by LWW.
    Conflict(ConflictResolution),
    /// Rejected; the mutation stays queued for retry.
    Failed(RemoteError),
}

/// Result for one mutation of a push batch, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MutationResultWire", into = "MutationResultWire")]
pub struct MutationResult {
    pub id: String,
    pub outcome: MutationOutcome,
}

impl MutationResult {
    pub fn applied(id: impl Into<String>) -> Self {
        MutationResult {
            id: id.into(),
            outcome: MutationOutcome::Applied,
        }
    }

    pub fn conflict(id: impl Into<String>, resolution: ConflictResolution) -> Self {
        MutationResult {
            id: id.into(),
            outcome: MutationOutcome::Conflict(resolution),
        }
    }

    pub fn failed(id: impl Into<String>, error: RemoteError) -> Self {
        MutationResult {
            id: id.into(),
            outcome: MutationOutcome::Failed(error),
        }
    }

    /// Returns the conflict resolution if this result carries one.
    pub fn conflict_resolution(&self) -> Option<&ConflictResolution> {
        match &self.outcome {
            MutationOutcome::Conflict(resolution) => Some(resolution),
            _ => None,
        }
    }

    /// Returns true if the server no longer needs this mutation.
    pub fn is_settled(&self) -> bool {
        !matches!(self.outcome, MutationOutcome::Failed(_))
    }
}

/// JSON shape of a mutation result:
/// `{id, success, error?, conflictResolution?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationResultWire {
    id: String,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conflict_resolution: Option<ConflictResolution>,
}

impl From<MutationResultWire> for MutationResult {
    fn from(wire: MutationResultWire) -> Self {
        // A conflict marker takes precedence: the server has already decided
        // the winner, whatever the success flag says.
        let outcome = match (wire.conflict_resolution, wire.success) {
            (Some(resolution), _) => MutationOutcome::Conflict(resolution),
            (None, true) => MutationOutcome::Applied,
            (None, false) => {
                MutationOutcome::Failed(wire.error.unwrap_or_else(RemoteError::unspecified))
            }
        };

        MutationResult {
            id: wire.id,
            outcome,
        }
    }
}

impl From<MutationResult> for MutationResultWire {
    fn from(result: MutationResult) -> Self {
        let (success, error, conflict_resolution) = match result.outcome {
            MutationOutcome::Applied => (true, None, None),
            MutationOutcome::Conflict(resolution) => (true, None, Some(resolution)),
            MutationOutcome::Failed(error) => (false, Some(error), None),
        };

        MutationResultWire {
            id: result.id,
            success,
            error,
            conflict_resolution,
        }
    }
}

// =============================================================================
// Wire Envelopes
// =============================================================================

/// Body of a push call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub mutations: Vec<Mutation>,
}

/// Response of a push call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    #[serde(default)]
    pub results: Vec<MutationResult>,
}

/// Response of a pull call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Server clock at which `documents` is a consistent view; the next
    /// checkpoint.
    pub server_time: DateTime<Utc>,
}

/// Body of a combined push + pull call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    pub mutations: Vec<Mutation>,
    pub pull_since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_types: Option<Vec<String>>,
}

/// Response of a combined push + pull call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResponse {
    pub push: PushResponse,
    pub pull: PullResponse,
}

// =============================================================================
// Sync Status
// =============================================================================

/// Sync status held by the orchestrator.
///
/// ```text
///            queue_mutation
///   Synced ─────────────────► Pending
///     ▲                          │ sync() while online
///     │ outbox empty             ▼
///     └──────────────────── Syncing ──── push/pull failed ──► Error
///            outbox not empty ──► Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing left to push.
    #[default]
    Synced,
    /// Local mutations are waiting to be pushed.
    Pending,
    /// A sync cycle is in flight.
    Syncing,
    /// The last sync cycle failed.
    Error,
}

impl SyncStatus {
    /// Returns true while a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
