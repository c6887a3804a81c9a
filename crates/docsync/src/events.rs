//! # Sync Events and Hooks
//!
//! Three ways the host hears from the engine:
//!
//! - [`SyncEventListener`]: any number of subscribers, one method per event
//! - [`ConflictHandler`]: a single slot, receives every conflict batch
//! - [`DocumentApplier`]: receives pulled documents before the checkpoint
//!   moves past them
//!
//! ```text
//! sync() ─┬─► on_sync_start
//!         ├─► push ─► conflicts? ─► ConflictHandler::on_conflicts
//!         │         └► retries exhausted? ─► on_retries_exhausted
//!         ├─► pull ─► DocumentApplier::apply
//!         └─► on_sync_complete | on_sync_error
//!
//! probe change ─► on_offline_change(offline)
//! ```

use async_trait::async_trait;
use docsync_core::{ConflictResolution, Document, Mutation, MutationResult, OutboxItem};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Listener trait
// =============================================================================

/// Receives orchestrator events. Every method defaults to a no-op.
///
/// Methods run synchronously on the task driving the cycle; keep them short.
pub trait SyncEventListener: Send + Sync {
    fn on_sync_start(&self) {}

    fn on_sync_complete(&self) {}

    fn on_sync_error(&self, _error: &SyncError) {}

    /// `offline` is true when connectivity was lost.
    fn on_offline_change(&self, _offline: bool) {}

    /// Items that just reached the give-up threshold. They stay queued.
    fn on_retries_exhausted(&self, _items: &[OutboxItem]) {}
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscriber registry. Listeners are called outside the lock, in
/// subscription order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<dyn SyncEventListener>)>>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: Arc<dyn SyncEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn emit(&self, event: impl Fn(&dyn SyncEventListener)) {
        let snapshot: Vec<Arc<dyn SyncEventListener>> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            event(listener.as_ref());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Listener that writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl SyncEventListener for TracingListener {
    fn on_sync_start(&self) {
        info!("Sync started");
    }

    fn on_sync_complete(&self) {
        info!("Sync complete");
    }

    fn on_sync_error(&self, error: &SyncError) {
        error!(%error, retryable = error.is_retryable(), "Sync failed");
    }

    fn on_offline_change(&self, offline: bool) {
        info!(offline, "Connectivity changed");
    }

    fn on_retries_exhausted(&self, items: &[OutboxItem]) {
        for item in items {
            warn!(
                id = %item.id(),
                doc_type = %item.mutation.doc_type,
                doc_key = %item.mutation.doc_key,
                "Mutation gave up after repeated failures"
            );
        }
    }
}

// =============================================================================
// Conflicts
// =============================================================================

/// A pushed mutation the server settled by last-writer-wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// The mutation as it was pushed.
    pub local: Mutation,
    /// The server's result for it (outcome is always `Conflict`).
    pub result: MutationResult,
}

impl Conflict {
    /// The server's resolution.
    pub fn resolution(&self) -> Option<&ConflictResolution> {
        self.result.conflict_resolution()
    }

    /// Returns true if the server kept the local write.
    pub fn local_won(&self) -> bool {
        self.resolution()
            .map(|resolution| resolution.winner.local_won())
            .unwrap_or(false)
    }
}

/// Manual override for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep what the server decided; apply its document locally.
    AcceptServer,
    /// Re-assert the local write with a fresh timestamp.
    KeepLocal,
}

/// Receives the conflicts found in each push.
pub trait ConflictHandler: Send + Sync {
    fn on_conflicts(&self, conflicts: &[Conflict]);
}

impl<F> ConflictHandler for F
where
    F: Fn(&[Conflict]) + Send + Sync,
{
    fn on_conflicts(&self, conflicts: &[Conflict]) {
        self(conflicts)
    }
}

// =============================================================================
// Document application
// =============================================================================

/// Applies pulled documents to the local replica.
///
/// An error aborts the cycle as a pull failure; the checkpoint stays put so
/// the same documents are pulled again.
#[async_trait]
pub trait DocumentApplier: Send + Sync {
    async fn apply(&self, documents: &[Document]) -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::ConflictWinner;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counter {
        starts: Mutex<u32>,
    }

    impl SyncEventListener for Counter {
        fn on_sync_start(&self) {
            *self.starts.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let listeners = Listeners::default();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());

        let id_a = listeners.subscribe(a.clone());
        listeners.subscribe(b.clone());
        assert_eq!(listeners.len(), 2);

        listeners.emit(|l| l.on_sync_start());
        assert!(listeners.unsubscribe(id_a));
        assert!(!listeners.unsubscribe(id_a));
        listeners.emit(|l| l.on_sync_start());

        assert_eq!(*a.starts.lock().unwrap(), 1);
        assert_eq!(*b.starts.lock().unwrap(), 2);
    }

    #[test]
    fn test_default_methods_are_noops() {
        let listeners = Listeners::default();
        listeners.subscribe(Arc::new(TracingListener));
        listeners.emit(|l| l.on_sync_error(&SyncError::Timeout(1)));
        listeners.emit(|l| l.on_offline_change(true));
        listeners.emit(|l| l.on_retries_exhausted(&[]));
    }

    #[test]
    fn test_closure_conflict_handler() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let handler: Arc<dyn ConflictHandler> = Arc::new(move |conflicts: &[Conflict]| {
            *sink.lock().unwrap() += conflicts.len();
        });

        let local = Mutation::upsert("note", "n", serde_json::json!({}), "dev-a");
        let conflict = Conflict {
            result: MutationResult::conflict(
                local.id.clone(),
                ConflictResolution {
                    winner: ConflictWinner::Incoming,
                    document: None,
                },
            ),
            local,
        };
        assert!(conflict.local_won());

        handler.on_conflicts(&[conflict]);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
