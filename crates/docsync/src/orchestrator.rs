//! # Sync Orchestrator
//!
//! Owns the sync status, runs push-then-pull cycles, and schedules
//! auto-sync.
//!
//! ## Status State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │              queue_mutation (any state)                                 │
//! │        ┌──────────────────────────────────────┐                         │
//! │        ▼                                      │                         │
//! │   ┌─────────┐  sync() offline   ┌─────────┐   │                         │
//! │   │ synced  │ ────────────────► │ pending │ ◄─┘                         │
//! │   └────┬────┘                   └────┬────┘                             │
//! │        │ sync() online               │ sync() online                    │
//! │        ▼                             ▼                                  │
//! │   ┌─────────────────────────────────────────┐  sync() ──► Skipped       │
//! │   │               syncing                   │  (one cycle in flight)    │
//! │   └────┬──────────────────┬─────────────────┘                           │
//! │        │ ok, queue empty  │ ok, items left   │ push/pull error          │
//! │        ▼                  ▼                  ▼                          │
//! │     synced             pending            error ──sync()──► syncing     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Cycle
//! 1. Ask the outbox for eligible items (fresh + backoff elapsed)
//! 2. Push them; remove applied and conflicting ones, mark the rest failed
//! 3. Hand conflicts to the conflict handler
//! 4. Pull since the checkpoint; apply documents; advance the checkpoint
//! 5. `synced` if the queue is empty, otherwise `pending`
//!
//! On any push or pull error, every batch item the push results did not
//! already settle is marked failed exactly once and the status becomes
//! `error`.

use chrono::{DateTime, Utc};
use docsync_core::{
    extract_conflicts, Mutation, MutationOutcome, MutationResult, OutboxItem, RetryPolicy,
    SyncStatus,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{
    Conflict, ConflictChoice, ConflictHandler, DocumentApplier, ListenerId, Listeners,
    SyncEventListener,
};
use crate::network::{AlwaysOnline, NetworkStatusProbe, Subscription};
use crate::outbox::Outbox;
use crate::storage::{KeyValueStore, MemoryStore, CHECKPOINT_KEY};
use crate::transport::Transport;

// =============================================================================
// Cycle outcome
// =============================================================================

/// What a call to [`SyncOrchestrator::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was in flight; nothing happened.
    Skipped,
    /// The probe reported offline; no network call was made.
    Offline,
    /// A full push/pull cycle ran.
    Completed(SyncReport),
}

/// Counts from one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Mutations sent in the push.
    pub pushed: usize,
    /// Mutations the server applied.
    pub applied: usize,
    /// Mutations the server settled by last-writer-wins.
    pub conflicts: usize,
    /// Mutations left queued with a new failure recorded.
    pub failed: usize,
    /// Documents received from the pull.
    pub pulled: usize,
}

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug, Default)]
struct EngineState {
    status: SyncStatus,
    in_flight: bool,
    last_sync: Option<DateTime<Utc>>,
}

struct AutoSyncTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Resets the in-flight flag if a cycle future is dropped before finishing.
struct CycleGuard<'a> {
    state: &'a Mutex<EngineState>,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.in_flight = false;
            if state.status.is_syncing() {
                state.status = SyncStatus::Pending;
            }
        }
    }
}

// =============================================================================
// SyncOrchestrator
// =============================================================================

/// The sync engine. Shared as `Arc<SyncOrchestrator>`.
pub struct SyncOrchestrator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    outbox: Outbox,
    probe: Arc<dyn NetworkStatusProbe>,
    applier: Option<Arc<dyn DocumentApplier>>,
    conflict_handler: RwLock<Option<Arc<dyn ConflictHandler>>>,
    listeners: Arc<Listeners>,
    device_id: String,
    doc_types: Option<Vec<String>>,

    state: Mutex<EngineState>,
    checkpoint: tokio::sync::Mutex<Option<DateTime<Utc>>>,
    auto_sync: Mutex<Option<AutoSyncTask>>,

    _connectivity: Subscription,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("device_id", &self.device_id)
            .field("status", &self.status())
            .field("auto_sync", &self.is_auto_sync_running())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Starts building an orchestrator.
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::default()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.state().status
    }

    /// Completion time of the last successful cycle.
    ///
    /// Until the first cycle of this process finishes, this is the persisted
    /// pull checkpoint, so a restarted engine still reports when it last synced.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync
    }

    /// Server time of the last applied pull.
    pub async fn checkpoint(&self) -> Option<DateTime<Utc>> {
        *self.checkpoint.lock().await
    }

    /// Queued mutations, including exhausted ones.
    pub async fn pending_count(&self) -> usize {
        self.outbox.pending_count().await
    }

    /// Snapshot of the outbox.
    pub async fn outbox_items(&self) -> Vec<OutboxItem> {
        self.outbox.items().await
    }

    /// Items that stopped being retried automatically.
    pub async fn exhausted_items(&self) -> Vec<OutboxItem> {
        self.outbox.exhausted().await
    }

    /// Device id stamped by [`queue_upsert`](Self::queue_upsert) and
    /// [`queue_delete`](Self::queue_delete).
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.outbox.policy()
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Durably queues a mutation and moves to `pending`.
    pub async fn queue_mutation(&self, mutation: Mutation) -> SyncResult<()> {
        self.outbox.add(mutation).await?;
        self.state().status = SyncStatus::Pending;
        Ok(())
    }

    /// Queues an upsert from this device. Returns the mutation id.
    pub async fn queue_upsert(
        &self,
        doc_type: &str,
        doc_key: &str,
        content: Value,
    ) -> SyncResult<String> {
        let mutation = Mutation::upsert(doc_type, doc_key, content, self.device_id.as_str());
        let id = mutation.id.clone();
        self.queue_mutation(mutation).await?;
        Ok(id)
    }

    /// Queues a delete from this device. Returns the mutation id.
    pub async fn queue_delete(&self, doc_type: &str, doc_key: &str) -> SyncResult<String> {
        let mutation = Mutation::delete(doc_type, doc_key, self.device_id.as_str());
        let id = mutation.id.clone();
        self.queue_mutation(mutation).await?;
        Ok(id)
    }

    /// Makes an exhausted (or backing-off) item eligible immediately.
    pub async fn requeue(&self, id: &str) -> SyncResult<()> {
        self.outbox.requeue(id).await?;
        self.state().status = SyncStatus::Pending;
        Ok(())
    }

    /// Drops an item without sending it.
    pub async fn discard(&self, id: &str) -> SyncResult<OutboxItem> {
        let item = self.outbox.discard(id).await?;
        let remaining = self.outbox.pending_count().await;

        let mut state = self.state();
        if remaining == 0 && state.status == SyncStatus::Pending {
            state.status = SyncStatus::Synced;
        }
        Ok(item)
    }

    // =========================================================================
    // Sync cycle
    // =========================================================================

    /// Runs one push/pull cycle.
    ///
    /// Returns [`SyncOutcome::Skipped`] if a cycle is already in flight and
    /// [`SyncOutcome::Offline`] without touching the network when the probe
    /// reports offline. Errors are also emitted as `sync_error`.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        {
            let mut state = self.state();
            if state.in_flight {
                debug!("Sync already in flight, skipping");
                return Ok(SyncOutcome::Skipped);
            }
            if !self.probe.is_online() {
                debug!("Offline, deferring sync");
                state.status = SyncStatus::Pending;
                return Ok(SyncOutcome::Offline);
            }
            state.in_flight = true;
            state.status = SyncStatus::Syncing;
        }

        let mut guard = CycleGuard {
            state: &self.state,
            armed: true,
        };

        self.listeners.emit(|l| l.on_sync_start());

        let result = self.run_cycle().await;
        let remaining = self.outbox.pending_count().await;

        {
            let mut state = self.state();
            state.in_flight = false;
            state.status = match &result {
                Ok(_) if remaining == 0 => SyncStatus::Synced,
                Ok(_) => SyncStatus::Pending,
                Err(_) => SyncStatus::Error,
            };
            if result.is_ok() {
                state.last_sync = Some(Utc::now());
            }
        }
        guard.armed = false;

        match result {
            Ok(report) => {
                info!(
                    pushed = report.pushed,
                    applied = report.applied,
                    conflicts = report.conflicts,
                    failed = report.failed,
                    pulled = report.pulled,
                    remaining,
                    "Sync cycle complete"
                );
                self.listeners.emit(|l| l.on_sync_complete());
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                warn!(error = %e, remaining, "Sync cycle failed");
                self.listeners.emit(|l| l.on_sync_error(&e));
                Err(e)
            }
        }
    }

    async fn run_cycle(&self) -> SyncResult<SyncReport> {
        let batch = self.outbox.next_eligible_batch(Utc::now()).await;
        let mut report = SyncReport {
            pushed: batch.len(),
            ..Default::default()
        };
        let mut handled: HashSet<String> = HashSet::new();

        let outcome = self.push_and_pull(&batch, &mut report, &mut handled).await;

        if let Err(e) = outcome {
            let unsettled: Vec<String> = batch
                .iter()
                .map(|item| item.id().to_string())
                .filter(|id| !handled.contains(id))
                .collect();

            if !unsettled.is_empty() {
                match self.outbox.mark_failed_all(&unsettled, Utc::now()).await {
                    Ok(updated) => self.report_exhausted(&updated),
                    Err(mark_err) => {
                        warn!(error = %mark_err, "Failed to record failed attempts")
                    }
                }
            }
            return Err(e);
        }

        Ok(report)
    }

    async fn push_and_pull(
        &self,
        batch: &[OutboxItem],
        report: &mut SyncReport,
        handled: &mut HashSet<String>,
    ) -> SyncResult<()> {
        if !batch.is_empty() {
            let mutations: Vec<Mutation> = batch.iter().map(|item| item.mutation.clone()).collect();
            debug!(count = mutations.len(), "Pushing outbox batch");

            let response = self.transport.push(&mutations).await?;
            self.apply_push_results(batch, response.results, report, handled)
                .await?;
        }

        // No checkpoint yet: pull everything since the UNIX epoch.
        let since = self.checkpoint().await.unwrap_or_default();
        let pull = self
            .transport
            .pull(since, self.doc_types.as_deref())
            .await?;
        report.pulled = pull.documents.len();

        if !pull.documents.is_empty() {
            if let Some(applier) = &self.applier {
                applier.apply(&pull.documents).await?;
            }
        }

        self.advance_checkpoint(pull.server_time).await
    }

    async fn apply_push_results(
        &self,
        batch: &[OutboxItem],
        results: Vec<MutationResult>,
        report: &mut SyncReport,
        handled: &mut HashSet<String>,
    ) -> SyncResult<()> {
        let sent: HashMap<&str, &Mutation> = batch
            .iter()
            .map(|item| (item.id(), &item.mutation))
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut relevant: Vec<MutationResult> = Vec::with_capacity(results.len());
        for result in results {
            if !sent.contains_key(result.id.as_str()) {
                warn!(id = %result.id, "Ignoring result for a mutation that was not pushed");
                continue;
            }
            if seen.insert(result.id.clone()) {
                relevant.push(result);
            }
        }

        let mut settled = Vec::new();
        let mut failed = Vec::new();
        for result in &relevant {
            match &result.outcome {
                MutationOutcome::Applied => {
                    report.applied += 1;
                    settled.push(result.id.clone());
                }
                MutationOutcome::Conflict(_) => {
                    report.conflicts += 1;
                    settled.push(result.id.clone());
                }
                MutationOutcome::Failed(error) => {
                    debug!(id = %result.id, %error, "Server rejected mutation");
                    failed.push(result.id.clone());
                }
            }
        }

        let unmentioned: Vec<String> = batch
            .iter()
            .map(|item| item.id().to_string())
            .filter(|id| !seen.contains(id))
            .collect();
        if !unmentioned.is_empty() {
            warn!(
                count = unmentioned.len(),
                "Server returned no result for some pushed mutations"
            );
            failed.extend(unmentioned);
        }

        self.outbox.remove(&settled).await?;
        handled.extend(settled);

        report.failed = failed.len();
        let updated = self.outbox.mark_failed_all(&failed, Utc::now()).await?;
        handled.extend(failed);
        self.report_exhausted(&updated);

        let conflicts: Vec<Conflict> = extract_conflicts(&relevant)
            .into_iter()
            .filter_map(|result| {
                sent.get(result.id.as_str()).map(|local| Conflict {
                    local: (*local).clone(),
                    result,
                })
            })
            .collect();
        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "Server resolved conflicts");
            let handler = self
                .conflict_handler
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(handler) = handler {
                handler.on_conflicts(&conflicts);
            }
        }

        Ok(())
    }

    fn report_exhausted(&self, updated: &[OutboxItem]) {
        let exhausted: Vec<OutboxItem> = updated
            .iter()
            .filter(|item| !self.outbox.should_retry(item))
            .cloned()
            .collect();
        if !exhausted.is_empty() {
            self.listeners.emit(|l| l.on_retries_exhausted(&exhausted));
        }
    }

    async fn advance_checkpoint(&self, server_time: DateTime<Utc>) -> SyncResult<()> {
        let mut checkpoint = self.checkpoint.lock().await;
        if checkpoint.map_or(false, |current| server_time <= current) {
            debug!(%server_time, "Checkpoint not advanced");
            return Ok(());
        }

        self.store
            .set_item(CHECKPOINT_KEY, &server_time.to_rfc3339())
            .await?;
        *checkpoint = Some(server_time);
        debug!(%server_time, "Checkpoint advanced");
        Ok(())
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    /// Installs the conflict handler, replacing any previous one.
    pub fn set_conflict_handler(&self, handler: Arc<dyn ConflictHandler>) {
        *self
            .conflict_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Removes the conflict handler.
    pub fn clear_conflict_handler(&self) {
        *self
            .conflict_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Overrides a server resolution.
    ///
    /// - `KeepLocal` queues a copy of the local mutation under a new id and
    ///   the current time, so it wins the next comparison. No-op when the
    ///   local write already won.
    /// - `AcceptServer` hands the server's document (if it sent one) to the
    ///   document applier.
    pub async fn resolve_conflict(
        &self,
        conflict: &Conflict,
        choice: ConflictChoice,
    ) -> SyncResult<()> {
        match choice {
            ConflictChoice::KeepLocal => {
                if conflict.local_won() {
                    debug!(id = %conflict.local.id, "Local write already won");
                    return Ok(());
                }
                let reissued = conflict.local.reissue(Utc::now());
                info!(
                    original = %conflict.local.id,
                    reissued = %reissued.id,
                    "Re-asserting local write"
                );
                self.queue_mutation(reissued).await
            }
            ConflictChoice::AcceptServer => {
                let document = conflict
                    .resolution()
                    .and_then(|resolution| resolution.document.clone());
                match (document, &self.applier) {
                    (Some(document), Some(applier)) => applier.apply(&[document]).await,
                    _ => Ok(()),
                }
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Registers an event listener.
    pub fn subscribe(&self, listener: Arc<dyn SyncEventListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // =========================================================================
    // Auto-sync
    // =========================================================================

    /// Runs `sync()` every `interval` on a background task.
    ///
    /// The first tick fires one interval from now. Errors are logged and the
    /// timer keeps going. Returns false (and changes nothing) if auto-sync
    /// is already running or `interval` is zero. The task holds only a weak
    /// reference, so dropping the last `Arc` ends it.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("Refusing to start auto-sync with a zero interval");
            return false;
        }

        let mut slot = self.auto_sync.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map_or(false, |task| !task.handle.is_finished()) {
            debug!("Auto-sync already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(auto_sync_loop(
            Arc::downgrade(self),
            interval,
            cancel.clone(),
        ));

        info!(interval_ms = interval.as_millis() as u64, "Auto-sync started");
        *slot = Some(AutoSyncTask { cancel, handle });
        true
    }

    /// Stops auto-sync. A cycle already running finishes. Returns false if
    /// auto-sync was not running.
    pub fn stop_auto_sync(&self) -> bool {
        let task = self
            .auto_sync
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match task {
            Some(task) => {
                task.cancel.cancel();
                info!("Auto-sync stopped");
                !task.handle.is_finished()
            }
            None => false,
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }
}

async fn auto_sync_loop(
    orchestrator: Weak<SyncOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };

        match orchestrator.sync().await {
            Ok(outcome) => debug!(?outcome, "Auto-sync tick"),
            Err(e) => warn!(error = %e, "Auto-sync cycle failed"),
        }
    }

    debug!("Auto-sync task exited");
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self
            .auto_sync
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.cancel.cancel();
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`SyncOrchestrator`].
///
/// Only the transport is required. Defaults: in-memory storage, always
/// online, default retry policy, random device id, all document types.
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    probe: Option<Arc<dyn NetworkStatusProbe>>,
    retry_policy: Option<RetryPolicy>,
    conflict_handler: Option<Arc<dyn ConflictHandler>>,
    applier: Option<Arc<dyn DocumentApplier>>,
    device_id: Option<String>,
    doc_types: Option<Vec<String>>,
}

impl SyncOrchestratorBuilder {
    /// Applies device id, retry policy and document types from config.
    pub fn config(mut self, config: &SyncConfig) -> Self {
        self.device_id = Some(config.device.id.clone());
        self.retry_policy = Some(config.retry_policy());
        self.doc_types = config.sync.doc_types.clone();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn NetworkStatusProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn conflict_handler(mut self, handler: Arc<dyn ConflictHandler>) -> Self {
        self.conflict_handler = Some(handler);
        self
    }

    pub fn document_applier(mut self, applier: Arc<dyn DocumentApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Restricts pulls to these document types.
    pub fn doc_types(mut self, doc_types: Vec<String>) -> Self {
        self.doc_types = Some(doc_types);
        self
    }

    /// Restores the outbox and checkpoint and wires the probe.
    pub async fn build(self) -> SyncResult<Arc<SyncOrchestrator>> {
        let transport = self
            .transport
            .ok_or_else(|| SyncError::InvalidConfig("Transport required".into()))?;
        let store: Arc<dyn KeyValueStore> =
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let probe: Arc<dyn NetworkStatusProbe> =
            self.probe.unwrap_or_else(|| Arc::new(AlwaysOnline));
        let policy = self.retry_policy.unwrap_or_default();
        let device_id = self
            .device_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let outbox = Outbox::open(store.clone(), policy).await?;
        let checkpoint = load_checkpoint(store.as_ref()).await?;

        let listeners = Arc::new(Listeners::default());
        let relay = Arc::downgrade(&listeners);
        let connectivity = probe.on_change(Arc::new(move |online| {
            if let Some(listeners) = relay.upgrade() {
                listeners.emit(|l| l.on_offline_change(!online));
            }
        }));

        info!(
            device_id = %device_id,
            pending = outbox.pending_count().await,
            checkpoint = ?checkpoint,
            "Sync orchestrator ready"
        );

        Ok(Arc::new(SyncOrchestrator {
            transport,
            store,
            outbox,
            probe,
            applier: self.applier,
            conflict_handler: RwLock::new(self.conflict_handler),
            listeners,
            device_id,
            doc_types: self.doc_types,
            state: Mutex::new(EngineState {
                last_sync: checkpoint,
                ..EngineState::default()
            }),
            checkpoint: tokio::sync::Mutex::new(checkpoint),
            auto_sync: Mutex::new(None),
            _connectivity: connectivity,
        }))
    }
}

async fn load_checkpoint(store: &dyn KeyValueStore) -> SyncResult<Option<DateTime<Utc>>> {
    let Some(raw) = store.get_item(CHECKPOINT_KEY).await? else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|e| SyncError::CorruptState {
            key: CHECKPOINT_KEY.to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
