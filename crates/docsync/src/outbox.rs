//! # Outbox
//!
//! Durable, insertion-ordered queue of mutations waiting to reach the
//! server, with per-item retry bookkeeping.
//!
//! ## Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Outbox Item Lifecycle                          │
//! │                                                                         │
//! │  queue_mutation()                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────┐  push ok / conflict   ┌──────────┐                         │
//! │  │  Fresh  │ ────────────────────► │ removed  │                         │
//! │  └────┬────┘                       └──────────┘                         │
//! │       │ push failed                     ▲                               │
//! │       ▼                                 │ push ok / conflict            │
//! │  ┌─────────────────────┐                │                               │
//! │  │ Failed { n, at }    │ ───────────────┘                               │
//! │  │ eligible when       │                                                │
//! │  │ now - at ≥ delay(n) │                                                │
//! │  └────┬────────────────┘                                                │
//! │       │ n reaches give_up_after                                         │
//! │       ▼                                                                 │
//! │  ┌─────────────────────┐  requeue(id)  ──► Fresh                        │
//! │  │ exhausted (kept,    │                                                │
//! │  │ never auto-sent)    │  discard(id)  ──► removed                      │
//! │  └─────────────────────┘                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persistence
//! The whole queue is written under [`OUTBOX_KEY`] after every change,
//! before the call returns. A failed write leaves the in-memory queue as it
//! was. Read-modify-write cycles hold the queue's async mutex across the
//! write, so an `add()` racing a sync cycle cannot lose either update.

use chrono::{DateTime, Utc};
use docsync_core::validation::validate_mutation;
use docsync_core::{Mutation, OutboxItem, RetryPolicy};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::storage::{KeyValueStore, OUTBOX_KEY};

/// Durable mutation queue.
pub struct Outbox {
    store: Arc<dyn KeyValueStore>,
    policy: RetryPolicy,
    items: Mutex<Vec<OutboxItem>>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Outbox {
    /// Restores the queue from `store`.
    ///
    /// A missing key yields an empty queue. A payload that fails to decode
    /// is reported as [`SyncError::CorruptState`] rather than discarded.
    pub async fn open(store: Arc<dyn KeyValueStore>, policy: RetryPolicy) -> SyncResult<Self> {
        let items = match store.get_item(OUTBOX_KEY).await? {
            None => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<OutboxItem>>(&raw).map_err(|e| {
                SyncError::CorruptState {
                    key: OUTBOX_KEY.to_string(),
                    reason: e.to_string(),
                }
            })?,
        };

        info!(count = items.len(), "Outbox restored");

        Ok(Outbox {
            store,
            policy,
            items: Mutex::new(items),
        })
    }

    /// The retry policy consulted for eligibility.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Appends a mutation and persists. Only a blank identity field, a
    /// duplicate id or a storage failure is refused.
    pub async fn add(&self, mutation: Mutation) -> SyncResult<()> {
        validate_mutation(&mutation)?;

        let mut items = self.items.lock().await;

        if items.iter().any(|item| item.id() == mutation.id) {
            return Err(SyncError::DuplicateMutation { id: mutation.id });
        }

        debug!(
            id = %mutation.id,
            doc_type = %mutation.doc_type,
            doc_key = %mutation.doc_key,
            operation = %mutation.operation,
            "Queuing mutation"
        );

        let mut next = items.clone();
        next.push(OutboxItem::new(mutation));
        self.commit(&mut items, next).await
    }

    /// Items that may be sent at `now`, in insertion order.
    ///
    /// Never-attempted items are always eligible. Failed items are eligible
    /// once their backoff has elapsed, until they reach the give-up threshold.
    pub async fn next_eligible_batch(&self, now: DateTime<Utc>) -> Vec<OutboxItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| {
                self.policy
                    .is_due(item.retry_count(), item.last_attempt_at(), now)
            })
            .cloned()
            .collect()
    }

    /// Records one failed attempt for `id` and persists.
    ///
    /// Returns the new retry count, or `None` for an unknown id (no-op).
    pub async fn mark_failed(&self, id: &str, now: DateTime<Utc>) -> SyncResult<Option<u32>> {
        let failed = self.mark_failed_all(&[id.to_string()], now).await?;
        Ok(failed.first().map(OutboxItem::retry_count))
    }

    /// Records one failed attempt for each id with a single write.
    ///
    /// Unknown ids are skipped; duplicates in `ids` count once. Returns the
    /// updated items.
    pub async fn mark_failed_all(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> SyncResult<Vec<OutboxItem>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut items = self.items.lock().await;

        let mut next = items.clone();
        let mut updated = Vec::new();
        for item in next.iter_mut().filter(|item| wanted.contains(item.id())) {
            let count = item.record_failure(now);
            if !self.policy.should_retry(count) {
                warn!(
                    id = %item.id(),
                    retry_count = count,
                    "Mutation reached retry limit, parking until requeued"
                );
            }
            updated.push(item.clone());
        }

        if updated.is_empty() {
            return Ok(updated);
        }

        self.commit(&mut items, next).await?;
        Ok(updated)
    }

    /// Returns true while `item` is under the give-up threshold.
    pub fn should_retry(&self, item: &OutboxItem) -> bool {
        self.policy.should_retry(item.retry_count())
    }

    /// Deletes confirmed items and persists. Returns how many were removed.
    pub async fn remove(&self, ids: &[String]) -> SyncResult<usize> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut items = self.items.lock().await;

        let next: Vec<OutboxItem> = items
            .iter()
            .filter(|item| !doomed.contains(item.id()))
            .cloned()
            .collect();

        let removed = items.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }

        self.commit(&mut items, next).await?;
        debug!(removed, "Removed settled mutations from outbox");
        Ok(removed)
    }

    /// Queue size, including exhausted items.
    pub async fn pending_count(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Snapshot of the queue.
    pub async fn items(&self) -> Vec<OutboxItem> {
        self.items.lock().await.clone()
    }

    /// Items that reached the give-up threshold.
    pub async fn exhausted(&self) -> Vec<OutboxItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| !self.should_retry(item))
            .cloned()
            .collect()
    }

    /// Resets an item's retry bookkeeping so it is sent on the next cycle.
    pub async fn requeue(&self, id: &str) -> SyncResult<()> {
        let mut items = self.items.lock().await;

        let mut next = items.clone();
        let item = next
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| SyncError::ItemNotFound { id: id.to_string() })?;
        item.reset();

        self.commit(&mut items, next).await?;
        info!(id = %id, "Mutation requeued");
        Ok(())
    }

    /// Removes an item without sending it and returns it.
    pub async fn discard(&self, id: &str) -> SyncResult<OutboxItem> {
        let mut items = self.items.lock().await;

        let position = items
            .iter()
            .position(|item| item.id() == id)
            .ok_or_else(|| SyncError::ItemNotFound { id: id.to_string() })?;

        let mut next = items.clone();
        let discarded = next.remove(position);

        self.commit(&mut items, next).await?;
        warn!(id = %id, "Mutation discarded from outbox");
        Ok(discarded)
    }

    /// Persists `next` and only then makes it the live queue.
    async fn commit(&self, live: &mut Vec<OutboxItem>, next: Vec<OutboxItem>) -> SyncResult<()> {
        let payload = serde_json::to_string(&next)?;
        self.store.set_item(OUTBOX_KEY, &payload).await?;
        *live = next;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn note(key: &str) -> Mutation {
        Mutation::upsert("note", key, json!({"title": key}), "dev-a")
    }

    async fn outbox() -> (Arc<MemoryStore>, Outbox) {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::open(store.clone(), RetryPolicy::default())
            .await
            .unwrap();
        (store, outbox)
    }

    fn ids(items: &[OutboxItem]) -> Vec<String> {
        items.iter().map(|i| i.id().to_string()).collect()
    }

    /// Store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SyncError::StorageFailed("disk full".into()));
            }
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> SyncResult<()> {
            self.inner.remove_item(key).await
        }
    }

    #[tokio::test]
    async fn test_add_persists_in_order() {
        let (store, outbox) = outbox().await;
        let a = note("a");
        let b = note("b");

        outbox.add(a.clone()).await.unwrap();
        outbox.add(b.clone()).await.unwrap();

        assert_eq!(outbox.pending_count().await, 2);

        let raw = store.get_item(OUTBOX_KEY).await.unwrap().unwrap();
        let persisted: Vec<OutboxItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(ids(&persisted), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_and_duplicate() {
        let (_, outbox) = outbox().await;

        let bad = Mutation::upsert("", "a", json!({}), "dev-a");
        assert!(matches!(
            outbox.add(bad).await,
            Err(SyncError::InvalidMutation(_))
        ));

        let m = note("a");
        outbox.add(m.clone()).await.unwrap();
        assert!(matches!(
            outbox.add(m).await,
            Err(SyncError::DuplicateMutation { .. })
        ));
        assert_eq!(outbox.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_reopen_restores_queue() {
        let (store, outbox) = outbox().await;
        let m = note("a");
        outbox.add(m.clone()).await.unwrap();
        outbox.mark_failed(&m.id, Utc::now()).await.unwrap();
        drop(outbox);

        let reopened = Outbox::open(store, RetryPolicy::default()).await.unwrap();
        let items = reopened.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mutation, m);
        assert_eq!(items[0].retry_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(OUTBOX_KEY, "{not json").await.unwrap();

        let err = Outbox::open(store, RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CorruptState { .. }));
    }

    #[tokio::test]
    async fn test_eligibility_follows_backoff() {
        let (_, outbox) = outbox().await;
        let a = note("a");
        let b = note("b");
        outbox.add(a.clone()).await.unwrap();
        outbox.add(b.clone()).await.unwrap();

        let t0 = Utc::now();
        assert_eq!(outbox.mark_failed(&a.id, t0).await.unwrap(), Some(1));

        // a waits next_delay(1) = 2s; b is fresh
        let batch = outbox.next_eligible_batch(t0).await;
        assert_eq!(ids(&batch), vec![b.id.clone()]);

        let later = t0 + chrono::Duration::seconds(2);
        let batch = outbox.next_eligible_batch(later).await;
        assert_eq!(ids(&batch), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_mark_failed_unknown_is_noop() {
        let (store, outbox) = outbox().await;
        assert_eq!(outbox.mark_failed("ghost", Utc::now()).await.unwrap(), None);
        assert_eq!(store.get_item(OUTBOX_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_failed_all_counts_once() {
        let (_, outbox) = outbox().await;
        let a = note("a");
        outbox.add(a.clone()).await.unwrap();

        let updated = outbox
            .mark_failed_all(&[a.id.clone(), a.id.clone(), "ghost".into()], Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].retry_count(), 1);
    }

    #[tokio::test]
    async fn test_default_policy_gives_up_after_ten_failures() {
        let (_, outbox) = outbox().await;
        let a = note("a");
        outbox.add(a.clone()).await.unwrap();

        let now = Utc::now();
        let much_later = now + chrono::Duration::days(1);

        for attempt in 1..=9 {
            assert_eq!(outbox.mark_failed(&a.id, now).await.unwrap(), Some(attempt));
        }
        let items = outbox.items().await;
        assert!(outbox.should_retry(&items[0]));
        assert_eq!(ids(&outbox.next_eligible_batch(much_later).await), vec![a.id.clone()]);
        assert!(outbox.exhausted().await.is_empty());

        assert_eq!(outbox.mark_failed(&a.id, now).await.unwrap(), Some(10));
        let items = outbox.items().await;
        assert_eq!(items[0].retry_count(), 10);
        assert!(!outbox.should_retry(&items[0]));
        assert!(outbox.next_eligible_batch(much_later).await.is_empty());
        assert_eq!(outbox.pending_count().await, 1);
        assert_eq!(ids(&outbox.exhausted().await), vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn test_exhausted_requeue_and_discard() {
        let store = Arc::new(MemoryStore::new());
        let outbox = Outbox::open(store, RetryPolicy::from_millis(1, 1, 2))
            .await
            .unwrap();
        let a = note("a");
        let b = note("b");
        outbox.add(a.clone()).await.unwrap();
        outbox.add(b.clone()).await.unwrap();

        let now = Utc::now();
        outbox.mark_failed(&a.id, now).await.unwrap();
        outbox.mark_failed(&a.id, now).await.unwrap();
        outbox.mark_failed(&b.id, now).await.unwrap();
        outbox.mark_failed(&b.id, now).await.unwrap();

        let exhausted = outbox.exhausted().await;
        assert_eq!(ids(&exhausted), vec![a.id.clone(), b.id.clone()]);
        assert!(!outbox.should_retry(&exhausted[0]));

        // Exhausted items are kept but never eligible
        let much_later = now + chrono::Duration::days(1);
        assert!(outbox.next_eligible_batch(much_later).await.is_empty());
        assert_eq!(outbox.pending_count().await, 2);

        outbox.requeue(&a.id).await.unwrap();
        let batch = outbox.next_eligible_batch(much_later).await;
        assert_eq!(ids(&batch), vec![a.id.clone()]);
        assert!(batch[0].is_fresh());

        let gone = outbox.discard(&b.id).await.unwrap();
        assert_eq!(gone.mutation, b);
        assert_eq!(outbox.pending_count().await, 1);

        assert!(matches!(
            outbox.discard(&b.id).await,
            Err(SyncError::ItemNotFound { .. })
        ));
        assert!(matches!(
            outbox.requeue("ghost").await,
            Err(SyncError::ItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_, outbox) = outbox().await;
        let a = note("a");
        let b = note("b");
        outbox.add(a.clone()).await.unwrap();
        outbox.add(b.clone()).await.unwrap();

        assert_eq!(outbox.remove(&[a.id.clone(), "ghost".into()]).await.unwrap(), 1);
        assert_eq!(ids(&outbox.items().await), vec![b.id]);
        assert_eq!(outbox.remove(&[a.id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_queue_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let outbox = Outbox::open(store.clone(), RetryPolicy::default())
            .await
            .unwrap();
        let a = note("a");
        outbox.add(a.clone()).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);

        assert!(outbox.add(note("b")).await.unwrap_err().is_storage_error());
        assert!(outbox.mark_failed(&a.id, Utc::now()).await.is_err());
        assert!(outbox.remove(&[a.id.clone()]).await.is_err());

        let items = outbox.items().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_fresh());
    }

    #[tokio::test]
    async fn test_concurrent_adds_all_persist() {
        let (store, outbox) = outbox().await;
        let outbox = Arc::new(outbox);

        let mut handles = Vec::new();
        for i in 0..20 {
            let outbox = outbox.clone();
            handles.push(tokio::spawn(async move {
                outbox.add(note(&format!("k{}", i))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = store.get_item(OUTBOX_KEY).await.unwrap().unwrap();
        let persisted: Vec<OutboxItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 20);
    }
}
