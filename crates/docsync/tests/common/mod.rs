//! Shared helpers for the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync::core::{
    last_writer_wins, ConflictResolution, ConflictWinner, Document, Mutation, MutationResult,
    OutboxItem, PullResponse, PushResponse, RemoteError,
};
use docsync::{DocumentApplier, SyncError, SyncEventListener, SyncResult, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// =============================================================================
// Scripted transport
// =============================================================================

pub type PushStep = Box<dyn Fn(&[Mutation]) -> SyncResult<PushResponse> + Send + Sync>;
pub type PullStep = Box<dyn Fn(DateTime<Utc>) -> SyncResult<PullResponse> + Send + Sync>;

/// Transport that records calls and answers from a script.
///
/// With an empty script, pushes apply everything and pulls return no
/// documents stamped with the current time.
#[derive(Default)]
pub struct ScriptedTransport {
    pub push_calls: AtomicUsize,
    pub pull_calls: AtomicUsize,
    pub pushed: Mutex<Vec<Vec<Mutation>>>,
    pub pulled_since: Mutex<Vec<DateTime<Utc>>>,
    push_script: Mutex<VecDeque<PushStep>>,
    pull_script: Mutex<VecDeque<PullStep>>,
    hold_pulls: AtomicBool,
    pub pull_started: Notify,
    pub release_pull: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn then_push(&self, step: impl Fn(&[Mutation]) -> SyncResult<PushResponse> + Send + Sync + 'static) {
        self.push_script.lock().unwrap().push_back(Box::new(step));
    }

    pub fn then_pull(&self, step: impl Fn(DateTime<Utc>) -> SyncResult<PullResponse> + Send + Sync + 'static) {
        self.pull_script.lock().unwrap().push_back(Box::new(step));
    }

    /// Makes every pull wait for `release_pull` after signalling `pull_started`.
    pub fn hold_pulls(&self) {
        self.hold_pulls.store(true, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.pushes() + self.pulls()
    }

    pub fn last_since(&self) -> Option<DateTime<Utc>> {
        self.pulled_since.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn push(&self, mutations: &[Mutation]) -> SyncResult<PushResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.pushed.lock().unwrap().push(mutations.to_vec());

        let step = self.push_script.lock().unwrap().pop_front();
        match step {
            Some(step) => step(mutations),
            None => Ok(apply_all(mutations)),
        }
    }

    async fn pull(
        &self,
        since: DateTime<Utc>,
        _doc_types: Option<&[String]>,
    ) -> SyncResult<PullResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.pulled_since.lock().unwrap().push(since);

        if self.hold_pulls.load(Ordering::SeqCst) {
            self.pull_started.notify_one();
            self.release_pull.notified().await;
        }

        let step = self.pull_script.lock().unwrap().pop_front();
        match step {
            Some(step) => step(since),
            None => Ok(empty_pull(Utc::now())),
        }
    }
}

pub fn apply_all(mutations: &[Mutation]) -> PushResponse {
    PushResponse {
        results: mutations
            .iter()
            .map(|m| MutationResult::applied(m.id.clone()))
            .collect(),
    }
}

pub fn reject_all(mutations: &[Mutation]) -> PushResponse {
    PushResponse {
        results: mutations
            .iter()
            .map(|m| MutationResult::failed(m.id.clone(), RemoteError::with_code("E_BUSY", "try later")))
            .collect(),
    }
}

pub fn empty_pull(server_time: DateTime<Utc>) -> PullResponse {
    PullResponse {
        documents: vec![],
        server_time,
    }
}

pub fn offline_error() -> SyncError {
    SyncError::ConnectionFailed("connection refused".into())
}

// =============================================================================
// Recording listener
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Complete,
    Error(String),
    Offline(bool),
    Exhausted(Vec<String>),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl SyncEventListener for RecordingListener {
    fn on_sync_start(&self) {
        self.events.lock().unwrap().push(Event::Start);
    }

    fn on_sync_complete(&self) {
        self.events.lock().unwrap().push(Event::Complete);
    }

    fn on_sync_error(&self, error: &SyncError) {
        self.events.lock().unwrap().push(Event::Error(error.to_string()));
    }

    fn on_offline_change(&self, offline: bool) {
        self.events.lock().unwrap().push(Event::Offline(offline));
    }

    fn on_retries_exhausted(&self, items: &[OutboxItem]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Exhausted(items.iter().map(|i| i.id().to_string()).collect()));
    }
}

// =============================================================================
// Recording applier
// =============================================================================

#[derive(Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<Document>>,
    pub fail: AtomicBool,
}

impl RecordingApplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn documents(&self) -> Vec<Document> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentApplier for RecordingApplier {
    async fn apply(&self, documents: &[Document]) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::ApplyFailed("replica is read-only".into()));
        }
        self.applied.lock().unwrap().extend_from_slice(documents);
        Ok(())
    }
}

// =============================================================================
// In-process last-writer-wins server
// =============================================================================

/// Minimal server of record shared by several simulated devices.
#[derive(Default)]
pub struct LwwServer {
    documents: Mutex<HashMap<(String, String), (Document, DateTime<Utc>)>>,
}

impl LwwServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn document(&self, doc_type: &str, doc_key: &str) -> Option<Document> {
        self.documents
            .lock()
            .unwrap()
            .get(&(doc_type.to_string(), doc_key.to_string()))
            .map(|(doc, _)| doc.clone())
    }
}

#[async_trait]
impl Transport for LwwServer {
    async fn push(&self, mutations: &[Mutation]) -> SyncResult<PushResponse> {
        let mut documents = self.documents.lock().unwrap();
        let mut results = Vec::with_capacity(mutations.len());

        for mutation in mutations {
            let key = (mutation.doc_type.clone(), mutation.doc_key.clone());
            let incoming = Document::from_mutation(mutation);

            let result = match documents.get(&key) {
                None => {
                    documents.insert(key, (incoming, Utc::now()));
                    MutationResult::applied(mutation.id.clone())
                }
                Some((existing, _)) if existing.device_id == incoming.device_id => {
                    documents.insert(key, (incoming, Utc::now()));
                    MutationResult::applied(mutation.id.clone())
                }
                Some((existing, _)) => {
                    match last_writer_wins(incoming.updated_at, existing.updated_at) {
                        ConflictWinner::Incoming => {
                            documents.insert(key, (incoming.clone(), Utc::now()));
                            MutationResult::conflict(
                                mutation.id.clone(),
                                ConflictResolution {
                                    winner: ConflictWinner::Incoming,
                                    document: Some(incoming),
                                },
                            )
                        }
                        ConflictWinner::Existing => MutationResult::conflict(
                            mutation.id.clone(),
                            ConflictResolution {
                                winner: ConflictWinner::Existing,
                                document: Some(existing.clone()),
                            },
                        ),
                    }
                }
            };
            results.push(result);
        }

        Ok(PushResponse { results })
    }

    async fn pull(
        &self,
        since: DateTime<Utc>,
        _doc_types: Option<&[String]>,
    ) -> SyncResult<PullResponse> {
        let documents = self.documents.lock().unwrap();
        let server_time = Utc::now();

        Ok(PullResponse {
            documents: documents
                .values()
                .filter(|(_, stored_at)| *stored_at > since)
                .map(|(doc, _)| doc.clone())
                .collect(),
            server_time,
        })
    }
}
