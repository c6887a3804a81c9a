//! # Network Status Probes
//!
//! Connectivity is an input to the engine, never something it guesses from
//! failed requests. A probe answers "are we online right now?" and calls
//! listeners when the answer changes.
//!
//! ```text
//! platform callback ──► ManualNetworkProbe::set_online(bool) ──┐
//!                                                              │ on change
//! ReachabilityProbe (TCP connect every N s) ──► set_online ────┤
//!                                                              ▼
//!                                         listeners (orchestrator emits
//!                                         offline_change to subscribers)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// Callback receiving the new online state.
pub type ConnectivityListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Reports connectivity and notifies on change.
pub trait NetworkStatusProbe: Send + Sync {
    /// Current connectivity.
    fn is_online(&self) -> bool;

    /// Registers a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    fn on_change(&self, listener: ConnectivityListener) -> Subscription;
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle to a registered listener; detaches it on drop.
#[must_use = "dropping a Subscription detaches the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Subscription {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Subscription { detach: None }
    }

    /// Detaches the listener now.
    pub fn unsubscribe(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

// =============================================================================
// AlwaysOnline
// =============================================================================

/// Probe for hosts without connectivity information. Never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatusProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }

    fn on_change(&self, _listener: ConnectivityListener) -> Subscription {
        Subscription::noop()
    }
}

// =============================================================================
// ManualNetworkProbe
// =============================================================================

#[derive(Default)]
struct ProbeState {
    online: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, ConnectivityListener>>,
}

impl ProbeState {
    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, ConnectivityListener>> {
        // A panicking listener never runs under this lock, so a poisoned
        // map is still consistent.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Probe whose state is pushed in by the host.
///
/// Clones share state. Listeners run synchronously on the caller of
/// [`set_online`](Self::set_online), outside the listener lock.
#[derive(Clone)]
pub struct ManualNetworkProbe {
    state: Arc<ProbeState>,
}

impl ManualNetworkProbe {
    pub fn new(online: bool) -> Self {
        let state = ProbeState::default();
        state.online.store(online, Ordering::SeqCst);
        ManualNetworkProbe {
            state: Arc::new(state),
        }
    }

    /// Sets connectivity; listeners fire only if it actually changed.
    pub fn set_online(&self, online: bool) {
        let previous = self.state.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        info!(online, "Connectivity changed");

        let listeners: Vec<ConnectivityListener> =
            self.state.listeners().values().cloned().collect();
        for listener in listeners {
            listener(online);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.listeners().len()
    }
}

impl Default for ManualNetworkProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ManualNetworkProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualNetworkProbe")
            .field("online", &self.is_online())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NetworkStatusProbe for ManualNetworkProbe {
    fn is_online(&self) -> bool {
        self.state.online.load(Ordering::SeqCst)
    }

    fn on_change(&self, listener: ConnectivityListener) -> Subscription {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.listeners().insert(id, listener);

        let weak: Weak<ProbeState> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                state.listeners().remove(&id);
            }
        })
    }
}

// =============================================================================
// ReachabilityProbe
// =============================================================================

/// Polls the server with a TCP connect and reports the result.
///
/// Starts optimistic (online) until the first check completes. The polling
/// task stops when the probe is dropped.
pub struct ReachabilityProbe {
    inner: ManualNetworkProbe,
    cancel: CancellationToken,
}

impl ReachabilityProbe {
    /// Starts polling the host and port of `server_url`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(server_url: &url::Url, interval: Duration, timeout: Duration) -> SyncResult<Self> {
        let host = server_url
            .host_str()
            .ok_or_else(|| SyncError::InvalidUrl(format!("{} has no host", server_url)))?
            .to_string();
        let port = server_url.port_or_known_default().ok_or_else(|| {
            SyncError::InvalidUrl(format!("{} has no port", server_url))
        })?;

        let inner = ManualNetworkProbe::new(true);
        let cancel = CancellationToken::new();

        tokio::spawn(poll_reachability(
            inner.clone(),
            host,
            port,
            interval,
            timeout,
            cancel.clone(),
        ));

        Ok(ReachabilityProbe { inner, cancel })
    }
}

async fn poll_reachability(
    probe: ManualNetworkProbe,
    host: String,
    port: u16,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    debug!(host = %host, port, "Reachability probe started");

    loop {
        let reachable = matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await,
            Ok(Ok(_))
        );
        probe.set_online(reachable);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(host = %host, port, "Reachability probe stopped");
}

impl Drop for ReachabilityProbe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl NetworkStatusProbe for ReachabilityProbe {
    fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    fn on_change(&self, listener: ConnectivityListener) -> Subscription {
        self.inner.on_change(listener)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
