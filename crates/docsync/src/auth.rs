//! # Authentication Tokens
//!
//! The HTTP transport asks a [`TokenProvider`] for a bearer token before
//! every request. Where tokens come from is the host's business.
//!
//! ## Token Refresh
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CachedTokenProvider::token()                         │
//! │                                                                         │
//! │  read lock ── cached & not near expiry? ──► return cached               │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  write lock ── re-check (another task may have refreshed) ──► return    │
//! │      │                                                                  │
//! │      ├── cached & not yet expired ──► source.refresh(&cached)           │
//! │      │        │ ok ──► store, return                                    │
//! │      │        │ err ──► fall through                                    │
//! │      ▼                                                                  │
//! │  source.fetch() ──► store, return                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Refresh starts 5 minutes before expiry so in-flight requests never carry
//! a token that expires mid-call.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Margin before token expiration to trigger refresh (5 minutes).
pub const REFRESH_MARGIN_SECS: u64 = 300;

/// Supplies bearer tokens for outgoing requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for at least the next request.
    async fn token(&self) -> SyncResult<String>;

    /// Drops any cached token, e.g. after the server answered 401.
    async fn invalidate(&self) {}
}

// =============================================================================
// StaticToken
// =============================================================================

/// A fixed token from configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> SyncResult<String> {
        if self.0.is_empty() {
            return Err(SyncError::Unauthorized("no auth token configured".into()));
        }
        Ok(self.0.clone())
    }
}

// =============================================================================
// Cached tokens
// =============================================================================

/// A token together with its lifetime.
#[derive(Clone)]
pub struct TokenInfo {
    pub access_token: String,
    /// When the access token expires (monotonic clock).
    pub expires_at: Instant,
    /// Refresh credential, if the source issues one.
    pub refresh_token: Option<String>,
}

impl TokenInfo {
    /// A token that expires `ttl` from now.
    pub fn expiring_in(access_token: impl Into<String>, ttl: Duration) -> Self {
        TokenInfo {
            access_token: access_token.into(),
            expires_at: Instant::now() + ttl,
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Check if the token is expired or about to expire.
    pub fn needs_refresh(&self) -> bool {
        Instant::now() + Duration::from_secs(REFRESH_MARGIN_SECS) >= self.expires_at
    }

    /// Check if the token is completely expired (no grace period).
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining validity in whole seconds.
    pub fn remaining_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

impl std::fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInfo")
            .field("remaining_secs", &self.remaining_secs())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Where fresh tokens come from (login endpoint, OS keychain, ...).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtains a brand-new token.
    async fn fetch(&self) -> SyncResult<TokenInfo>;

    /// Renews the given token. Defaults to a fresh fetch.
    async fn refresh(&self, _current: &TokenInfo) -> SyncResult<TokenInfo> {
        self.fetch().await
    }
}

/// Caches tokens from a [`TokenSource`] and refreshes them near expiry.
pub struct CachedTokenProvider<S> {
    source: S,
    token: RwLock<Option<TokenInfo>>,
}

impl<S: TokenSource> CachedTokenProvider<S> {
    pub fn new(source: S) -> Self {
        CachedTokenProvider {
            source,
            token: RwLock::new(None),
        }
    }

    /// Current token info, without triggering a refresh.
    pub async fn current(&self) -> Option<TokenInfo> {
        self.token.read().await.clone()
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for CachedTokenProvider<S> {
    async fn token(&self) -> SyncResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }

            if !token.is_expired() {
                match self.source.refresh(token).await {
                    Ok(fresh) => {
                        info!(expires_in_secs = fresh.remaining_secs(), "Token refreshed");
                        let access_token = fresh.access_token.clone();
                        *guard = Some(fresh);
                        return Ok(access_token);
                    }
                    Err(e) => warn!(?e, "Token refresh failed, fetching a new token"),
                }
            }
        }

        let fresh = self.source.fetch().await?;
        debug!(expires_in_secs = fresh.remaining_secs(), "Token fetched");
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    async fn invalidate(&self) {
        *self.token.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    #[async_trait]
    impl TokenSource for Arc<CountingSource> {
        async fn fetch(&self) -> SyncResult<TokenInfo> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenInfo::expiring_in(format!("fetched-{}", n), Duration::from_secs(3600))
                .with_refresh_token("r"))
        }

        async fn refresh(&self, current: &TokenInfo) -> SyncResult<TokenInfo> {
            assert_eq!(current.refresh_token.as_deref(), Some("r"));
            if self.fail_refresh {
                return Err(SyncError::Unauthorized("refresh revoked".into()));
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenInfo::expiring_in(format!("refreshed-{}", n), Duration::from_secs(3600))
                .with_refresh_token("r"))
        }
    }

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").token().await.unwrap(), "abc");
        assert!(matches!(
            StaticToken::new("").token().await,
            Err(SyncError::Unauthorized(_))
        ));
        assert_eq!(format!("{:?}", StaticToken::new("abc")), "StaticToken(***)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_reused_until_margin() {
        let source = Arc::new(CountingSource::default());
        let provider = CachedTokenProvider::new(source.clone());

        assert_eq!(provider.token().await.unwrap(), "fetched-1");
        assert_eq!(provider.token().await.unwrap(), "fetched-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // Inside the refresh margin but not yet expired
        tokio::time::advance(Duration::from_secs(3600 - REFRESH_MARGIN_SECS + 1)).await;
        assert_eq!(provider.token().await.unwrap(), "refreshed-1");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_refetched() {
        let source = Arc::new(CountingSource::default());
        let provider = CachedTokenProvider::new(source.clone());

        provider.token().await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;

        assert_eq!(provider.token().await.unwrap(), "fetched-2");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_falls_back_to_fetch() {
        let source = Arc::new(CountingSource {
            fail_refresh: true,
            ..Default::default()
        });
        let provider = CachedTokenProvider::new(source.clone());

        provider.token().await.unwrap();
        tokio::time::advance(Duration::from_secs(3500)).await;
        assert_eq!(provider.token().await.unwrap(), "fetched-2");
    }

    struct FetchOnly(AtomicUsize);

    #[async_trait]
    impl TokenSource for Arc<FetchOnly> {
        async fn fetch(&self) -> SyncResult<TokenInfo> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenInfo::expiring_in(format!("fetched-{}", n), Duration::from_secs(3600)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_refresh_fetches_again() {
        let source = Arc::new(FetchOnly(AtomicUsize::new(0)));
        let provider = CachedTokenProvider::new(source.clone());

        assert_eq!(provider.token().await.unwrap(), "fetched-1");
        tokio::time::advance(Duration::from_secs(3600 - REFRESH_MARGIN_SECS + 1)).await;
        assert_eq!(provider.token().await.unwrap(), "fetched-2");
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fetch() {
        let source = Arc::new(CountingSource::default());
        let provider = CachedTokenProvider::new(source.clone());

        provider.token().await.unwrap();
        provider.invalidate().await;
        assert!(provider.current().await.is_none());
        assert_eq!(provider.token().await.unwrap(), "fetched-2");
    }
}
