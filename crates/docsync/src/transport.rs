//! # Transport
//!
//! The narrow network boundary of the engine: push a batch of mutations,
//! pull documents changed since a checkpoint. Implementations return errors,
//! never malformed successes.
//!
//! ## HTTP Wire Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST {base}/sync/push     body: {"mutations": [...]}                   │
//! │                            200:  {"results": [{id, success, error?,     │
//! │                                   conflictResolution?}]}                │
//! │                                                                         │
//! │  GET  {base}/sync/pull?since=<rfc3339>&docTypes=a,b                     │
//! │                            200:  {"documents": [...],                   │
//! │                                   "serverTime": "<rfc3339>"}            │
//! │                                                                         │
//! │  POST {base}/sync          body: {"mutations", "pullSince", "docTypes"} │
//! │                            200:  {"push": {...}, "pull": {...}}         │
//! │                                                                         │
//! │  Every request: Authorization: Bearer <token>                           │
//! │  401/403 → Unauthorized   other non-2xx → Http { status, message }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use docsync_core::{
    FullSyncRequest, FullSyncResponse, Mutation, PullResponse, PushRequest, PushResponse,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{StaticToken, TokenProvider};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Push/pull calls against the server of record.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends mutations in order and returns one result per mutation.
    async fn push(&self, mutations: &[Mutation]) -> SyncResult<PushResponse>;

    /// Returns documents changed after `since`, optionally filtered by type.
    async fn pull(
        &self,
        since: DateTime<Utc>,
        doc_types: Option<&[String]>,
    ) -> SyncResult<PullResponse>;

    /// Push then pull in one exchange. Defaults to two calls.
    async fn full_sync(
        &self,
        mutations: &[Mutation],
        pull_since: DateTime<Utc>,
        doc_types: Option<&[String]>,
    ) -> SyncResult<FullSyncResponse> {
        let push = if mutations.is_empty() {
            PushResponse::default()
        } else {
            self.push(mutations).await?
        };
        let pull = self.pull(pull_since, doc_types).await?;
        Ok(FullSyncResponse { push, pull })
    }
}

// =============================================================================
// HttpTransport
// =============================================================================

/// JSON-over-HTTP transport built on reqwest.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url`.
    ///
    /// `https://host/api` and `https://host/api/` are equivalent.
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "expected http:// or https://, got {}",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            base_url,
            tokens,
            timeout,
        })
    }

    /// Builds a transport from `[server]` settings with a static token.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let url = config
            .server_url()
            .ok_or_else(|| SyncError::InvalidConfig("server.url is not set".into()))?;
        let token = StaticToken::new(config.server.auth_token.clone().unwrap_or_default());

        Self::new(url, Arc::new(token), config.request_timeout())
    }

    /// The normalised base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let token = self.tokens.token().await?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);

            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                self.tokens.invalidate().await;
                return Err(SyncError::Unauthorized(message));
            }

            warn!(status = status.as_u16(), %message, "Sync request rejected");
            return Err(SyncError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(e))?;

        serde_json::from_slice(&bytes).map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    fn map_send_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn push(&self, mutations: &[Mutation]) -> SyncResult<PushResponse> {
        let url = self.endpoint("sync/push")?;
        debug!(count = mutations.len(), %url, "Pushing mutations");

        let body = PushRequest {
            mutations: mutations.to_vec(),
        };
        self.send(self.client.post(url).json(&body)).await
    }

    async fn pull(
        &self,
        since: DateTime<Utc>,
        doc_types: Option<&[String]>,
    ) -> SyncResult<PullResponse> {
        let mut url = self.endpoint("sync/pull")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Millis, true));
            if let Some(types) = doc_types.filter(|types| !types.is_empty()) {
                query.append_pair("docTypes", &types.join(","));
            }
        }
        debug!(%url, "Pulling documents");

        self.send(self.client.get(url)).await
    }

    async fn full_sync(
        &self,
        mutations: &[Mutation],
        pull_since: DateTime<Utc>,
        doc_types: Option<&[String]>,
    ) -> SyncResult<FullSyncResponse> {
        let url = self.endpoint("sync")?;
        debug!(count = mutations.len(), %url, "Full sync");

        let body = FullSyncRequest {
            mutations: mutations.to_vec(),
            pull_since,
            doc_types: doc_types.map(<[String]>::to_vec),
        };
        self.send(self.client.post(url).json(&body)).await
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> SyncResult<HttpTransport> {
        HttpTransport::new(base, Arc::new(StaticToken::new("t")), Duration::from_secs(5))
    }

    #[test]
    fn test_base_url_normalised() {
        let a = transport("https://sync.example.com/api").unwrap();
        let b = transport("https://sync.example.com/api/").unwrap();
        assert_eq!(a.base_url(), b.base_url());
        assert_eq!(
            a.endpoint("sync/push").unwrap().as_str(),
            "https://sync.example.com/api/sync/push"
        );
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(matches!(
            transport("ftp://example.com"),
            Err(SyncError::InvalidUrl(_))
        ));
        assert!(transport("not a url").is_err());
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = SyncConfig::default();
        assert!(matches!(
            HttpTransport::from_config(&config),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_parse_api_error() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"message":" bad batch "}"#),
            "bad batch"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"nope"}"#),
            "nope"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "upstream"), "upstream");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }
}
