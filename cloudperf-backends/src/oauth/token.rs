//! Access token lifecycle

use crate::error::{TransferError, TransferResult};
use cloudperf_resilience::{RetryExecutor, RetryPolicy};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Refresh this long before the provider's expiry hint
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// How client credentials reach the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthStyle {
    /// HTTP basic auth with the client id and secret
    BasicAuth,
    /// `client_id` and `client_secret` form fields
    RequestBody,
}

/// Provider token endpoint and client credentials
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_style: ClientAuthStyle,
}

/// Token endpoint response body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Current credentials of one session
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<Instant>,
}

impl TokenState {
    /// True when the access token is missing or about to expire
    pub fn needs_refresh(&self) -> bool {
        self.access_token.is_empty()
            || self
                .expires_at
                .is_some_and(|expires_at| Instant::now() + EXPIRY_MARGIN >= expires_at)
    }

    fn apply(&mut self, response: TokenResponse) {
        self.access_token = response.access_token;
        self.expires_at = response
            .expires_in
            .map(|seconds| Instant::now() + Duration::from_secs(seconds));
        if let Some(rotated) = response.refresh_token.filter(|token| !token.is_empty()) {
            self.refresh_token = rotated;
        }
    }
}

/// Bearer-token session against one provider
pub struct OAuthSession {
    client: reqwest::Client,
    endpoint: TokenEndpoint,
    state: RwLock<TokenState>,
    retry: RetryExecutor,
    cancel: CancellationToken,
    refreshes: AtomicU64,
}

impl OAuthSession {
    /// Session starting with an empty access token
    pub fn new(
        client: reqwest::Client,
        endpoint: TokenEndpoint,
        refresh_token: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            endpoint,
            state: RwLock::new(TokenState {
                refresh_token: refresh_token.into(),
                ..TokenState::default()
            }),
            retry: RetryExecutor::new(RetryPolicy::oauth()),
            cancel,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Override the refresh retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    /// Successful refreshes so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub async fn access_token(&self) -> String {
        self.state.read().await.access_token.clone()
    }

    pub async fn has_refresh_token(&self) -> bool {
        !self.state.read().await.refresh_token.is_empty()
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh_access_token(&self) -> TransferResult<()> {
        let mut state = self.state.write().await;
        if state.refresh_token.is_empty() {
            return Err(TransferError::Token("no refresh token configured".to_string()));
        }

        let refresh_token = state.refresh_token.clone();
        let response = self
            .retry
            .execute("oauth token refresh", &self.cancel, || self.request_token(&refresh_token))
            .await
            .map_err(TransferError::from_retry)?;

        let rotated = response
            .refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty() && token != refresh_token);
        state.apply(response);
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            token_endpoint = %self.endpoint.url,
            rotated,
            "Access token refreshed"
        );
        Ok(())
    }

    async fn request_token(&self, refresh_token: &str) -> TransferResult<TokenResponse> {
        let mut form = vec![("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        let mut request = self.client.post(&self.endpoint.url);

        match self.endpoint.auth_style {
            ClientAuthStyle::BasicAuth => {
                request = request.basic_auth(&self.endpoint.client_id, Some(&self.endpoint.client_secret));
            }
            ClientAuthStyle::RequestBody => {
                form.push(("client_id", self.endpoint.client_id.as_str()));
                form.push(("client_secret", self.endpoint.client_secret.as_str()));
            }
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| TransferError::Token(cloudperf_http::describe(&e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = cloudperf_http::body_snippet(response).await;
            return Err(TransferError::Token(format!(
                "token endpoint returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransferError::Token(format!("malformed token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(TransferError::Token("token response carried no access token".to_string()));
        }
        Ok(token)
    }

    /// Refresh first if the access token is missing or expiring
    pub async fn ensure_token(&self) -> TransferResult<()> {
        if self.state.read().await.needs_refresh() {
            debug!("Access token missing or expiring, refreshing");
            self.refresh_access_token().await?;
        }
        Ok(())
    }

    /// Send an authorized request built by `build`.
    ///
    /// A 401 triggers one refresh and one replay through a fresh builder, so
    /// any body must be buffered by the caller. Other statuses are returned
    /// for the caller to interpret.
    pub async fn send<F>(&self, operation: &str, build: F) -> TransferResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_token().await?;

        let response = self.send_once(operation, &build).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !self.has_refresh_token().await {
            return Ok(response);
        }
        drop(response);

        warn!(operation, "Access token rejected, refreshing and retrying once");
        self.refresh_access_token().await?;
        self.send_once(operation, &build).await
    }

    async fn send_once<F>(&self, operation: &str, build: &F) -> TransferResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.access_token().await;
        build()
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransferError::transport(operation, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_needs_refresh() {
        let mut state = TokenState::default();
        assert!(state.needs_refresh());

        state.apply(TokenResponse {
            access_token: "fresh".to_string(),
            token_type: Some("bearer".to_string()),
            expires_in: Some(14400),
            refresh_token: None,
            scope: None,
        });
        assert!(!state.needs_refresh());

        state.expires_at = Some(Instant::now() + Duration::from_secs(30));
        assert!(state.needs_refresh());
    }

    #[test]
    fn test_rotation_ignores_empty_refresh_token() {
        let mut state = TokenState {
            refresh_token: "original".to_string(),
            ..TokenState::default()
        };

        state.apply(TokenResponse {
            access_token: "a1".to_string(),
            token_type: None,
            expires_in: None,
            refresh_token: Some(String::new()),
            scope: None,
        });
        assert_eq!(state.refresh_token, "original");
        assert_eq!(state.expires_at, None);

        state.apply(TokenResponse {
            access_token: "a2".to_string(),
            token_type: None,
            expires_in: None,
            refresh_token: Some("rotated".to_string()),
            scope: None,
        });
        assert_eq!(state.refresh_token, "rotated");
        assert_eq!(state.access_token, "a2");
    }

    #[test]
    fn test_token_response_tolerates_missing_fields() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }
}
