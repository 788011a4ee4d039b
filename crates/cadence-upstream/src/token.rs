//! Client-credentials access tokens.
//!
//! [`TokenCache`] holds one bearer token for the whole process and refreshes
//! it from a [`TokenSource`] once it reaches its margin-adjusted expiry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{Result, UpstreamError};

/// Time subtracted from the upstream `expires_in` before a token is
/// considered stale.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// TokenSource Trait
// ============================================================================

/// A token as returned by the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Something that can mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken>;
}

// ============================================================================
// ClientCredentials
// ============================================================================

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// OAuth 2.0 client-credentials grant against `<accounts_url>/api/token`.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        accounts_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: format!("{}/api/token", accounts_url.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<IssuedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| UpstreamError::Token(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Token(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Token(format!("unreadable token response: {}", e)))?;

        Ok(IssuedToken {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }
}

// ============================================================================
// TokenCache
// ============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Process-wide cache for a single bearer token.
///
/// Concurrent callers that all find the token stale may each refresh it;
/// the last write wins.
pub struct TokenCache<S> {
    source: S,
    margin: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_margin(source, DEFAULT_EXPIRY_MARGIN)
    }

    pub fn with_margin(source: S, margin: Duration) -> Self {
        Self {
            source,
            margin,
            cached: RwLock::new(None),
        }
    }

    /// Get a valid access token, fetching a new one if needed.
    pub async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && Instant::now() < token.expires_at
            {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Access token missing or stale, fetching");
        let issued = self.source.fetch_token().await?;
        let token = CachedToken {
            value: issued.access_token,
            expires_at: Instant::now() + issued.expires_in.saturating_sub(self.margin),
        };

        let value = token.value.clone();
        *self.cached.write().await = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
