//! Last.fm passthrough client.
//!
//! Forwards `user.*` queries to the 2.0 REST endpoint with the server-held
//! API key and hands the upstream status and body back untouched.

use bytes::Bytes;
use reqwest::Client;

use crate::error::{Result, UpstreamError};

/// Default Last.fm 2.0 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Method used when the caller does not name one.
pub const DEFAULT_METHOD: &str = "user.getrecenttracks";

/// Largest page size Last.fm accepts for user methods.
pub const MAX_LIMIT: u32 = 200;

/// A validated passthrough query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastfmQuery {
    pub user: String,
    pub method: String,
    pub limit: u32,
}

impl LastfmQuery {
    /// Validate raw query parameters.
    ///
    /// `method` defaults to `user.getrecenttracks` and must be a `user.*`
    /// method. `limit` defaults to 1 and is clamped to `1..=200`.
    pub fn parse(user: Option<&str>, method: Option<&str>, limit: Option<&str>) -> Result<Self> {
        let user = user
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UpstreamError::InvalidRequest("Missing user parameter".to_string()))?;

        let method = method
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_METHOD)
            .to_ascii_lowercase();
        if !method.starts_with("user.") || method.len() == "user.".len() {
            return Err(UpstreamError::InvalidRequest(format!(
                "Unsupported method: {}",
                method
            )));
        }

        let limit = match limit.map(str::trim).filter(|l| !l.is_empty()) {
            None => 1,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| UpstreamError::InvalidRequest(format!("Invalid limit: {}", raw)))?
                .clamp(1, MAX_LIMIT as i64) as u32,
        };

        Ok(Self {
            user: user.to_string(),
            method,
            limit,
        })
    }
}

/// Upstream reply, passed through as-is.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Last.fm REST client holding the API key.
#[derive(Debug, Clone)]
pub struct LastfmClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl LastfmClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Forward a query and return the upstream reply unchanged.
    ///
    /// Only transport failures are errors; upstream 4xx/5xx are returned as
    /// a [`Forwarded`] with that status.
    pub async fn forward(&self, query: &LastfmQuery) -> Result<Forwarded> {
        let limit = query.limit.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("method", query.method.as_str()),
                ("user", query.user.as_str()),
                ("limit", limit.as_str()),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        tracing::debug!(
            method = %query.method,
            status,
            bytes = body.len(),
            "Last.fm reply"
        );

        Ok(Forwarded {
            status,
            content_type,
            body,
        })
    }
}
