//! Error types for the LLM crate.

use std::time::Duration;
use thiserror::Error;

use crate::chain::ModelFailure;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider specified).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Create a new rate limit info with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Parse rate limit info from a Groq error message.
    ///
    /// Groq returns messages like:
    /// "Rate limit reached... Please try again in 6.57792s."
    ///
    /// A `Retry-After` header, when present, wins over the message text.
    pub fn parse_groq(message: &str, retry_after_header: Option<&str>) -> Self {
        let retry_after = retry_after_header
            .and_then(parse_retry_after_header)
            .or_else(|| parse_groq_retry_after(message));

        Self {
            message: message.to_string(),
            retry_after,
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse Groq's "Please try again in Xs" format.
fn parse_groq_retry_after(message: &str) -> Option<Duration> {
    let patterns = ["try again in ", "Try again in ", "retry in "];

    for pattern in patterns {
        if let Some(idx) = message.find(pattern) {
            let rest = &message[idx + pattern.len()..];
            let num_str: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();

            if let Ok(seconds) = num_str.parse::<f64>() {
                return Some(Duration::from_secs_f64(seconds));
            }
        }
    }

    None
}

/// Parse a Retry-After header value given in seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmError
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Non-success response from the provider that fits no other class.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Provider returned a 5xx.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Network/connectivity error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid request parameters (includes unknown or retired models).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Every model in a [`crate::ModelChain`] failed.
    #[error("All {} models failed: {}", .0.len(), .0.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    AllModelsFailed(Vec<ModelFailure>),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Create a rate limit error from a message string.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Returns true if the next model in a fallback chain should be tried.
    ///
    /// Rate limits and server errors are per-model; auth and request errors
    /// would fail identically for every model.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Server { .. } | Self::Network(_)
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
