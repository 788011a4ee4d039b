//! Error types for the upstream clients.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Errors that can occur talking to Spotify or Last.fm.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream API returned a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Caller-supplied parameters were rejected before any network call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client-credentials exchange failed.
    #[error("Token request failed: {0}")]
    Token(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Response body did not have the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl UpstreamError {
    /// Upstream status code, if the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Serialization(e.to_string())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(e: serde_json::Error) -> Self {
        UpstreamError::Serialization(e.to_string())
    }
}
