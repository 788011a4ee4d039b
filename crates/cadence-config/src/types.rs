//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]     # bind address, CORS, request logging
//! [spotify]    # client-credentials image lookup
//! [lastfm]     # user query passthrough
//! [summary]    # Groq completion + fallback model list
//! [cache]      # summary store backend
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Placeholder printed instead of secret values.
pub const REDACTED: &str = "********";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Use the `*_or_default` accessors to
/// read a section with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// HTTP server settings.
    pub server: Option<ServerSection>,

    /// Spotify Web API settings.
    pub spotify: Option<SpotifyConfig>,

    /// Last.fm API settings.
    pub lastfm: Option<LastfmConfig>,

    /// AI summary generation settings.
    pub summary: Option<SummaryConfig>,

    /// Summary cache store settings.
    pub cache: Option<CacheConfig>,
}

impl CadenceConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale, not merged field by field.
    pub fn merge(&mut self, other: CadenceConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.spotify.is_some() {
            self.spotify = other.spotify;
        }
        if other.lastfm.is_some() {
            self.lastfm = other.lastfm;
        }
        if other.summary.is_some() {
            self.summary = other.summary;
        }
        if other.cache.is_some() {
            self.cache = other.cache;
        }
    }

    pub fn server_or_default(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    pub fn spotify_or_default(&self) -> SpotifyConfig {
        self.spotify.clone().unwrap_or_default()
    }

    pub fn lastfm_or_default(&self) -> LastfmConfig {
        self.lastfm.clone().unwrap_or_default()
    }

    pub fn summary_or_default(&self) -> SummaryConfig {
        self.summary.clone().unwrap_or_default()
    }

    pub fn cache_or_default(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let summary = self.summary_or_default();
        if summary.models.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "summary.models".to_string(),
                reason: "at least one model is required".to_string(),
            });
        }
        if summary.max_tracks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "summary.max_tracks".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let cache = self.cache_or_default();
        if cache.backend == CacheBackend::Sqlite && cache.path.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "cache.path".to_string(),
                reason: "required when cache.backend = \"sqlite\"".to_string(),
            });
        }

        self.server_or_default()
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "server.bind".to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Copy of this config with every secret value masked.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        let mut out = self.clone();
        if let Some(ref mut s) = out.spotify {
            s.client_id = mask(&s.client_id);
            s.client_secret = mask(&s.client_secret);
        }
        if let Some(ref mut l) = out.lastfm {
            l.api_key = mask(&l.api_key);
        }
        if let Some(ref mut s) = out.summary {
            s.api_key = mask(&s.api_key);
        }
        out
    }

    /// True if any section carries a secret in plaintext.
    pub fn has_plaintext_secrets(&self) -> bool {
        let spotify = self
            .spotify
            .as_ref()
            .is_some_and(|s| s.client_id.is_some() || s.client_secret.is_some());
        let lastfm = self.lastfm.as_ref().is_some_and(|l| l.api_key.is_some());
        let summary = self.summary.as_ref().is_some_and(|s| s.api_key.is_some());
        spotify || lastfm || summary
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Socket address to bind.
    pub bind: String,
    /// Origins allowed by CORS in addition to localhost.
    pub cors_origins: Vec<String>,
    /// Emit one structured log line per request.
    pub request_logging: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            cors_origins: Vec::new(),
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstreams
// ─────────────────────────────────────────────────────────────────────────────

/// `[spotify]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// Client id (prefer `SPOTIFY_CLIENT_ID`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Client secret (prefer `SPOTIFY_CLIENT_SECRET`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Accounts service base URL (token endpoint lives under `/api/token`).
    pub accounts_url: String,
    /// Web API base URL.
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// How long image lookup results stay cached.
    pub lookup_cache_ttl_secs: u64,
    /// Upper bound on cached image lookups.
    pub lookup_cache_max_entries: usize,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            accounts_url: "https://accounts.spotify.com".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            timeout_secs: 10,
            lookup_cache_ttl_secs: 24 * 60 * 60,
            lookup_cache_max_entries: 10_000,
        }
    }
}

/// `[lastfm]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastfmConfig {
    /// API key (prefer `LASTFM_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// REST endpoint.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LastfmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://ws.audioscrobbler.com/2.0/".to_string(),
            timeout_secs: 10,
        }
    }
}

/// `[summary]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Groq API key (prefer `GROQ_API_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// Models tried in order until one succeeds.
    pub models: Vec<String>,
    /// Tracks beyond this count are ignored.
    pub max_tracks: usize,
    /// How many leading tracks get release-year / mood enrichment.
    pub enrich_top_n: usize,
    /// Soft timeout for inline enrichment.
    pub enrich_timeout_ms: u64,
    /// TTL for cached summaries.
    pub cache_ttl_secs: u64,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-8b-instant".to_string(),
                "gemma2-9b-it".to_string(),
            ],
            max_tracks: 50,
            enrich_top_n: 5,
            enrich_timeout_ms: 800,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            max_tokens: 120,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Which summary store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map; lost on restart.
    #[default]
    Memory,
    /// SQLite file at `cache.path`.
    Sqlite,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Upper bound on summaries held by the memory backend.
    pub memory_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: None,
            memory_max_entries: 10_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
