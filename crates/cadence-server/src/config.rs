//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use cadence_config::CadenceConfig;

use crate::error::{Result, ServerError};

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8787";

/// Default lifetime of a cached Spotify image lookup (24 hours).
pub const DEFAULT_IMAGE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default lifetime of a cached summary (7 days).
pub const DEFAULT_SUMMARY_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default bound on each in-memory cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// `Cache-Control` max-age sent with image lookups, in seconds.
pub const IMAGE_LOOKUP_MAX_AGE: u64 = 3600;

/// Settings for the summary endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarySettings {
    /// Models tried in order.
    pub models: Vec<String>,
    /// Tracks beyond this are ignored.
    pub max_tracks: usize,
    /// How many leading tracks are enriched from Spotify.
    pub enrich_top_n: usize,
    /// How long the prompt waits for enrichment.
    pub enrich_timeout: Duration,
    /// Lifetime of a stored summary.
    pub cache_ttl: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-8b-instant".to_string(),
                "gemma2-9b-it".to_string(),
            ],
            max_tracks: 50,
            enrich_top_n: 5,
            enrich_timeout: Duration::from_millis(800),
            cache_ttl: DEFAULT_SUMMARY_CACHE_TTL,
            max_tokens: 120,
            temperature: 0.7,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Enable request logging.
    pub request_logging: bool,

    /// Extra CORS origins besides localhost.
    pub cors_origins: Vec<String>,

    /// Lifetime of a cached image lookup.
    pub image_cache_ttl: Duration,

    /// Most image lookups kept at once.
    pub image_cache_max_entries: usize,

    /// Most summaries kept by the in-memory store.
    pub summary_cache_max_entries: usize,

    /// Summary endpoint settings.
    pub summary: SummarySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8787)),
            request_logging: true,
            cors_origins: Vec::new(),
            image_cache_ttl: DEFAULT_IMAGE_CACHE_TTL,
            image_cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            summary_cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            summary: SummarySettings::default(),
        }
    }
}

impl ServerConfig {
    /// Create a server config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the loaded TOML configuration.
    pub fn from_config(config: &CadenceConfig) -> Result<Self> {
        let server = config.server_or_default();
        let spotify = config.spotify_or_default();
        let summary = config.summary_or_default();
        let cache = config.cache_or_default();

        let bind_address = server.bind.parse().map_err(|e| {
            ServerError::Config(format!("Invalid bind address '{}': {}", server.bind, e))
        })?;

        Ok(Self {
            bind_address,
            request_logging: server.request_logging,
            cors_origins: server.cors_origins,
            image_cache_ttl: Duration::from_secs(spotify.lookup_cache_ttl_secs),
            image_cache_max_entries: spotify.lookup_cache_max_entries,
            summary_cache_max_entries: cache.memory_max_entries,
            summary: SummarySettings {
                models: summary.models,
                max_tracks: summary.max_tracks,
                enrich_top_n: summary.enrich_top_n,
                enrich_timeout: Duration::from_millis(summary.enrich_timeout_ms),
                cache_ttl: Duration::from_secs(summary.cache_ttl_secs),
                max_tokens: summary.max_tokens,
                temperature: summary.temperature,
            },
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Set CORS allowed origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Set the image lookup cache lifetime.
    pub fn with_image_cache_ttl(mut self, ttl: Duration) -> Self {
        self.image_cache_ttl = ttl;
        self
    }

    /// Bound the image lookup cache and the in-memory summary store.
    pub fn with_cache_max_entries(mut self, images: usize, summaries: usize) -> Self {
        self.image_cache_max_entries = images;
        self.summary_cache_max_entries = summaries;
        self
    }

    /// Replace the summary settings.
    pub fn with_summary(mut self, summary: SummarySettings) -> Self {
        self.summary = summary;
        self
    }
}
