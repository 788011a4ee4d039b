//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use cadence_config::{
    CacheBackend, CadenceConfig, Secret, SecretSource, resolve_secret_with,
};
use cadence_llm::{LlmBackend, ModelChain, OpenAiBackend, OpenAiConfig, SharedBackend};
use cadence_upstream::{LastfmClient, SpotifyClient};
use tracing::{info, warn};

use crate::cache::{MemoryStore, SharedStore, SqliteStore, TtlCache};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Cached image lookups, keyed by normalized query.
pub type ImageCache = TtlCache<String, serde_json::Value>;

/// Application state shared across all handlers.
///
/// Each upstream client is `None` when its secrets are missing; the
/// operations that need it then answer 503.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Spotify catalog client. None without client id/secret.
    pub spotify: Option<Arc<SpotifyClient>>,

    /// Last.fm passthrough client. None without an API key.
    pub lastfm: Option<Arc<LastfmClient>>,

    /// Chat-completion backend for summaries. None without a Groq key.
    pub llm: Option<SharedBackend>,

    /// Models tried in order for each summary.
    pub chain: Arc<ModelChain>,

    /// Spotify lookup results.
    pub image_cache: Arc<ImageCache>,

    /// Generated summaries.
    pub summaries: SharedStore,
}

impl AppState {
    /// State with no upstream clients and an in-memory summary store.
    pub fn new(config: ServerConfig) -> Self {
        let chain = ModelChain::new(config.summary.models.iter().cloned());
        let image_cache =
            TtlCache::new(config.image_cache_ttl).with_max_entries(config.image_cache_max_entries);
        let summaries: SharedStore = Arc::new(
            MemoryStore::new(config.summary.cache_ttl)
                .with_max_entries(config.summary_cache_max_entries),
        );
        Self {
            config: Arc::new(config),
            spotify: None,
            lastfm: None,
            llm: None,
            chain: Arc::new(chain),
            image_cache: Arc::new(image_cache),
            summaries,
        }
    }

    /// Set the Spotify client.
    pub fn with_spotify(mut self, client: SpotifyClient) -> Self {
        self.spotify = Some(Arc::new(client));
        self
    }

    /// Set the Last.fm client.
    pub fn with_lastfm(mut self, client: LastfmClient) -> Self {
        self.lastfm = Some(Arc::new(client));
        self
    }

    /// Set the summary backend.
    pub fn with_llm(mut self, backend: impl LlmBackend + 'static) -> Self {
        self.llm = Some(Arc::new(backend));
        self
    }

    /// Set the summary backend from a shared handle.
    pub fn with_shared_llm(mut self, backend: SharedBackend) -> Self {
        self.llm = Some(backend);
        self
    }

    /// Replace the summary store.
    pub fn with_summary_store(mut self, store: SharedStore) -> Self {
        self.summaries = store;
        self
    }

    /// Build state from loaded configuration, reading secrets from the
    /// process environment first.
    pub fn from_cadence_config(config: &CadenceConfig) -> Result<Self> {
        Self::from_cadence_config_with(config, |var| std::env::var(var).ok())
    }

    /// Build state with an explicit environment lookup.
    pub fn from_cadence_config_with(
        config: &CadenceConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let server_config = ServerConfig::from_config(config)?;
        let mut state = Self::new(server_config);

        let secret = |s: Secret| {
            let resolved = resolve_secret_with(s, config, &env);
            if let Some(r) = &resolved
                && r.source == SecretSource::ConfigFile
            {
                warn!(
                    secret = s.env_var(),
                    "Secret read from plaintext config file; prefer the environment variable"
                );
            }
            resolved.map(|r| r.value)
        };

        let spotify = config.spotify_or_default();
        match (secret(Secret::SpotifyClientId), secret(Secret::SpotifyClientSecret)) {
            (Some(id), Some(client_secret)) => {
                let http = http_client(spotify.timeout_secs)?;
                state = state.with_spotify(SpotifyClient::with_credentials(
                    http,
                    &spotify.accounts_url,
                    &spotify.api_url,
                    id,
                    client_secret,
                ));
                info!("Spotify lookups enabled");
            }
            _ => warn!("Spotify credentials missing; image lookups and enrichment disabled"),
        }

        let lastfm = config.lastfm_or_default();
        match secret(Secret::LastfmApiKey) {
            Some(key) => {
                let http = http_client(lastfm.timeout_secs)?;
                state = state.with_lastfm(LastfmClient::new(http, lastfm.base_url, key));
                info!("Last.fm passthrough enabled");
            }
            None => warn!("LASTFM_API_KEY missing; Last.fm passthrough disabled"),
        }

        let summary = config.summary_or_default();
        match secret(Secret::GroqApiKey) {
            Some(key) => {
                let backend = OpenAiBackend::new(
                    OpenAiConfig::groq(key)
                        .with_base_url(summary.base_url)
                        .with_timeout(Duration::from_secs(summary.timeout_secs)),
                )?;
                state = state.with_llm(backend);
                info!(models = ?summary.models, "Summaries enabled");
            }
            None => warn!("GROQ_API_KEY missing; summaries disabled"),
        }

        let cache = config.cache_or_default();
        if cache.backend == CacheBackend::Sqlite {
            let path = cache.path.ok_or_else(|| {
                ServerError::Config("cache.path is required for the sqlite backend".to_string())
            })?;
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ServerError::Config(format!("Cannot create {}: {}", parent.display(), e))
                })?;
            }
            let store = SqliteStore::open(&path).map_err(|e| {
                ServerError::Config(format!("Cannot open {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), "Summary cache on SQLite");
            state = state.with_summary_store(Arc::new(store));
        }

        Ok(state)
    }

    /// Whether Spotify lookups are available.
    pub fn has_spotify(&self) -> bool {
        self.spotify.is_some()
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServerError::Internal(format!("Failed to build HTTP client: {}", e)))
}
