//! Secret resolution for upstream credentials.
//!
//! Resolution order:
//! 1. Environment variable
//! 2. Config file (with warning)

use crate::CadenceConfig;

/// Result of secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// The upstream credentials the proxy holds on behalf of the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Secret {
    SpotifyClientId,
    SpotifyClientSecret,
    LastfmApiKey,
    GroqApiKey,
}

impl Secret {
    /// Every known secret, in display order.
    pub const ALL: [Secret; 4] = [
        Secret::SpotifyClientId,
        Secret::SpotifyClientSecret,
        Secret::LastfmApiKey,
        Secret::GroqApiKey,
    ];

    /// Environment variable holding this secret.
    pub fn env_var(&self) -> &'static str {
        match self {
            Secret::SpotifyClientId => "SPOTIFY_CLIENT_ID",
            Secret::SpotifyClientSecret => "SPOTIFY_CLIENT_SECRET",
            Secret::LastfmApiKey => "LASTFM_API_KEY",
            Secret::GroqApiKey => "GROQ_API_KEY",
        }
    }

    /// The plaintext value from the config file, if any.
    pub fn config_value<'a>(&self, config: &'a CadenceConfig) -> Option<&'a str> {
        match self {
            Secret::SpotifyClientId => config.spotify.as_ref()?.client_id.as_deref(),
            Secret::SpotifyClientSecret => config.spotify.as_ref()?.client_secret.as_deref(),
            Secret::LastfmApiKey => config.lastfm.as_ref()?.api_key.as_deref(),
            Secret::GroqApiKey => config.summary.as_ref()?.api_key.as_deref(),
        }
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_var())
    }
}

/// Resolve a secret from the process environment, then the config file.
pub fn resolve_secret(secret: Secret, config: &CadenceConfig) -> Option<ResolvedSecret> {
    resolve_secret_with(secret, config, |var| std::env::var(var).ok())
}

/// Resolve a secret with an explicit environment lookup.
///
/// Empty values are treated as absent at every layer.
pub fn resolve_secret_with(
    secret: Secret,
    config: &CadenceConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<ResolvedSecret> {
    let env_var = secret.env_var();
    if let Some(value) = env(env_var)
        && !value.trim().is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    secret
        .config_value(config)
        .filter(|v| !v.trim().is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
