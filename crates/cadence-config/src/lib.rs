//! Configuration system for the Cadence proxy.
//!
//! Provides TOML-based configuration with:
//! - Per-upstream sections (`[spotify]`, `[lastfm]`, `[summary]`)
//! - Config file layering (XDG user config + project-local overrides)
//! - Secret resolution (env var → config file)
//!
//! Secrets are never required at load time. A missing secret only disables
//! the operations that need it.

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, Secret, SecretSource, resolve_secret, resolve_secret_with};
pub use types::*;
