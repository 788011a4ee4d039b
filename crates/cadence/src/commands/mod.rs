//! CLI command handlers.

pub mod config;
pub mod start;

use std::path::Path;

use anyhow::Result;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Discover and merge config layers, optionally from an explicit user
/// config directory.
pub fn load(config_dir: Option<&Path>) -> Result<cadence_config::LoadedConfig> {
    let loaded = cadence_config::load_config_with_options(None, config_dir)?;
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(loaded)
}
