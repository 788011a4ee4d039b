//! Config command - shows what the server would run with.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use cadence_config::{CadenceConfig, LoadedConfig, Secret, resolve_secret};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Directory holding config.toml (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    let loaded = super::load(args.config.as_deref())?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report(&loaded))?);
        return Ok(());
    }

    println!("# Cadence Configuration\n");

    println!("Config file search order (later overrides earlier):");
    for source in &loaded.sources {
        let status = if source.loaded { "✓ loaded" } else { "· not found" };
        println!("  {} {}", status, source.path.display());
    }
    println!();

    println!("Secrets:");
    for (secret, source) in secret_sources(&loaded.config) {
        println!(
            "  {:<22} {}",
            secret.env_var(),
            source.unwrap_or_else(|| "missing".to_string())
        );
    }
    println!();

    println!("---\nResolved config (secrets redacted):\n");
    println!("{}", loaded.config.redacted().to_toml()?);

    Ok(())
}

fn secret_sources(config: &CadenceConfig) -> Vec<(Secret, Option<String>)> {
    Secret::ALL
        .iter()
        .map(|&s| (s, resolve_secret(s, config).map(|r| r.source.to_string())))
        .collect()
}

fn report(loaded: &LoadedConfig) -> serde_json::Value {
    let secrets: serde_json::Map<_, _> = secret_sources(&loaded.config)
        .into_iter()
        .map(|(secret, source)| (secret.env_var().to_string(), serde_json::json!(source)))
        .collect();
    let files: Vec<_> = loaded
        .loaded_from()
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    serde_json::json!({
        "files": files,
        "secrets": secrets,
        "config": loaded.config.redacted(),
    })
}
