//! Start command - launches the Cadence proxy.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use cadence_config::CadenceConfig;
use cadence_server::{AppState, Server};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Address to bind to, e.g. 0.0.0.0:8787 (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Directory holding config.toml (overrides default discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let loaded = super::load(args.config.as_deref())?;
    let config = apply_overrides(loaded.config, &args);

    if ctx.verbose {
        for path in loaded.sources.iter().filter(|s| s.loaded) {
            println!("Config: {}", path.path.display());
        }
    }

    let state = AppState::from_cadence_config(&config).context("failed to build server state")?;
    let server = Server::from_state(state);
    let addr = server.bind_address();

    if ctx.json_output {
        println!("{}", serde_json::json!({ "status": "starting", "addr": addr.to_string() }));
    } else {
        println!("Cadence proxy starting on http://{}", addr);
        println!("Press Ctrl+C to stop");
    }

    server.run_until(addr, shutdown_signal()).await?;
    Ok(())
}

fn apply_overrides(mut config: CadenceConfig, args: &StartArgs) -> CadenceConfig {
    if let Some(ref bind) = args.bind {
        config.server.get_or_insert_with(Default::default).bind = bind.clone();
    }
    config
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        // Without a signal handler the server runs until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
