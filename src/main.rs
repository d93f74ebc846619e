mod app;
mod core;

use crate::app::config::DEFAULT_CONFIG_PATH;
use crate::app::console::Console;
use crate::app::context::StartupContext;
use crate::app::shutdown::build_shutdown_pipeline;
use crate::app::startup::build_start_pipeline;
use anyhow::{Context, anyhow};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let cfg_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let startup_pipeline = build_start_pipeline(cfg_path)?;
    let startup_ctx = StartupContext::default();

    startup_pipeline
        .run(&startup_ctx)
        .await
        .context("Startup failed")?;
    info!("Startup successful");

    let console = Console::new(
        startup_ctx
            .identity
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("Identity provider missing after startup"))?,
        startup_ctx
            .controller
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("Sync controller missing after startup"))?,
        startup_ctx
            .layer_toggle
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("Layer toggle missing after startup"))?,
    );

    tokio::select! {
        result = console.run() => {
            if let Err(err) = result {
                error!("Console stopped: {:?}", err);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for sigint")?;
            info!("Interrupted");
        }
    }

    build_shutdown_pipeline()?
        .run(&startup_ctx)
        .await
        .context("Clean shutdown failed")?;

    Ok(())
}
