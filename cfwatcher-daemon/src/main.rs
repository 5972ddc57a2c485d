use anyhow::Result;
use clap::Parser;

use cfwatcher_daemon::cli::DaemonCli;
use cfwatcher_daemon::{app, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = app::load_config(&cli).await?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cf-watcher starting");
    if !cli.config.exists() {
        tracing::warn!(
            path = %cli.config.display(),
            "config file not found, using defaults and environment"
        );
    }

    app::run(&config, cli.container.as_deref()).await?;

    tracing::info!("cf-watcher shut down");
    Ok(())
}
