//! Daemon assembly -- configuration loading and the watch / one-shot modes.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use cfwatcher_core::config::CfWatcherConfig;
use cfwatcher_ingress::{
    BollardDockerClient, CloudflareClient, DockerClient, Reconciler, ReconcilerConfig, Watcher,
};

use crate::cli::DaemonCli;
use crate::metrics_server;

/// Loads the configuration with precedence CLI > environment > file > defaults.
///
/// A missing config file falls back to defaults; any other read or parse
/// failure is an error. The result is validated.
pub async fn load_config(cli: &DaemonCli) -> Result<CfWatcherConfig> {
    CfWatcherConfig::load_with(&cli.config, |config| cli.apply_overrides(config))
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))
}

/// Connects to Docker and Cloudflare, then either reconciles `container` once
/// or watches events until Ctrl-C.
///
/// # Errors
///
/// Setup failures, a failed one-shot reconciliation, or the end of the Docker
/// event stream with an error.
pub async fn run(config: &CfWatcherConfig, container: Option<&str>) -> Result<()> {
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let docker = Arc::new(BollardDockerClient::connect(&config.docker.socket)?);
    if let Err(e) = docker.ping().await {
        warn!(error = %e, "docker daemon not reachable, continuing");
    }

    let api = Arc::new(CloudflareClient::new(&config.cloudflare)?);
    let reconciler = Reconciler::new(docker, api, ReconcilerConfig::from_core(config));

    if let Some(container) = container {
        let outcome = reconciler.reconcile_container(container).await;
        info!(container = %container, outcome = %outcome, "reconciliation finished");
        if outcome.is_failure() {
            anyhow::bail!("reconciliation of {container} failed: {outcome}");
        }
        return Ok(());
    }

    let watcher = Watcher::new(reconciler);
    watcher.run_until(shutdown_signal()).await?;
    info!(
        events = watcher.events_processed(),
        routes = watcher.routes_published(),
        failures = watcher.failures(),
        "watcher stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
