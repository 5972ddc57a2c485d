//! Prometheus exporter for the `cfwatcher_*` metrics.
//!
//! The listener is the one built into `metrics-exporter-prometheus`. Reconcile
//! durations are dominated by two or three Cloudflare round trips, so the
//! histogram gets buckets between 10ms and 30s instead of the exporter's
//! summary default.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use cfwatcher_core::config::MetricsConfig;
use cfwatcher_core::metrics as m;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Bucket bounds (seconds) for [`m::RECONCILE_DURATION_SECONDS`].
pub const RECONCILE_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Parses `listen_addr:port`, bracketing IPv6 literals.
pub fn listen_address(config: &MetricsConfig) -> Result<SocketAddr> {
    let host = if config.listen_addr.contains(':') && !config.listen_addr.starts_with('[') {
        format!("[{}]", config.listen_addr)
    } else {
        config.listen_addr.clone()
    };
    format!("{host}:{}", config.port)
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", config.listen_addr))
}

/// Installs the global recorder, starts the HTTP listener and registers the
/// metric descriptions. Returns the listen address.
///
/// Call at most once per process.
///
/// # Errors
///
/// Fails when the address does not parse, the socket cannot be bound, or a
/// recorder is already installed.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr = listen_address(config)?;
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(m::RECONCILE_DURATION_SECONDS.to_owned()),
            &RECONCILE_DURATION_BUCKETS,
        )
        .context("invalid histogram buckets")?
        .install()
        .context("failed to install metrics recorder")?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(addr)
}
