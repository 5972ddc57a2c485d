//! Logging initialization for cf-watcher.
//!
//! Configures `tracing-subscriber` from the `[general]` section. The HTTP and
//! Docker client stacks log every connection at debug, so they are held at
//! `warn` unless `RUST_LOG` says otherwise.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cfwatcher_core::config::GeneralConfig;

/// Directives appended to the configured level.
const DEPENDENCY_DIRECTIVES: [&str; 4] = [
    "hyper=warn",
    "hyper_util=warn",
    "reqwest=warn",
    "bollard=warn",
];

/// Builds the event filter.
///
/// `RUST_LOG` is used verbatim when set. Otherwise the configured level applies
/// to cf-watcher and [`DEPENDENCY_DIRECTIVES`] to the client libraries.
pub fn build_filter(config: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;
    for directive in DEPENDENCY_DIRECTIVES {
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("invalid log directive '{directive}'"))?,
        );
    }
    Ok(filter)
}

/// Initialize the global tracing subscriber.
///
/// # Formats
///
/// * `"json"` - one JSON object per line (default)
/// * `"pretty"` - multi-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let fmt = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().boxed(),
        "pretty" => tracing_subscriber::fmt::layer().pretty().boxed(),
        other => anyhow::bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };

    tracing_subscriber::registry()
        .with(build_filter(config)?)
        .with(fmt)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}
