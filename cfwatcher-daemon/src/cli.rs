//! CLI argument definitions for cf-watcher.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use cfwatcher_core::config::CfWatcherConfig;

/// Cloudflare Tunnel ingress watcher.
///
/// Listens for Docker container start events and adds an ingress rule to the
/// configured tunnel for every container labelled with `cf_watcher.*`.
#[derive(Parser, Debug)]
#[command(name = "cf-watcher")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to cf-watcher.toml configuration file.
    ///
    /// A missing file is not an error: defaults and environment variables apply.
    #[arg(short, long, default_value = "/etc/cf-watcher/cf-watcher.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without watching.
    #[arg(long)]
    pub validate: bool,

    /// Reconcile a single container (ID or name) and exit.
    #[arg(long, value_name = "ID")]
    pub container: Option<String>,
}

impl DaemonCli {
    /// Applies command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut CfWatcherConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }
}
