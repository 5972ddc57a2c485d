#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`IngressError`)
//! - [`event`]: Container lifecycle events (`LifecycleEvent`, `EventKind`)
//! - [`docker`]: Docker API abstraction (`DockerClient` trait, `BollardDockerClient`)
//! - [`network`]: Tunnel network discovery (`NetworkResolver`, `DockerNetworkResolver`)
//! - [`labels`]: Label parsing (`RoutingIntent`, `parse_labels`)
//! - [`rule`]: Remote configuration model (`IngressRule`, `TunnelConfiguration`)
//! - [`matcher`]: Intent vs. remote rules (`match_rules`, `MatchResult`)
//! - [`composer`]: New rule list construction (`compose`)
//! - [`cloudflare`]: Tunnel API (`TunnelApi` trait, `CloudflareClient`)
//! - [`reconciler`]: Per-event driver (`Reconciler`, `Outcome`)
//! - [`watcher`]: Event loop (`Watcher`)
//!
//! # Architecture
//!
//! ```text
//! Docker events --stream--> Watcher
//!                             |
//!                        Reconciler.reconcile()
//!                             |
//!              inspect -> parse_labels -> fetch_config
//!                             |
//!                 match_rules -> compose -> publish_config
//! ```

pub mod cloudflare;
pub mod composer;
pub mod docker;
pub mod error;
pub mod event;
pub mod labels;
pub mod matcher;
pub mod network;
pub mod reconciler;
pub mod rule;
pub mod watcher;

// --- Public API Re-exports ---

// Driver and loop
pub use reconciler::{Operation, Outcome, Reconciler, ReconcilerConfig, SkipReason};
pub use watcher::Watcher;

// Error
pub use error::IngressError;

// Events
pub use event::{EventKind, LifecycleEvent};

// Docker API
pub use docker::{BollardDockerClient, ContainerDetails, ContainerSummary, DockerClient};
pub use network::{DockerNetworkResolver, NetworkResolver};

// Labels and rules
pub use composer::compose;
pub use labels::{ProxyMode, RoutingIntent, parse_labels};
pub use matcher::{MatchResult, PendingRoute, match_rules};
pub use rule::{IngressRule, TunnelConfiguration, WarpRouting};

// Cloudflare API
pub use cloudflare::{CloudflareClient, TunnelApi};
