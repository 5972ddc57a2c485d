//! Tunnel ingress rules and the remote configuration document.
//!
//! These types mirror the Cloudflare Tunnel configuration API closely enough
//! to round-trip it: fields the engine does not interpret (per-rule `path`,
//! global `originRequest`, ...) are captured in `extra` maps and written back
//! unchanged on every publish.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Service of the default catch-all rule.
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// `originRequest` key marking the proxy type of an origin.
pub const PROXY_TYPE_KEY: &str = "proxyType";

/// `originRequest` value for SOCKS origins.
pub const PROXY_TYPE_SOCKS: &str = "socks";

/// One entry of the tunnel's ordered ingress rule list.
///
/// A rule without hostname is the catch-all. The remote API returns an empty
/// string for it in some responses; both forms deserialize to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Origin service (`http://host:port`, `http_status:404`, ...)
    pub service: String,
    /// Public hostname, absent for the catch-all rule
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub hostname: Option<String>,
    /// Per-rule origin options
    #[serde(
        rename = "originRequest",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub origin_request: Map<String, Value>,
    /// Fields not interpreted by the engine
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IngressRule {
    /// Creates a hostname-bearing rule with no origin options.
    pub fn new(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            hostname: Some(hostname.into()),
            origin_request: Map::new(),
            extra: Map::new(),
        }
    }

    /// Creates a catch-all rule for the given service.
    pub fn catch_all(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            hostname: None,
            origin_request: Map::new(),
            extra: Map::new(),
        }
    }

    /// The catch-all synthesized when the remote list has none.
    pub fn default_catch_all() -> Self {
        Self::catch_all(CATCH_ALL_SERVICE)
    }

    pub fn is_catch_all(&self) -> bool {
        self.hostname.is_none()
    }

    /// Returns `true` if this rule serves `hostname` (DNS names compare case-insensitively).
    pub fn serves(&self, hostname: &str) -> bool {
        self.hostname
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(hostname))
    }
}

/// `warp-routing` section, copied through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarpRouting {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The remote tunnel configuration: ordered ingress rules plus opaque settings.
///
/// `version` is the remote version observed when the document was fetched.
/// It is never serialized into a publish request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelConfiguration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingress: Vec<IngressRule>,
    #[serde(rename = "warp-routing", default, deserialize_with = "null_as_default")]
    pub warp_routing: WarpRouting,
    #[serde(skip)]
    pub version: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TunnelConfiguration {
    /// Returns a copy carrying `ingress` in place of the current rule list.
    ///
    /// Everything else (warp routing, unknown settings, version) is preserved.
    pub fn with_ingress(&self, ingress: Vec<IngressRule>) -> Self {
        Self {
            ingress,
            warp_routing: self.warp_routing.clone(),
            version: self.version,
            extra: self.extra.clone(),
        }
    }
}

/// Envelope of `GET .../configurations`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TunnelConfigResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub result: Option<TunnelConfigResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TunnelConfigResult {
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub config: Option<TunnelConfiguration>,
}

impl TunnelConfigResponse {
    /// Unwraps the configuration, treating a `null` config as an empty one.
    pub(crate) fn into_configuration(self) -> TunnelConfiguration {
        match self.result {
            Some(result) => {
                let mut config = result.config.unwrap_or_default();
                config.version = result.version;
                config
            }
            None => TunnelConfiguration::default(),
        }
    }
}

/// Body of `PUT .../configurations`.
#[derive(Debug, Serialize)]
pub(crate) struct PublishRequest<'a> {
    pub config: &'a TunnelConfiguration,
}

/// Checks the list invariants: at most one catch-all, placed last, and no
/// duplicate hostnames.
pub fn satisfies_invariants(rules: &[IngressRule]) -> bool {
    let catch_alls = rules.iter().filter(|r| r.is_catch_all()).count();
    if catch_alls > 1 {
        return false;
    }
    if catch_alls == 1 && !rules.last().is_some_and(IngressRule::is_catch_all) {
        return false;
    }
    let mut seen = HashSet::new();
    rules
        .iter()
        .filter_map(|r| r.hostname.as_deref())
        .all(|h| seen.insert(h.to_ascii_lowercase()))
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
