//! Container label parsing -- opaque labels to a typed [`RoutingIntent`].
//!
//! Labels recognized on a container:
//!
//! | Label                          | Meaning                                        |
//! |--------------------------------|------------------------------------------------|
//! | `cf_watcher.enabled`           | must be exactly `"true"` to opt in             |
//! | `cf_watcher.cf_network`        | tunnel network; resolved automatically if absent |
//! | `cf_watcher.rules.subdomain`   | public subdomain (required)                    |
//! | `cf_watcher.rules.domain`      | public zone (required)                         |
//! | `cf_watcher.rules.host`        | internal service host (required)               |
//! | `cf_watcher.rules.port`        | internal service port (required)               |
//! | `cf_watcher.rules.type`        | service URL scheme, default `http`             |
//! | `cf_watcher.rules.path`        | path appended to the service URL               |
//! | `cf_watcher.rules.socks5`      | `true` marks the origin as a SOCKS proxy       |
//!
//! Parsing is strict: a missing or malformed property yields
//! [`IngressError::InvalidRule`] naming it, never a panic.

use std::collections::HashMap;
use std::net::Ipv6Addr;

use tracing::debug;

use crate::error::IngressError;
use crate::network::NetworkResolver;

/// Opt-in label.
pub const LABEL_ENABLED: &str = "cf_watcher.enabled";

/// Tunnel network label.
pub const LABEL_NETWORK: &str = "cf_watcher.cf_network";

/// Namespace of rule properties.
pub const RULES_PREFIX: &str = "cf_watcher.rules.";

const DEFAULT_SCHEME: &str = "http";

const KNOWN_PROPERTIES: [&str; 7] = ["subdomain", "domain", "type", "host", "port", "path", "socks5"];

/// How the tunnel should talk to the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyMode {
    /// 일반 origin
    #[default]
    None,
    /// SOCKS5 프록시 origin
    Socks5,
}

/// Validated description of the public route a container wants.
///
/// An intent only exists for enabled containers; a disabled container fails
/// parsing with [`IngressError::Disabled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingIntent {
    /// Network connecting the container to the tunnel egress container
    pub tunnel_network: String,
    pub subdomain: String,
    pub domain: String,
    /// Service URL scheme (`http`, `https`, `tcp` ...)
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path without leading slashes, `None` when empty
    pub path: Option<String>,
    pub proxy_mode: ProxyMode,
}

impl RoutingIntent {
    /// Public hostname `subdomain.domain`; the match key against remote rules.
    pub fn hostname(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    /// Internal service URL `scheme://host:port[/path]`, IPv6 hosts bracketed.
    ///
    /// Always built from host/port, whatever the hostname is.
    pub fn service_url(&self) -> String {
        let base = if self.host.contains(':') {
            format!("{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        };
        match &self.path {
            Some(path) => format!("{base}/{path}"),
            None => base,
        }
    }
}

/// Parses container labels into a [`RoutingIntent`].
///
/// Order matters: the opt-in label is checked first and short-circuits before
/// the network resolver is consulted, so disabled containers never cause
/// runtime queries.
///
/// # Errors
///
/// - [`IngressError::Disabled`] when `cf_watcher.enabled` is absent or not `"true"`
/// - [`IngressError::NetworkUnresolved`] when no tunnel network can be determined
/// - [`IngressError::InvalidRule`] for missing or malformed rule properties
/// - Docker errors surfaced by the resolver
pub async fn parse_labels<R: NetworkResolver>(
    container: &str,
    labels: &HashMap<String, String>,
    networks: &[String],
    resolver: &R,
) -> Result<RoutingIntent, IngressError> {
    if labels.get(LABEL_ENABLED).map(String::as_str) != Some("true") {
        return Err(IngressError::Disabled {
            container: container.to_owned(),
        });
    }

    let tunnel_network = match labels.get(LABEL_NETWORK) {
        Some(network) => {
            let network = network.trim();
            if network.is_empty() {
                return Err(IngressError::malformed(
                    LABEL_NETWORK,
                    "must not be empty when present",
                ));
            }
            network.to_owned()
        }
        None => resolver
            .find_tunnel_network(networks)
            .await?
            .ok_or_else(|| IngressError::NetworkUnresolved {
                container: container.to_owned(),
            })?,
    };

    let properties = rule_properties(labels);
    intent_from_properties(tunnel_network, &properties)
}

/// Collects `cf_watcher.rules.<property>` labels into a property map.
///
/// Only the first segment after the prefix names the property, so
/// `cf_watcher.rules.host.extra` is read as `host`. When several labels name
/// the same property the exact key wins, then the lexicographically smallest
/// nested key, so the result never depends on label order.
pub fn rule_properties(labels: &HashMap<String, String>) -> HashMap<String, String> {
    let mut chosen: HashMap<&str, (&str, &str)> = HashMap::new();
    for (key, value) in labels {
        let Some(rest) = key.strip_prefix(RULES_PREFIX) else {
            continue;
        };
        let property = rest.split('.').next().unwrap_or_default();
        if property.is_empty() {
            continue;
        }
        if !KNOWN_PROPERTIES.contains(&property) {
            debug!(label = %key, "ignoring unknown rule property");
            continue;
        }
        let replace = match chosen.get(property) {
            Some(&(current, _)) => {
                let replace = label_precedes(key, current, property);
                let (kept, dropped) = if replace {
                    (key.as_str(), current)
                } else {
                    (current, key.as_str())
                };
                debug!(label = %dropped, kept = %kept, "ignoring shadowed rule property");
                replace
            }
            None => true,
        };
        if replace {
            chosen.insert(property, (key.as_str(), value.as_str()));
        }
    }
    chosen
        .into_iter()
        .map(|(property, (_, value))| (property.to_owned(), value.trim().to_owned()))
        .collect()
}

/// Whether `candidate` should replace `current` as the label for `property`.
fn label_precedes(candidate: &str, current: &str, property: &str) -> bool {
    let exact = |key: &str| key.len() == RULES_PREFIX.len() + property.len();
    match (exact(candidate), exact(current)) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate < current,
    }
}

/// Builds an intent from an already collected property map.
pub fn intent_from_properties(
    tunnel_network: String,
    properties: &HashMap<String, String>,
) -> Result<RoutingIntent, IngressError> {
    let subdomain = required_name(properties, "subdomain")?;
    let domain = required_name(properties, "domain")?;
    let host = parse_host(&required_name(properties, "host")?)?;
    let port = parse_port(&required(properties, "port")?)?;

    let scheme = match properties.get("type") {
        Some(scheme) => parse_scheme(scheme)?,
        None => DEFAULT_SCHEME.to_owned(),
    };

    let path = properties
        .get("path")
        .map(|p| p.trim_start_matches('/').to_owned())
        .filter(|p| !p.is_empty());

    let proxy_mode = match properties.get("socks5").map(String::as_str) {
        None | Some("false") => ProxyMode::None,
        Some("true") => ProxyMode::Socks5,
        Some(other) => {
            return Err(IngressError::malformed(
                "socks5",
                format!("expected 'true' or 'false', got '{other}'"),
            ));
        }
    };

    Ok(RoutingIntent {
        tunnel_network,
        subdomain,
        domain,
        scheme,
        host,
        port,
        path,
        proxy_mode,
    })
}

fn required(properties: &HashMap<String, String>, property: &str) -> Result<String, IngressError> {
    match properties.get(property) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        Some(_) => Err(IngressError::malformed(property, "must not be empty")),
        None => Err(IngressError::missing(property)),
    }
}

fn required_name(
    properties: &HashMap<String, String>,
    property: &str,
) -> Result<String, IngressError> {
    let value = required(properties, property)?;
    if value.chars().any(char::is_whitespace) {
        return Err(IngressError::malformed(property, "must not contain whitespace"));
    }
    Ok(value)
}

/// Accepts names and IPv4 literals as-is. Anything with `:` or brackets must
/// be an IPv6 literal, optionally bracketed, and is stored bare.
fn parse_host(raw: &str) -> Result<String, IngressError> {
    if raw.contains('/') {
        return Err(IngressError::malformed("host", "must not contain '/'"));
    }
    if !raw.contains([':', '[', ']']) {
        return Ok(raw.to_owned());
    }
    let bare = raw
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(raw);
    bare.parse::<Ipv6Addr>()
        .map(|_| bare.to_owned())
        .map_err(|_| {
            IngressError::malformed(
                "host",
                format!("'{raw}' is neither a hostname nor an IPv6 address"),
            )
        })
}

fn parse_port(raw: &str) -> Result<u16, IngressError> {
    match raw.parse::<u16>() {
        Ok(0) => Err(IngressError::malformed("port", "must be 1-65535")),
        Ok(port) => Ok(port),
        Err(_) => Err(IngressError::malformed(
            "port",
            format!("'{raw}' is not a valid port number"),
        )),
    }
}

fn parse_scheme(raw: &str) -> Result<String, IngressError> {
    let scheme = raw.to_ascii_lowercase();
    let valid = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(IngressError::malformed(
            "type",
            format!("'{raw}' is not a valid URL scheme"),
        ));
    }
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticNetworkResolver;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn app_labels() -> HashMap<String, String> {
        labels(&[
            ("cf_watcher.enabled", "true"),
            ("cf_watcher.cf_network", "netA"),
            ("cf_watcher.rules.subdomain", "app"),
            ("cf_watcher.rules.domain", "example.com"),
            ("cf_watcher.rules.host", "10.0.0.5"),
            ("cf_watcher.rules.port", "8080"),
        ])
    }

    async fn parse(labels: &HashMap<String, String>) -> Result<RoutingIntent, IngressError> {
        parse_labels("web", labels, &[], &StaticNetworkResolver::none()).await
    }

    #[tokio::test]
    async fn parses_minimal_labels() {
        let intent = parse(&app_labels()).await.unwrap();
        assert_eq!(intent.tunnel_network, "netA");
        assert_eq!(intent.hostname(), "app.example.com");
        assert_eq!(intent.service_url(), "http://10.0.0.5:8080");
        assert_eq!(intent.proxy_mode, ProxyMode::None);
        assert!(intent.path.is_none());
    }

    #[tokio::test]
    async fn absent_enabled_label_is_disabled() {
        let mut l = app_labels();
        l.remove(LABEL_ENABLED);
        assert!(matches!(
            parse(&l).await,
            Err(IngressError::Disabled { .. })
        ));
    }

    #[tokio::test]
    async fn non_literal_true_is_disabled() {
        for value in ["false", "TRUE", "1", "yes", ""] {
            let mut l = app_labels();
            l.insert(LABEL_ENABLED.to_owned(), value.to_owned());
            assert!(
                matches!(parse(&l).await, Err(IngressError::Disabled { .. })),
                "value {value:?} must disable"
            );
        }
    }

    #[tokio::test]
    async fn disabled_short_circuits_before_resolver() {
        let l = labels(&[("cf_watcher.enabled", "false")]);
        let resolver = StaticNetworkResolver::failing();
        let result = parse_labels("web", &l, &["bridge".to_owned()], &resolver).await;
        assert!(matches!(result, Err(IngressError::Disabled { .. })));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn missing_network_uses_resolver() {
        let mut l = app_labels();
        l.remove(LABEL_NETWORK);
        let resolver = StaticNetworkResolver::found("tunnel_net");
        let intent = parse_labels("web", &l, &["tunnel_net".to_owned()], &resolver)
            .await
            .unwrap();
        assert_eq!(intent.tunnel_network, "tunnel_net");
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn unresolved_network_fails() {
        let mut l = app_labels();
        l.remove(LABEL_NETWORK);
        let err = parse(&l).await.unwrap_err();
        assert!(matches!(err, IngressError::NetworkUnresolved { .. }));
    }

    #[tokio::test]
    async fn empty_network_label_is_invalid() {
        let mut l = app_labels();
        l.insert(LABEL_NETWORK.to_owned(), "  ".to_owned());
        let err = parse(&l).await.unwrap_err();
        assert!(matches!(err, IngressError::InvalidRule { ref property, .. } if property == LABEL_NETWORK));
    }

    #[tokio::test]
    async fn each_required_property_is_named_when_missing() {
        for property in ["subdomain", "domain", "host", "port"] {
            let mut l = app_labels();
            l.remove(&format!("{RULES_PREFIX}{property}"));
            let err = parse(&l).await.unwrap_err();
            match err {
                IngressError::InvalidRule { property: p, .. } => assert_eq!(p, property),
                other => panic!("expected InvalidRule for {property}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn host_port_only_is_invalid() {
        let mut l = app_labels();
        l.remove("cf_watcher.rules.subdomain");
        l.remove("cf_watcher.rules.domain");
        assert!(matches!(
            parse(&l).await,
            Err(IngressError::InvalidRule { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_port_is_invalid() {
        for port in ["http", "70000", "0", "-1"] {
            let mut l = app_labels();
            l.insert("cf_watcher.rules.port".to_owned(), port.to_owned());
            let err = parse(&l).await.unwrap_err();
            assert!(
                matches!(err, IngressError::InvalidRule { ref property, .. } if property == "port"),
                "port {port:?}"
            );
        }
    }

    #[tokio::test]
    async fn path_with_and_without_slash_compose_identical_urls() {
        let mut with_slash = app_labels();
        with_slash.insert("cf_watcher.rules.path".to_owned(), "/foo".to_owned());
        let mut without_slash = app_labels();
        without_slash.insert("cf_watcher.rules.path".to_owned(), "foo".to_owned());

        let a = parse(&with_slash).await.unwrap();
        let b = parse(&without_slash).await.unwrap();
        assert_eq!(a.service_url(), "http://10.0.0.5:8080/foo");
        assert_eq!(a.service_url(), b.service_url());
    }

    #[tokio::test]
    async fn slash_only_path_is_dropped() {
        let mut l = app_labels();
        l.insert("cf_watcher.rules.path".to_owned(), "/".to_owned());
        let intent = parse(&l).await.unwrap();
        assert_eq!(intent.service_url(), "http://10.0.0.5:8080");
    }

    #[tokio::test]
    async fn socks5_flag() {
        let mut l = app_labels();
        l.insert("cf_watcher.rules.socks5".to_owned(), "true".to_owned());
        assert_eq!(parse(&l).await.unwrap().proxy_mode, ProxyMode::Socks5);

        l.insert("cf_watcher.rules.socks5".to_owned(), "false".to_owned());
        assert_eq!(parse(&l).await.unwrap().proxy_mode, ProxyMode::None);

        l.insert("cf_watcher.rules.socks5".to_owned(), "maybe".to_owned());
        assert!(matches!(
            parse(&l).await,
            Err(IngressError::InvalidRule { ref property, .. }) if property == "socks5"
        ));
    }

    #[tokio::test]
    async fn type_selects_scheme() {
        let mut l = app_labels();
        l.insert("cf_watcher.rules.type".to_owned(), "HTTPS".to_owned());
        assert_eq!(
            parse(&l).await.unwrap().service_url(),
            "https://10.0.0.5:8080"
        );

        l.insert("cf_watcher.rules.type".to_owned(), "not a scheme".to_owned());
        assert!(parse(&l).await.is_err());
    }

    #[test]
    fn rule_properties_ignores_foreign_and_unknown_labels() {
        let l = labels(&[
            ("cf_watcher.rules.host", " web "),
            ("cf_watcher.rules.host.extra", "shadowed"),
            ("cf_watcher.rules.colour", "blue"),
            ("cf_watcher.rules.", "empty"),
            ("com.docker.compose.service", "web"),
        ]);
        let props = rule_properties(&l);
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("host").map(String::as_str), Some("web"));
        assert!(!props.contains_key("colour"));
    }

    #[test]
    fn shadowed_property_resolves_the_same_every_time() {
        for _ in 0..200 {
            // fresh maps get fresh hash seeds
            let l = labels(&[
                ("cf_watcher.rules.host.zzz", "late"),
                ("cf_watcher.rules.host", "web"),
                ("cf_watcher.rules.host.extra", "evil"),
                ("cf_watcher.rules.port.b", "9000"),
                ("cf_watcher.rules.port.a", "8080"),
            ]);
            let props = rule_properties(&l);
            assert_eq!(props["host"], "web");
            assert_eq!(props["port"], "8080");
        }
    }

    #[tokio::test]
    async fn ipv6_host_is_bracketed() {
        for host in ["fd00::5", "[fd00::5]"] {
            let mut l = app_labels();
            l.insert("cf_watcher.rules.host".to_owned(), host.to_owned());
            let intent = parse(&l).await.unwrap();
            assert_eq!(intent.host, "fd00::5");
            assert_eq!(intent.service_url(), "http://[fd00::5]:8080");
        }
    }

    #[tokio::test]
    async fn host_with_port_is_invalid() {
        for host in ["web:80", "[web]", "10.0.0.5/24"] {
            let mut l = app_labels();
            l.insert("cf_watcher.rules.host".to_owned(), host.to_owned());
            let err = parse(&l).await.unwrap_err();
            assert!(
                matches!(err, IngressError::InvalidRule { ref property, .. } if property == "host"),
                "host {host:?}"
            );
        }
    }

    #[test]
    fn hostname_and_service_are_independent() {
        let intent = RoutingIntent {
            tunnel_network: "net".to_owned(),
            subdomain: "app".to_owned(),
            domain: "example.com".to_owned(),
            scheme: "http".to_owned(),
            host: "backend".to_owned(),
            port: 3000,
            path: None,
            proxy_mode: ProxyMode::None,
        };
        assert_eq!(intent.hostname(), "app.example.com");
        assert_eq!(intent.service_url(), "http://backend:3000");
    }
}
