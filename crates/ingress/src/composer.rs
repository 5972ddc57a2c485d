//! Builds the rule list to publish.

use serde_json::{Map, Value};

use crate::labels::ProxyMode;
use crate::rule::{IngressRule, PROXY_TYPE_KEY, PROXY_TYPE_SOCKS};

/// Returns `remaining ++ [new rule] ++ [catch_all]`.
///
/// `remaining` keeps its order exactly; the catch-all always ends the list.
pub fn compose(
    remaining: Vec<IngressRule>,
    hostname: String,
    service_url: String,
    proxy_mode: ProxyMode,
    catch_all: IngressRule,
) -> Vec<IngressRule> {
    let mut rule = IngressRule::new(hostname, service_url);
    rule.origin_request = origin_request(proxy_mode);

    let mut rules = remaining;
    rules.reserve(2);
    rules.push(rule);
    rules.push(catch_all);
    rules
}

fn origin_request(proxy_mode: ProxyMode) -> Map<String, Value> {
    let mut options = Map::new();
    if proxy_mode == ProxyMode::Socks5 {
        options.insert(
            PROXY_TYPE_KEY.to_owned(),
            Value::String(PROXY_TYPE_SOCKS.to_owned()),
        );
    }
    options
}
