//! Comparison of a routing intent against the current remote rule list.
//!
//! The public hostname is the match key. The catch-all rule is split off so
//! the composer can put it back at the end of the list.

use tracing::warn;

use crate::composer::compose;
use crate::labels::{ProxyMode, RoutingIntent};
use crate::rule::IngressRule;

/// Result of matching an intent against the remote rules.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// A rule for the hostname already exists; nothing to publish.
    AlreadyRouted {
        hostname: String,
    },
    /// The hostname is not routed yet.
    NeedsRoute(PendingRoute),
}

/// Everything needed to compose the new rule list.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRoute {
    pub hostname: String,
    pub service_url: String,
    pub proxy_mode: ProxyMode,
    /// Canonical catch-all, synthesized when the remote list had none
    pub catch_all: IngressRule,
    /// Hostname-bearing rules in their original order
    pub remaining: Vec<IngressRule>,
}

impl PendingRoute {
    /// Builds the rule list to publish.
    pub fn compose(self) -> Vec<IngressRule> {
        compose(
            self.remaining,
            self.hostname,
            self.service_url,
            self.proxy_mode,
            self.catch_all,
        )
    }
}

/// Matches `intent` against `current`.
///
/// The first catch-all in `current` is canonical. Any later catch-all is
/// dropped and a warning reports how many were discarded.
pub fn match_rules(current: &[IngressRule], intent: &RoutingIntent) -> MatchResult {
    let hostname = intent.hostname();

    let mut catch_all = None;
    let mut dropped = 0usize;
    let mut remaining = Vec::with_capacity(current.len());
    for rule in current {
        if rule.is_catch_all() {
            if catch_all.is_none() {
                catch_all = Some(rule.clone());
            } else {
                dropped += 1;
            }
        } else {
            remaining.push(rule.clone());
        }
    }
    if dropped > 0 {
        warn!(dropped, "remote rule list has multiple catch-all rules, keeping the first");
    }

    if remaining.iter().any(|rule| rule.serves(&hostname)) {
        return MatchResult::AlreadyRouted { hostname };
    }

    MatchResult::NeedsRoute(PendingRoute {
        service_url: intent.service_url(),
        hostname,
        proxy_mode: intent.proxy_mode,
        catch_all: catch_all.unwrap_or_else(IngressRule::default_catch_all),
        remaining,
    })
}
