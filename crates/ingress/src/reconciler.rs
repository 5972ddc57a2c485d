//! 조정 드라이버 -- 이벤트 한 건을 원격 인그레스 설정 변경으로 연결
//!
//! [`Reconciler`]는 컨테이너 시작 이벤트 하나에 대해 다음 순서를 수행합니다.
//!
//! ```text
//! LifecycleEvent (container/start)
//!        |
//!   inspect_container ──────────── Failed(inspect)
//!        |
//!   parse_labels ───────────────── Skipped(Disabled | InvalidMetadata)
//!        |
//!   fetch_config ───────────────── Failed(fetch)
//!        |
//!   match_rules ────────────────── AlreadyRouted
//!        |
//!   compose + (re-fetch, version) ─ Failed(verify)
//!        |
//!   publish_config ─────────────── Failed(publish)
//!        |
//!   (create_dns_record)
//!        |
//!     Routed
//! ```
//!
//! 드라이버는 재시도하지 않으며, 모든 실패는 [`Outcome`]으로 반환됩니다.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug, info, info_span, warn};

use cfwatcher_core::config::{CfWatcherConfig, DEFAULT_TUNNEL_IMAGE_TOKEN};
use cfwatcher_core::metrics as m;

use crate::cloudflare::TunnelApi;
use crate::docker::DockerClient;
use crate::error::IngressError;
use crate::event::LifecycleEvent;
use crate::labels::parse_labels;
use crate::matcher::{MatchResult, match_rules};
use crate::network::DockerNetworkResolver;
use crate::rule::satisfies_invariants;

/// 조정 동작 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// 터널 컨테이너 이미지 식별 토큰
    pub tunnel_image_token: String,
    /// 게시 후 DNS CNAME 레코드 생성 여부
    pub create_dns_records: bool,
    /// 게시 직전 원격 버전 재확인 여부
    pub verify_version: bool,
}

impl ReconcilerConfig {
    /// core 설정에서 조정 설정을 생성합니다.
    pub fn from_core(config: &CfWatcherConfig) -> Self {
        Self {
            tunnel_image_token: config.docker.tunnel_image_token.clone(),
            create_dns_records: config.cloudflare.create_dns_records,
            verify_version: config.cloudflare.verify_version,
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tunnel_image_token: DEFAULT_TUNNEL_IMAGE_TOKEN.to_owned(),
            create_dns_records: false,
            verify_version: true,
        }
    }
}

/// Step of the sequence a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Inspect,
    Fetch,
    Verify,
    Publish,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an event produced no change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not a container start event
    UnsupportedEvent,
    /// The container did not opt in
    Disabled,
    /// Labels could not be turned into a routing intent
    InvalidMetadata(String),
}

/// Result of reconciling one event.
#[derive(Debug)]
pub enum Outcome {
    Skipped(SkipReason),
    /// A new rule was published for `hostname`.
    Routed { hostname: String },
    /// The remote list already served `hostname`; nothing was written.
    AlreadyRouted { hostname: String },
    Failed {
        operation: Operation,
        error: IngressError,
    },
}

impl Outcome {
    fn failed(operation: Operation, error: IngressError) -> Self {
        Self::Failed { operation, error }
    }

    /// Metric label of this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped(_) => "skipped",
            Self::Routed { .. } => "routed",
            Self::AlreadyRouted { .. } => "already_routed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(SkipReason::UnsupportedEvent) => write!(f, "skipped: unsupported event"),
            Self::Skipped(SkipReason::Disabled) => write!(f, "skipped: cf_watcher disabled"),
            Self::Skipped(SkipReason::InvalidMetadata(reason)) => {
                write!(f, "skipped: invalid metadata: {reason}")
            }
            Self::Routed { hostname } => write!(f, "routed {hostname}"),
            Self::AlreadyRouted { hostname } => write!(f, "{hostname} already routed"),
            Self::Failed { operation, error } => write!(f, "{operation} failed: {error}"),
        }
    }
}

/// 조정 드라이버
///
/// 이벤트 간 공유되는 가변 상태가 없으므로 `&self`로 동작합니다.
pub struct Reconciler<D: DockerClient, C: TunnelApi> {
    docker: Arc<D>,
    api: Arc<C>,
    resolver: DockerNetworkResolver<D>,
    config: ReconcilerConfig,
}

impl<D: DockerClient, C: TunnelApi> Reconciler<D, C> {
    pub fn new(docker: Arc<D>, api: Arc<C>, config: ReconcilerConfig) -> Self {
        let resolver =
            DockerNetworkResolver::new(Arc::clone(&docker), config.tunnel_image_token.clone());
        Self {
            docker,
            api,
            resolver,
            config,
        }
    }

    /// 조정에 사용하는 Docker 클라이언트
    pub fn docker(&self) -> &Arc<D> {
        &self.docker
    }

    /// Reconciles one lifecycle event.
    ///
    /// Only `container/start` events are acted upon; everything else is
    /// `Skipped(UnsupportedEvent)` without touching Docker or the remote API.
    pub async fn reconcile(&self, event: &LifecycleEvent) -> Outcome {
        metrics::counter!(m::EVENTS_RECEIVED_TOTAL).increment(1);

        if !event.is_container_start() {
            debug!(event = %event, "ignoring event");
            let outcome = Outcome::Skipped(SkipReason::UnsupportedEvent);
            record(&outcome);
            return outcome;
        }

        self.reconcile_container(&event.actor_id).await
    }

    /// Runs the reconciliation sequence for an explicit container.
    pub async fn reconcile_container(&self, container_id: &str) -> Outcome {
        let started = Instant::now();
        let span = info_span!(
            "reconcile",
            reconcile_id = %uuid::Uuid::new_v4(),
            container_id = %container_id
        );

        let outcome = self.run(container_id).instrument(span).await;

        metrics::histogram!(m::RECONCILE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        record(&outcome);
        outcome
    }

    async fn run(&self, container_id: &str) -> Outcome {
        let container = match self.docker.inspect_container(container_id).await {
            Ok(container) => container,
            Err(e) => {
                warn!(error = %e, "failed to inspect container");
                return Outcome::failed(Operation::Inspect, e);
            }
        };

        let intent = match parse_labels(
            &container.name,
            &container.labels,
            &container.networks,
            &self.resolver,
        )
        .await
        {
            Ok(intent) => intent,
            Err(IngressError::Disabled { .. }) => {
                debug!(container = %container.name, "cf_watcher not enabled, skipping");
                return Outcome::Skipped(SkipReason::Disabled);
            }
            Err(e) => {
                warn!(container = %container.name, error = %e, "invalid cf_watcher labels");
                return Outcome::Skipped(SkipReason::InvalidMetadata(e.to_string()));
            }
        };
        let hostname = intent.hostname();

        let current = match self.api.fetch_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(hostname = %hostname, error = %e, "failed to fetch tunnel configuration");
                return Outcome::failed(Operation::Fetch, e);
            }
        };

        let pending = match match_rules(&current.ingress, &intent) {
            MatchResult::AlreadyRouted { hostname } => {
                info!(container = %container.name, hostname = %hostname, "hostname already routed");
                return Outcome::AlreadyRouted { hostname };
            }
            MatchResult::NeedsRoute(pending) => pending,
        };

        let service_url = pending.service_url.clone();
        let rules = pending.compose();
        if !satisfies_invariants(&rules) {
            warn!(hostname = %hostname, "remote rule list contains duplicate hostnames");
        }
        let next = current.with_ingress(rules);

        if self.config.verify_version {
            match self.api.fetch_config().await {
                Ok(latest) if latest.version != current.version => {
                    let e = IngressError::VersionConflict {
                        expected: current.version,
                        found: latest.version,
                    };
                    warn!(hostname = %hostname, error = %e, "refusing to overwrite newer configuration");
                    return Outcome::failed(Operation::Verify, e);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(hostname = %hostname, error = %e, "failed to verify tunnel configuration version");
                    return Outcome::failed(Operation::Verify, e);
                }
            }
        }

        if let Err(e) = self.api.publish_config(&next).await {
            warn!(hostname = %hostname, error = %e, "failed to publish tunnel configuration");
            return Outcome::failed(Operation::Publish, e);
        }
        metrics::counter!(m::ROUTES_PUBLISHED_TOTAL).increment(1);
        info!(
            container = %container.name,
            hostname = %hostname,
            service = %service_url,
            "published ingress rule"
        );

        if self.config.create_dns_records {
            match self.api.create_dns_record(&intent.subdomain, &intent.domain).await {
                Ok(()) => {
                    metrics::counter!(m::DNS_RECORDS_TOTAL, m::LABEL_RESULT => "success")
                        .increment(1);
                    info!(hostname = %hostname, "created dns record");
                }
                Err(e) => {
                    metrics::counter!(m::DNS_RECORDS_TOTAL, m::LABEL_RESULT => "failure")
                        .increment(1);
                    warn!(hostname = %hostname, error = %e, "failed to create dns record");
                }
            }
        }

        Outcome::Routed { hostname }
    }
}

fn record(outcome: &Outcome) {
    metrics::counter!(m::RECONCILIATIONS_TOTAL, m::LABEL_OUTCOME => outcome.label()).increment(1);
    if let Outcome::Failed { operation, .. } = outcome {
        metrics::counter!(m::RECONCILE_FAILURES_TOTAL, m::LABEL_OPERATION => operation.as_str())
            .increment(1);
    }
}
