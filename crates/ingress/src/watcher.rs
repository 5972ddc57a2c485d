//! 감시 루프 -- 이벤트 스트림을 순서대로 조정
//!
//! [`Watcher`]는 이벤트를 하나씩 꺼내 [`Reconciler`]에 넘기고, 조정이 끝난 뒤에
//! 다음 이벤트를 읽습니다. 개별 조정 실패는 로그만 남기고 루프를 계속합니다.
//! 루프는 이벤트 스트림이 실패하거나 끝날 때, 또는 종료 신호를 받을 때만 끝납니다.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::cloudflare::TunnelApi;
use crate::docker::DockerClient;
use crate::error::IngressError;
use crate::event::LifecycleEvent;
use crate::reconciler::{Outcome, Reconciler};

/// 이벤트 감시 루프
pub struct Watcher<D: DockerClient, C: TunnelApi> {
    reconciler: Reconciler<D, C>,
    /// 처리한 이벤트 수
    events_processed: AtomicU64,
    /// 새로 게시한 라우트 수
    routes_published: AtomicU64,
    /// 실패한 조정 수
    failures: AtomicU64,
}

impl<D: DockerClient, C: TunnelApi> Watcher<D, C> {
    pub fn new(reconciler: Reconciler<D, C>) -> Self {
        Self {
            reconciler,
            events_processed: AtomicU64::new(0),
            routes_published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Subscribes to Docker events and reconciles them until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns the event source error that ended the loop.
    pub async fn run(&self) -> Result<(), IngressError> {
        info!("watching docker container events");
        let events = self.reconciler.docker().events();
        self.run_stream(events).await
    }

    /// Like [`run`](Self::run), but also stops when `shutdown` resolves.
    ///
    /// A reconciliation in flight when `shutdown` resolves is dropped.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), IngressError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            () = shutdown => {
                info!("shutdown requested, stopping watcher");
                Ok(())
            }
        }
    }

    /// Reconciles every event of `events`, one at a time, in arrival order.
    pub async fn run_stream<S>(&self, mut events: S) -> Result<(), IngressError>
    where
        S: Stream<Item = Result<LifecycleEvent, IngressError>> + Unpin,
    {
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "event stream failed, stopping watcher");
                    return Err(e);
                }
            };

            self.events_processed.fetch_add(1, Ordering::Relaxed);
            let outcome = self.reconciler.reconcile(&event).await;
            self.report(&event, &outcome);
        }

        info!(
            events = self.events_processed(),
            routes = self.routes_published(),
            failures = self.failures(),
            "event stream ended"
        );
        Ok(())
    }

    fn report(&self, event: &LifecycleEvent, outcome: &Outcome) {
        let container = event.actor_name.as_deref().unwrap_or(&event.actor_id);
        match outcome {
            Outcome::Routed { hostname } => {
                self.routes_published.fetch_add(1, Ordering::Relaxed);
                info!(container = %container, hostname = %hostname, "route added");
            }
            Outcome::Failed { operation, error } => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    container = %container,
                    operation = %operation,
                    error = %error,
                    "reconciliation failed"
                );
            }
            Outcome::AlreadyRouted { .. } | Outcome::Skipped(_) => {}
        }
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn routes_published(&self) -> u64 {
        self.routes_published.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
