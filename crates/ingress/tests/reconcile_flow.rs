//! 통합 테스트 -- 이벤트 스트림부터 원격 설정 게시까지
//!
//! Docker 이벤트 → 라벨 파싱 → 규칙 매칭 → 설정 게시 흐름을
//! 공개 API와 테스트용 Docker/터널 구현으로 검증합니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::json;

use cfwatcher_ingress::{
    ContainerDetails, ContainerSummary, DockerClient, EventKind, IngressError, IngressRule,
    LifecycleEvent, Outcome, Reconciler, ReconcilerConfig, SkipReason, TunnelApi,
    TunnelConfiguration, Watcher,
};

mod mock {
    use super::*;

    #[derive(Default)]
    pub struct TestDocker {
        pub containers: Vec<ContainerDetails>,
        pub networks: HashMap<String, Vec<ContainerSummary>>,
        pub events: Vec<LifecycleEvent>,
    }

    impl DockerClient for TestDocker {
        async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, IngressError> {
            self.containers
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| IngressError::ContainerNotFound(id.to_owned()))
        }

        async fn list_network_containers(
            &self,
            network: &str,
        ) -> Result<Vec<ContainerSummary>, IngressError> {
            Ok(self.networks.get(network).cloned().unwrap_or_default())
        }

        fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, IngressError>> {
            futures::stream::iter(self.events.clone().into_iter().map(Ok)).boxed()
        }

        async fn ping(&self) -> Result<(), IngressError> {
            Ok(())
        }
    }

    pub struct TestTunnel {
        pub config: Mutex<TunnelConfiguration>,
        pub publishes: Mutex<usize>,
    }

    impl TestTunnel {
        pub fn new(config: TunnelConfiguration) -> Self {
            Self {
                config: Mutex::new(config),
                publishes: Mutex::new(0),
            }
        }

        pub fn ingress_json(&self) -> serde_json::Value {
            serde_json::to_value(&self.config.lock().unwrap().ingress).unwrap()
        }
    }

    impl TunnelApi for TestTunnel {
        async fn fetch_config(&self) -> Result<TunnelConfiguration, IngressError> {
            Ok(self.config.lock().unwrap().clone())
        }

        async fn publish_config(&self, config: &TunnelConfiguration) -> Result<(), IngressError> {
            let mut current = self.config.lock().unwrap();
            let version = current.version.map(|v| v + 1);
            *current = config.clone();
            current.version = version;
            *self.publishes.lock().unwrap() += 1;
            Ok(())
        }

        async fn create_dns_record(&self, _subdomain: &str, _domain: &str) -> Result<(), IngressError> {
            Ok(())
        }
    }
}

use mock::{TestDocker, TestTunnel};

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn container(id: &str, name: &str, labels: HashMap<String, String>, networks: &[&str]) -> ContainerDetails {
    ContainerDetails {
        id: id.to_owned(),
        name: name.to_owned(),
        labels,
        networks: networks.iter().map(|n| (*n).to_owned()).collect(),
    }
}

fn tunnel(rules: Vec<IngressRule>) -> Arc<TestTunnel> {
    Arc::new(TestTunnel::new(TunnelConfiguration {
        ingress: rules,
        version: Some(10),
        ..Default::default()
    }))
}

#[tokio::test]
async fn full_watch_session() {
    let web = container(
        "aaaa0001",
        "web",
        labels(&[
            ("cf_watcher.enabled", "true"),
            ("cf_watcher.rules.subdomain", "www"),
            ("cf_watcher.rules.domain", "example.com"),
            ("cf_watcher.rules.host", "web"),
            ("cf_watcher.rules.port", "80"),
            ("cf_watcher.rules.path", "/site"),
        ]),
        &["frontend", "edge"],
    );
    let proxy = container(
        "aaaa0002",
        "proxy",
        labels(&[
            ("cf_watcher.enabled", "true"),
            ("cf_watcher.cf_network", "edge"),
            ("cf_watcher.rules.subdomain", "socks"),
            ("cf_watcher.rules.domain", "example.com"),
            ("cf_watcher.rules.host", "proxy"),
            ("cf_watcher.rules.port", "1080"),
            ("cf_watcher.rules.type", "tcp"),
            ("cf_watcher.rules.socks5", "true"),
        ]),
        &["edge"],
    );
    let opted_out = container("aaaa0003", "db", labels(&[]), &["backend"]);

    let docker = TestDocker {
        containers: vec![web, proxy, opted_out],
        networks: HashMap::from([
            ("frontend".to_owned(), Vec::new()),
            (
                "edge".to_owned(),
                vec![ContainerSummary {
                    id: "cf000001".to_owned(),
                    name: "tunnel".to_owned(),
                    image: "cloudflare/cloudflared:latest".to_owned(),
                }],
            ),
        ]),
        events: vec![
            LifecycleEvent::container_start("aaaa0001").with_actor_name("web"),
            LifecycleEvent::new(EventKind::Container, "create", "aaaa0002"),
            LifecycleEvent::container_start("aaaa0002"),
            LifecycleEvent::container_start("aaaa0003"),
            LifecycleEvent::container_start("aaaa0001"),
        ],
    };
    let api = tunnel(vec![
        IngressRule::new("existing.example.com", "http://legacy:8000"),
        IngressRule::default_catch_all(),
    ]);

    let reconciler = Reconciler::new(Arc::new(docker), Arc::clone(&api), ReconcilerConfig::default());
    let watcher = Watcher::new(reconciler);
    watcher.run().await.expect("stream ends cleanly");

    assert_eq!(watcher.events_processed(), 5);
    assert_eq!(watcher.routes_published(), 2);
    assert_eq!(watcher.failures(), 0);
    assert_eq!(*api.publishes.lock().unwrap(), 2);
    assert_eq!(
        api.ingress_json(),
        json!([
            {"service": "http://legacy:8000", "hostname": "existing.example.com"},
            {"service": "http://web:80/site", "hostname": "www.example.com"},
            {"service": "tcp://proxy:1080", "hostname": "socks.example.com", "originRequest": {"proxyType": "socks"}},
            {"service": "http_status:404"}
        ])
    );
}

#[tokio::test]
async fn missing_tunnel_network_is_invalid_metadata() {
    let docker = TestDocker {
        containers: vec![container(
            "bbbb0001",
            "lonely",
            labels(&[
                ("cf_watcher.enabled", "true"),
                ("cf_watcher.rules.subdomain", "lonely"),
                ("cf_watcher.rules.domain", "example.com"),
                ("cf_watcher.rules.host", "lonely"),
                ("cf_watcher.rules.port", "80"),
            ]),
            &["bridge"],
        )],
        ..Default::default()
    };
    let api = tunnel(Vec::new());
    let reconciler = Reconciler::new(Arc::new(docker), Arc::clone(&api), ReconcilerConfig::default());

    let outcome = reconciler
        .reconcile(&LifecycleEvent::container_start("bbbb0001"))
        .await;
    match outcome {
        Outcome::Skipped(SkipReason::InvalidMetadata(reason)) => {
            assert!(reason.contains("cf_network"), "{reason}");
        }
        other => panic!("expected InvalidMetadata, got {other:?}"),
    }
    assert_eq!(*api.publishes.lock().unwrap(), 0);
}

#[tokio::test]
async fn empty_remote_gets_rule_and_catch_all() {
    let docker = TestDocker {
        containers: vec![container(
            "cccc0001",
            "api",
            labels(&[
                ("cf_watcher.enabled", "true"),
                ("cf_watcher.cf_network", "edge"),
                ("cf_watcher.rules.subdomain", "api"),
                ("cf_watcher.rules.domain", "example.org"),
                ("cf_watcher.rules.host", "10.1.0.2"),
                ("cf_watcher.rules.port", "3000"),
            ]),
            &["edge"],
        )],
        ..Default::default()
    };
    let api = tunnel(Vec::new());
    let reconciler = Reconciler::new(Arc::new(docker), Arc::clone(&api), ReconcilerConfig::default());

    let outcome = reconciler.reconcile_container("cccc0001").await;
    assert!(matches!(outcome, Outcome::Routed { .. }), "{outcome}");
    assert_eq!(
        api.ingress_json(),
        json!([
            {"service": "http://10.1.0.2:3000", "hostname": "api.example.org"},
            {"service": "http_status:404"}
        ])
    );
}
