//! CloudflareClient 통합 테스트
//!
//! axum으로 띄운 가짜 Cloudflare API 서버를 상대로 요청 경로, 인증 헤더,
//! 요청 본문, 에러 응답 처리를 검증합니다.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use cfwatcher_core::config::CloudflareConfig;
use cfwatcher_ingress::{CloudflareClient, IngressError, IngressRule, TunnelApi};

const ACCOUNT: &str = "acc123";
const TUNNEL: &str = "f70ff985-a4ef-4643-bbbc-4a0ed4fc8415";
const ZONE: &str = "zone789";

#[derive(Debug, Default)]
struct Recorded {
    path_ids: Vec<String>,
    authorization: Option<String>,
    auth_email: Option<String>,
    auth_key: Option<String>,
    put_body: Option<Value>,
    dns_body: Option<Value>,
}

struct FakeCloudflare {
    config: Value,
    version: u64,
    /// 설정하면 모든 요청에 이 상태와 본문으로 응답
    failure: Option<(StatusCode, Value)>,
    recorded: Recorded,
}

type Shared = Arc<Mutex<FakeCloudflare>>;

fn record_headers(recorded: &mut Recorded, headers: &HeaderMap) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    recorded.authorization = header("authorization");
    recorded.auth_email = header("x-auth-email");
    recorded.auth_key = header("x-auth-key");
}

async fn get_config(
    State(state): State<Shared>,
    Path((account, tunnel)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    record_headers(&mut state.recorded, &headers);
    state.recorded.path_ids = vec![account, tunnel];
    if let Some((status, body)) = state.failure.clone() {
        return (status, Json(body));
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": {
                "tunnel_id": TUNNEL,
                "version": state.version,
                "config": state.config,
                "source": "cloudflare"
            }
        })),
    )
}

async fn put_config(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    record_headers(&mut state.recorded, &headers);
    state.recorded.put_body = Some(body.clone());
    if let Some((status, body)) = state.failure.clone() {
        return (status, Json(body));
    }
    state.version += 1;
    state.config = body["config"].clone();
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "errors": [],
            "result": {"version": state.version, "config": state.config}
        })),
    )
}

async fn create_dns(
    State(state): State<Shared>,
    Path(zone): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.recorded.path_ids = vec![zone];
    state.recorded.dns_body = Some(body);
    if let Some((status, body)) = state.failure.clone() {
        return (status, Json(body));
    }
    (
        StatusCode::OK,
        Json(json!({"success": true, "errors": [], "result": {"id": "rec1"}})),
    )
}

async fn spawn_fake(config: Value) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeCloudflare {
        config,
        version: 4,
        failure: None,
        recorded: Recorded::default(),
    }));
    let app = Router::new()
        .route(
            "/client/v4/accounts/{account}/cfd_tunnel/{tunnel}/configurations",
            get(get_config).put(put_config),
        )
        .route("/client/v4/zones/{zone}/dns_records", post(create_dns))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/client/v4"), state)
}

fn client_config(base_url: &str) -> CloudflareConfig {
    CloudflareConfig {
        api_base_url: base_url.to_owned(),
        account_id: ACCOUNT.to_owned(),
        tunnel_id: TUNNEL.to_owned(),
        zone_id: ZONE.to_owned(),
        api_token: "test-token".to_owned(),
        request_timeout_secs: 5,
        ..Default::default()
    }
}

fn sample_config() -> Value {
    json!({
        "ingress": [
            {"hostname": "app.example.com", "service": "http://10.0.0.5:8080", "path": "^/v1"},
            {"service": "http_status:404"}
        ],
        "warp-routing": {"enabled": true},
        "originRequest": {"connectTimeout": 30}
    })
}

#[tokio::test]
async fn fetch_reads_rules_and_version() {
    let (base, state) = spawn_fake(sample_config()).await;
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    let config = client.fetch_config().await.unwrap();
    assert_eq!(config.version, Some(4));
    assert_eq!(config.ingress.len(), 2);
    assert!(config.ingress[0].serves("app.example.com"));
    assert!(config.ingress[1].is_catch_all());
    assert!(config.warp_routing.enabled);

    let state = state.lock().unwrap();
    assert_eq!(state.recorded.path_ids, vec![ACCOUNT, TUNNEL]);
    assert_eq!(
        state.recorded.authorization.as_deref(),
        Some("Bearer test-token")
    );
    assert!(state.recorded.auth_key.is_none());
}

#[tokio::test]
async fn publish_round_trips_unknown_fields() {
    let (base, state) = spawn_fake(sample_config()).await;
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    let current = client.fetch_config().await.unwrap();
    let mut rules = current.ingress.clone();
    rules.insert(1, IngressRule::new("new.example.com", "http://new:80"));
    client
        .publish_config(&current.with_ingress(rules))
        .await
        .unwrap();

    let state = state.lock().unwrap();
    let body = state.recorded.put_body.clone().unwrap();
    assert_eq!(
        body,
        json!({
            "config": {
                "ingress": [
                    {"hostname": "app.example.com", "service": "http://10.0.0.5:8080", "path": "^/v1"},
                    {"hostname": "new.example.com", "service": "http://new:80"},
                    {"service": "http_status:404"}
                ],
                "warp-routing": {"enabled": true},
                "originRequest": {"connectTimeout": 30}
            }
        })
    );
    assert_eq!(state.version, 5);
}

#[tokio::test]
async fn global_key_headers_without_token() {
    let (base, state) = spawn_fake(json!({"ingress": []})).await;
    let mut config = client_config(&base);
    config.api_token.clear();
    config.auth_email = "ops@example.com".to_owned();
    config.auth_key = "global-key".to_owned();
    let client = CloudflareClient::new(&config).unwrap();

    client.fetch_config().await.unwrap();

    let state = state.lock().unwrap();
    assert!(state.recorded.authorization.is_none());
    assert_eq!(state.recorded.auth_email.as_deref(), Some("ops@example.com"));
    assert_eq!(state.recorded.auth_key.as_deref(), Some("global-key"));
}

#[tokio::test]
async fn error_status_carries_code_and_body() {
    let (base, state) = spawn_fake(json!({"ingress": []})).await;
    state.lock().unwrap().failure = Some((
        StatusCode::FORBIDDEN,
        json!({"success": false, "errors": [{"code": 10000, "message": "Authentication error"}]}),
    ));
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    match client.fetch_config().await.unwrap_err() {
        IngressError::RemoteFetchFailed { status, body } => {
            assert_eq!(status, Some(403));
            assert!(body.contains("Authentication error"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client
        .publish_config(&Default::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngressError::RemotePublishFailed {
            status: Some(403),
            ..
        }
    ));
}

#[tokio::test]
async fn unsuccessful_envelope_is_an_error() {
    let (base, state) = spawn_fake(json!({"ingress": []})).await;
    state.lock().unwrap().failure = Some((
        StatusCode::OK,
        json!({"success": false, "errors": [{"code": 1003, "message": "Invalid tunnel"}]}),
    ));
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    let err = client.fetch_config().await.unwrap_err();
    assert!(err.to_string().contains("Invalid tunnel"), "{err}");
}

#[tokio::test]
async fn dns_record_is_proxied_cname_to_tunnel() {
    let (base, state) = spawn_fake(json!({"ingress": []})).await;
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    client
        .create_dns_record("app", "example.com")
        .await
        .unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.recorded.path_ids, vec![ZONE]);
    assert_eq!(
        state.recorded.dns_body,
        Some(json!({
            "type": "CNAME",
            "name": "app.example.com",
            "content": format!("{TUNNEL}.cfargotunnel.com"),
            "proxied": true
        }))
    );
}

#[tokio::test]
async fn dns_conflict_is_reported() {
    let (base, state) = spawn_fake(json!({"ingress": []})).await;
    state.lock().unwrap().failure = Some((
        StatusCode::BAD_REQUEST,
        json!({"success": false, "errors": [{"code": 81053, "message": "record already exists"}]}),
    ));
    let client = CloudflareClient::new(&client_config(&base)).unwrap();

    let err = client
        .create_dns_record("app", "example.com")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngressError::DnsRecordFailed {
            status: Some(400),
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_api_has_no_status() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CloudflareClient::new(&client_config(&format!("http://{addr}/client/v4"))).unwrap();
    let err = client.fetch_config().await.unwrap_err();
    assert!(matches!(
        err,
        IngressError::RemoteFetchFailed { status: None, .. }
    ));
}
