//! Cloudflare Tunnel API client.
//!
//! [`TunnelApi`] is the seam between the reconciler and the remote tunnel
//! configuration. [`CloudflareClient`] implements it over the Cloudflare v4
//! REST API with `reqwest`:
//!
//! | Operation           | Request                                                              |
//! |---------------------|----------------------------------------------------------------------|
//! | `fetch_config`      | `GET  {base}/accounts/{account}/cfd_tunnel/{tunnel}/configurations` |
//! | `publish_config`    | `PUT  {base}/accounts/{account}/cfd_tunnel/{tunnel}/configurations` |
//! | `create_dns_record` | `POST {base}/zones/{zone}/dns_records`                              |
//!
//! Credentials come from [`CloudflareConfig`]; the client never reads the
//! process environment.

use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use cfwatcher_core::config::CloudflareConfig;

use crate::error::IngressError;
use crate::rule::{PublishRequest, TunnelConfigResponse, TunnelConfiguration};

/// Suffix of the hostname every tunnel answers on.
pub const TUNNEL_DNS_SUFFIX: &str = "cfargotunnel.com";

/// Remote tunnel configuration store.
pub trait TunnelApi: Send + Sync + 'static {
    /// Reads the current configuration, including its version.
    ///
    /// # Errors
    ///
    /// `IngressError::RemoteFetchFailed` on transport errors, non-2xx
    /// responses, or an unsuccessful API envelope.
    fn fetch_config(
        &self,
    ) -> impl Future<Output = Result<TunnelConfiguration, IngressError>> + Send;

    /// Replaces the whole remote configuration with `config`.
    ///
    /// # Errors
    ///
    /// `IngressError::RemotePublishFailed`; the remote state is unchanged.
    fn publish_config(
        &self,
        config: &TunnelConfiguration,
    ) -> impl Future<Output = Result<(), IngressError>> + Send;

    /// Creates a proxied CNAME `subdomain.domain` pointing at the tunnel.
    ///
    /// # Errors
    ///
    /// `IngressError::DnsRecordFailed`
    fn create_dns_record(
        &self,
        subdomain: &str,
        domain: &str,
    ) -> impl Future<Output = Result<(), IngressError>> + Send;
}

enum Credentials {
    Token(String),
    Key { email: String, key: String },
}

/// Production [`TunnelApi`] implementation.
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    tunnel_id: String,
    zone_id: String,
    credentials: Credentials,
}

impl CloudflareClient {
    /// Builds a client from explicit configuration.
    ///
    /// # Errors
    ///
    /// `IngressError::Config` when identifiers or credentials are missing or
    /// the HTTP client cannot be built.
    pub fn new(config: &CloudflareConfig) -> Result<Self, IngressError> {
        if config.account_id.is_empty() {
            return Err(config_error("cloudflare.account_id", "must not be empty"));
        }
        if config.tunnel_id.is_empty() {
            return Err(config_error("cloudflare.tunnel_id", "must not be empty"));
        }

        let credentials = if config.uses_api_token() {
            Credentials::Token(config.api_token.clone())
        } else if !config.auth_email.is_empty() && !config.auth_key.is_empty() {
            Credentials::Key {
                email: config.auth_email.clone(),
                key: config.auth_key.clone(),
            }
        } else {
            return Err(config_error(
                "cloudflare.api_token",
                "set api_token or both auth_email and auth_key",
            ));
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("cf-watcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| config_error("cloudflare", &format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            account_id: config.account_id.clone(),
            tunnel_id: config.tunnel_id.clone(),
            zone_id: config.zone_id.clone(),
            credentials,
        })
    }

    fn configurations_url(&self) -> String {
        format!(
            "{}/accounts/{}/cfd_tunnel/{}/configurations",
            self.base_url, self.account_id, self.tunnel_id
        )
    }

    fn dns_records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Key { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }
}

impl TunnelApi for CloudflareClient {
    async fn fetch_config(&self) -> Result<TunnelConfiguration, IngressError> {
        let url = self.configurations_url();
        debug!(url = %url, "fetching tunnel configuration");

        let fail = |status, body| IngressError::RemoteFetchFailed { status, body };
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| fail(None, e.to_string()))?;
        let (status, body) = read_success(response).await.map_err(|(s, b)| fail(s, b))?;

        let envelope: TunnelConfigResponse = serde_json::from_str(&body)
            .map_err(|e| fail(Some(status.as_u16()), format!("invalid response body: {e}")))?;
        if !envelope.success {
            return Err(fail(Some(status.as_u16()), errors_text(&envelope.errors)));
        }

        let config = envelope.into_configuration();
        debug!(
            rules = config.ingress.len(),
            version = ?config.version,
            "fetched tunnel configuration"
        );
        Ok(config)
    }

    async fn publish_config(&self, config: &TunnelConfiguration) -> Result<(), IngressError> {
        let url = self.configurations_url();
        debug!(url = %url, rules = config.ingress.len(), "publishing tunnel configuration");

        let fail = |status, body| IngressError::RemotePublishFailed { status, body };
        let response = self
            .authorize(self.http.put(&url))
            .json(&PublishRequest { config })
            .send()
            .await
            .map_err(|e| fail(None, e.to_string()))?;
        let (status, body) = read_success(response).await.map_err(|(s, b)| fail(s, b))?;
        check_envelope(&body).map_err(|errors| fail(Some(status.as_u16()), errors))
    }

    async fn create_dns_record(&self, subdomain: &str, domain: &str) -> Result<(), IngressError> {
        let url = self.dns_records_url();
        let record = DnsRecord {
            record_type: "CNAME",
            name: format!("{subdomain}.{domain}"),
            content: format!("{}.{TUNNEL_DNS_SUFFIX}", self.tunnel_id),
            proxied: true,
        };
        debug!(url = %url, name = %record.name, "creating dns record");

        let fail = |status, body| IngressError::DnsRecordFailed { status, body };
        let response = self
            .authorize(self.http.post(&url))
            .json(&record)
            .send()
            .await
            .map_err(|e| fail(None, e.to_string()))?;
        let (status, body) = read_success(response).await.map_err(|(s, b)| fail(s, b))?;
        check_envelope(&body).map_err(|errors| fail(Some(status.as_u16()), errors))
    }
}

#[derive(Debug, Serialize)]
struct DnsRecord {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: String,
    content: String,
    proxied: bool,
}

/// Minimal Cloudflare response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Returns status and body of a 2xx response, or the failing status and body.
async fn read_success(response: Response) -> Result<(StatusCode, String), (Option<u16>, String)> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| (Some(status.as_u16()), format!("failed to read body: {e}")))?;
    if !status.is_success() {
        return Err((Some(status.as_u16()), body));
    }
    Ok((status, body))
}

/// Accepts an empty body or an envelope with `success: true`.
fn check_envelope(body: &str) -> Result<(), String> {
    if body.trim().is_empty() {
        return Ok(());
    }
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|e| format!("invalid response body: {e}"))?;
    if envelope.success {
        Ok(())
    } else {
        Err(errors_text(&envelope.errors))
    }
}

fn errors_text(errors: &[Value]) -> String {
    if errors.is_empty() {
        "api reported success=false".to_owned()
    } else {
        Value::Array(errors.to_vec()).to_string()
    }
}

fn config_error(field: &str, reason: &str) -> IngressError {
    IngressError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 테스트용 Mock 터널 API
///
/// 게시된 설정을 메모리에 보관하고, 게시할 때마다 버전을 증가시킵니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockTunnelApi {
    state: std::sync::Mutex<TunnelConfiguration>,
    /// 게시된 설정 이력
    pub published: std::sync::Mutex<Vec<TunnelConfiguration>>,
    /// 생성된 DNS 레코드 이름
    pub dns_records: std::sync::Mutex<Vec<String>>,
    pub fetch_calls: std::sync::atomic::AtomicUsize,
    pub fail_fetch: bool,
    pub fail_publish: bool,
    pub fail_dns: bool,
    /// 첫 조회 이후 다른 작성자가 설정을 바꾼 것처럼 동작
    pub concurrent_writer: bool,
}

#[cfg(test)]
impl MockTunnelApi {
    pub fn with_rules(rules: Vec<crate::rule::IngressRule>) -> Self {
        let config = TunnelConfiguration {
            ingress: rules,
            version: Some(1),
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: TunnelConfiguration) -> Self {
        Self {
            state: std::sync::Mutex::new(config),
            ..Default::default()
        }
    }

    pub fn current(&self) -> TunnelConfiguration {
        self.state.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TunnelApi for MockTunnelApi {
    async fn fetch_config(&self) -> Result<TunnelConfiguration, IngressError> {
        let calls = self
            .fetch_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_fetch {
            return Err(IngressError::RemoteFetchFailed {
                status: Some(500),
                body: "internal error".to_owned(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if self.concurrent_writer && calls > 0 {
            state.version = state.version.map(|v| v + 1);
        }
        Ok(state.clone())
    }

    async fn publish_config(&self, config: &TunnelConfiguration) -> Result<(), IngressError> {
        if self.fail_publish {
            return Err(IngressError::RemotePublishFailed {
                status: Some(400),
                body: "bad request".to_owned(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let version = state.version.map(|v| v + 1);
        *state = config.clone();
        state.version = version;
        self.published.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn create_dns_record(&self, subdomain: &str, domain: &str) -> Result<(), IngressError> {
        if self.fail_dns {
            return Err(IngressError::DnsRecordFailed {
                status: Some(409),
                body: "record already exists".to_owned(),
            });
        }
        self.dns_records
            .lock()
            .unwrap()
            .push(format!("{subdomain}.{domain}"));
        Ok(())
    }
}
