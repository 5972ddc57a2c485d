//! 설정 관리 -- cf-watcher.toml 파싱 및 런타임 설정
//!
//! [`CfWatcherConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CF_WATCHER_CLOUDFLARE_TUNNEL_ID=...` 형식, 또는 `CF_TUNNEL_ID` 같은 기존 변수)
//! 3. 설정 파일 (`cf-watcher.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), cfwatcher_core::error::CfWatcherError> {
//! use cfwatcher_core::config::CfWatcherConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 추가 오버라이드 + 검증
//! let config = CfWatcherConfig::load_with("cf-watcher.toml", |config| {
//!     config.general.log_level = "debug".to_owned();
//! })
//! .await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CfWatcherConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CfWatcherError, ConfigError};

/// Cloudflare API 기본 주소
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// 터널 egress 컨테이너를 식별하는 이미지 이름 토큰 기본값
pub const DEFAULT_TUNNEL_IMAGE_TOKEN: &str = "cloudflared";

const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// cf-watcher 통합 설정
///
/// `cf-watcher.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfWatcherConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// Cloudflare 터널 API 설정
    #[serde(default)]
    pub cloudflare: CloudflareConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl CfWatcherConfig {
    /// 설정 파일 → 환경변수 → `overrides` 순서로 값을 덮어쓴 뒤 검증합니다.
    ///
    /// 설정 파일이 없으면 기본값에서 시작하므로 환경변수만으로도 구성할 수 있습니다.
    /// `overrides`는 CLI 인자처럼 환경변수보다 우선하는 값을 적용하는 훅이며,
    /// 검증은 훅이 적용된 뒤에 한 번만 수행됩니다.
    pub async fn load_with<F>(path: impl AsRef<Path>, overrides: F) -> Result<Self, CfWatcherError>
    where
        F: FnOnce(&mut Self),
    {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(CfWatcherError::Config(ConfigError::FileNotFound { path })) => {
                debug!(path = %path, "config file not found, starting from defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CfWatcherError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CfWatcherError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CfWatcherError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CfWatcherError> {
        toml::from_str(toml_str).map_err(|e| {
            CfWatcherError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CF_WATCHER_{SECTION}_{FIELD}`.
    /// 기존 배포와의 호환을 위해 `CF_ACCOUNT_ID`, `CF_TUNNEL_ID`, `CF_ZONE_ID`,
    /// `CF_AUTH_EMAIL`, `CF_AUTH_KEY`, `CF_API_TOKEN`도 읽으며,
    /// 같은 필드에 대해서는 `CF_WATCHER_*` 변수가 우선합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CF_WATCHER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CF_WATCHER_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "CF_WATCHER_DOCKER_SOCKET");
        override_string(
            &mut self.docker.tunnel_image_token,
            "CF_WATCHER_DOCKER_TUNNEL_IMAGE_TOKEN",
        );

        // Cloudflare (legacy names first so the namespaced ones win)
        let cf = &mut self.cloudflare;
        override_string(&mut cf.account_id, "CF_ACCOUNT_ID");
        override_string(&mut cf.tunnel_id, "CF_TUNNEL_ID");
        override_string(&mut cf.zone_id, "CF_ZONE_ID");
        override_string(&mut cf.auth_email, "CF_AUTH_EMAIL");
        override_string(&mut cf.auth_key, "CF_AUTH_KEY");
        override_string(&mut cf.api_token, "CF_API_TOKEN");

        override_string(&mut cf.api_base_url, "CF_WATCHER_CLOUDFLARE_API_BASE_URL");
        override_string(&mut cf.account_id, "CF_WATCHER_CLOUDFLARE_ACCOUNT_ID");
        override_string(&mut cf.tunnel_id, "CF_WATCHER_CLOUDFLARE_TUNNEL_ID");
        override_string(&mut cf.zone_id, "CF_WATCHER_CLOUDFLARE_ZONE_ID");
        override_string(&mut cf.auth_email, "CF_WATCHER_CLOUDFLARE_AUTH_EMAIL");
        override_string(&mut cf.auth_key, "CF_WATCHER_CLOUDFLARE_AUTH_KEY");
        override_string(&mut cf.api_token, "CF_WATCHER_CLOUDFLARE_API_TOKEN");
        override_u64(
            &mut cf.request_timeout_secs,
            "CF_WATCHER_CLOUDFLARE_REQUEST_TIMEOUT_SECS",
        );
        override_bool(
            &mut cf.create_dns_records,
            "CF_WATCHER_CLOUDFLARE_CREATE_DNS_RECORDS",
        );
        override_bool(&mut cf.verify_version, "CF_WATCHER_CLOUDFLARE_VERIFY_VERSION");

        // Metrics
        override_bool(&mut self.metrics.enabled, "CF_WATCHER_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "CF_WATCHER_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "CF_WATCHER_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CfWatcherError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.docker.tunnel_image_token.trim().is_empty() {
            return Err(invalid(
                "docker.tunnel_image_token",
                "must not be empty".to_owned(),
            ));
        }

        self.cloudflare.validate()?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub socket: String,
    /// 터널 egress 컨테이너 이미지 이름에 포함된 토큰
    pub tunnel_image_token: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            tunnel_image_token: DEFAULT_TUNNEL_IMAGE_TOKEN.to_owned(),
        }
    }
}

/// Cloudflare 터널 API 설정
///
/// 자격 증명은 API 토큰(`api_token`) 또는 글로벌 키(`auth_email` + `auth_key`)
/// 중 하나가 필요합니다. 둘 다 있으면 토큰이 우선합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    /// API 기본 주소
    pub api_base_url: String,
    /// 계정 ID
    pub account_id: String,
    /// 터널 ID
    pub tunnel_id: String,
    /// DNS 영역(zone) ID
    pub zone_id: String,
    /// 글로벌 키 인증 이메일
    pub auth_email: String,
    /// 글로벌 API 키
    pub auth_key: String,
    /// API 토큰
    pub api_token: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 라우트 생성 후 CNAME 레코드도 생성할지 여부
    pub create_dns_records: bool,
    /// 게시 직전에 원격 설정 버전이 바뀌었는지 확인할지 여부
    pub verify_version: bool,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            account_id: String::new(),
            tunnel_id: String::new(),
            zone_id: String::new(),
            auth_email: String::new(),
            auth_key: String::new(),
            api_token: String::new(),
            request_timeout_secs: 30,
            create_dns_records: false,
            verify_version: true,
        }
    }
}

impl CloudflareConfig {
    /// API 토큰 인증을 사용하는지 여부
    pub fn uses_api_token(&self) -> bool {
        !self.api_token.is_empty()
    }

    /// Cloudflare 섹션의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CfWatcherError> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(invalid(
                "cloudflare.api_base_url",
                "must start with http:// or https://".to_owned(),
            ));
        }

        if self.account_id.is_empty() {
            return Err(invalid("cloudflare.account_id", "must not be empty".to_owned()));
        }

        if self.tunnel_id.is_empty() {
            return Err(invalid("cloudflare.tunnel_id", "must not be empty".to_owned()));
        }

        if !self.uses_api_token() && (self.auth_email.is_empty() || self.auth_key.is_empty()) {
            return Err(invalid(
                "cloudflare.api_token",
                "either api_token or both auth_email and auth_key are required".to_owned(),
            ));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(invalid(
                "cloudflare.request_timeout_secs",
                format!("must be 1-{MAX_REQUEST_TIMEOUT_SECS}"),
            ));
        }

        if self.create_dns_records && self.zone_id.is_empty() {
            return Err(invalid(
                "cloudflare.zone_id",
                "zone_id must not be empty when create_dns_records is enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인딩 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

fn invalid(field: &str, reason: String) -> CfWatcherError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
