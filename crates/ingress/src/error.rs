//! 인그레스 조정 에러 타입
//!
//! [`IngressError`]는 라벨 파싱, Docker API 호출, Cloudflare API 호출에서
//! 발생하는 모든 에러를 표현합니다.

/// 인그레스 조정 도메인 에러
///
/// 하나의 이벤트 처리에 국한되며, 감시 루프를 중단시키지 않습니다.
/// (단, [`IngressError::EventStream`]은 이벤트 소스 자체의 실패입니다.)
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// 컨테이너가 cf_watcher를 활성화하지 않음 (실패가 아닌 opt-out)
    #[error("cf_watcher is not enabled for container '{container}'")]
    Disabled {
        /// 대상 컨테이너 이름
        container: String,
    },

    /// 터널 네트워크를 결정할 수 없음
    #[error(
        "cf_watcher.cf_network is required but could not be determined automatically for container '{container}'"
    )]
    NetworkUnresolved {
        /// 대상 컨테이너 이름
        container: String,
    },

    /// 필수 규칙 속성 누락 또는 형식 오류
    #[error("invalid rule property '{property}': {reason}")]
    InvalidRule {
        /// 문제가 된 속성명 (`subdomain`, `port` 등)
        property: String,
        /// 실패 사유
        reason: String,
    },

    /// 터널 설정 조회 실패
    #[error("failed to fetch tunnel configuration: {}", describe_remote(.status, .body))]
    RemoteFetchFailed {
        /// HTTP 상태 코드 (전송 자체가 실패한 경우 None)
        status: Option<u16>,
        /// 응답 본문 또는 전송 에러 메시지
        body: String,
    },

    /// 터널 설정 게시 실패
    #[error("failed to publish tunnel configuration: {}", describe_remote(.status, .body))]
    RemotePublishFailed {
        /// HTTP 상태 코드 (전송 자체가 실패한 경우 None)
        status: Option<u16>,
        /// 응답 본문 또는 전송 에러 메시지
        body: String,
    },

    /// DNS 레코드 생성 실패
    #[error("failed to create dns record: {}", describe_remote(.status, .body))]
    DnsRecordFailed {
        /// HTTP 상태 코드 (전송 자체가 실패한 경우 None)
        status: Option<u16>,
        /// 응답 본문 또는 전송 에러 메시지
        body: String,
    },

    /// 조회와 게시 사이에 원격 설정이 변경됨
    #[error("tunnel configuration changed concurrently: fetched version {expected:?}, found {found:?}")]
    VersionConflict {
        /// 처음 조회한 버전
        expected: Option<u64>,
        /// 게시 직전에 확인한 버전
        found: Option<u64>,
    },

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 이벤트 스트림 실패 (감시 루프 종료 사유)
    #[error("event stream error: {0}")]
    EventStream(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl IngressError {
    /// 필수 속성 누락 에러를 생성합니다.
    pub(crate) fn missing(property: &str) -> Self {
        Self::InvalidRule {
            property: property.to_owned(),
            reason: "required property is missing".to_owned(),
        }
    }

    /// 속성 형식 오류 에러를 생성합니다.
    pub(crate) fn malformed(property: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            property: property.to_owned(),
            reason: reason.into(),
        }
    }
}

fn describe_remote(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("unexpected response code: {code}, body: {body}"),
        None => body.to_owned(),
    }
}
