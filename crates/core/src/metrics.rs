//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `cfwatcher_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(cfwatcher_core::metrics::EVENTS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 조정 결과 레이블 키 (skipped, routed, already_routed, failed)
pub const LABEL_OUTCOME: &str = "outcome";

/// 실패한 단계 레이블 키 (inspect, fetch, verify, publish)
pub const LABEL_OPERATION: &str = "operation";

// ─── 조정 메트릭 ───────────────────────────────────────────────────

/// 수신한 컨테이너 라이프사이클 이벤트 수 (counter)
pub const EVENTS_RECEIVED_TOTAL: &str = "cfwatcher_events_received_total";

/// 결과별 조정 횟수 (counter, label: outcome)
pub const RECONCILIATIONS_TOTAL: &str = "cfwatcher_reconciliations_total";

/// 조정 실패 수 (counter, label: operation)
pub const RECONCILE_FAILURES_TOTAL: &str = "cfwatcher_reconcile_failures_total";

/// 게시된 인그레스 설정 수 (counter)
pub const ROUTES_PUBLISHED_TOTAL: &str = "cfwatcher_routes_published_total";

/// 생성된 DNS 레코드 수 (counter, label: result)
pub const DNS_RECORDS_TOTAL: &str = "cfwatcher_dns_records_total";

/// 조정 1회 소요 시간 (histogram, 초)
pub const RECONCILE_DURATION_SECONDS: &str = "cfwatcher_reconcile_duration_seconds";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 전체 메트릭 이름 목록
pub const ALL_METRIC_NAMES: [&str; 6] = [
    EVENTS_RECEIVED_TOTAL,
    RECONCILIATIONS_TOTAL,
    RECONCILE_FAILURES_TOTAL,
    ROUTES_PUBLISHED_TOTAL,
    DNS_RECORDS_TOTAL,
    RECONCILE_DURATION_SECONDS,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        EVENTS_RECEIVED_TOTAL,
        "Total number of container lifecycle events received"
    );
    describe_counter!(
        RECONCILIATIONS_TOTAL,
        "Total number of reconciliations by outcome"
    );
    describe_counter!(
        RECONCILE_FAILURES_TOTAL,
        "Total number of failed reconciliations by operation"
    );
    describe_counter!(
        ROUTES_PUBLISHED_TOTAL,
        "Total number of ingress configurations published to the tunnel"
    );
    describe_counter!(
        DNS_RECORDS_TOTAL,
        "Total number of DNS record creation attempts by result"
    );
    describe_histogram!(
        RECONCILE_DURATION_SECONDS,
        "Time to reconcile a single container event in seconds"
    );
}
