//! 메트릭 상수, 설명 등록, 주입 가능한 메트릭 싱크
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 전역 매크로를 직접 호출하지 않고 생성 시 주입된 [`MetricsSink`]를 통해
//! 카운터를 기록합니다. 운영 환경에서는 [`RecorderMetrics`]가 `metrics` 파사드로
//! 전달하고, 테스트에서는 [`LocalMetrics`]가 값을 메모리에 모읍니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logwarden_`
//! - 접미어: `_total` (counter), `_seconds` (시각/지연), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use logwarden_core::metrics::{self, MetricsSink, LocalMetrics};
//!
//! let sink = LocalMetrics::new();
//! sink.increment(metrics::LINES_PROCESSED_TOTAL, &[(metrics::LABEL_SOURCE, "kernel")], 1);
//! assert_eq!(sink.counter(metrics::LINES_PROCESSED_TOTAL, &[(metrics::LABEL_SOURCE, "kernel")]), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 소스 레이블 키 (모니터 이름)
pub const LABEL_SOURCE: &str = "source";

/// 전송 결과 레이블 키 (sent, failed, rate_limited, dropped)
pub const LABEL_STATUS: &str = "status";

/// 전송 결과: 성공
pub const STATUS_SENT: &str = "sent";

/// 전송 결과: 실패 (재시도 큐로 이동)
pub const STATUS_FAILED: &str = "failed";

/// 전송 결과: 속도 제한으로 드롭
pub const STATUS_RATE_LIMITED: &str = "rate_limited";

/// 전송 결과: 발송 대기열이 가득 차 드롭
pub const STATUS_DROPPED: &str = "dropped";

// ─── 모니터 메트릭 ──────────────────────────────────────────────────

/// 읽은 라인 수 (counter, label: source)
pub const LINES_PROCESSED_TOTAL: &str = "logwarden_lines_processed_total";

/// 디텍터에 매칭된 라인 수 (counter, label: source)
pub const ISSUES_DETECTED_TOTAL: &str = "logwarden_issues_detected_total";

/// 제외 패턴으로 버린 라인 수 (counter, label: source)
pub const LINES_EXCLUDED_TOTAL: &str = "logwarden_lines_excluded_total";

/// 최대 길이를 넘어 잘린 라인 수 (counter, label: source)
pub const LINES_TRUNCATED_TOTAL: &str = "logwarden_lines_truncated_total";

/// 리포트 처리 결과 (counter, labels: source, status)
pub const REPORTS_TOTAL: &str = "logwarden_reports_total";

/// 비활성 경보 발생 수 (counter, label: source)
pub const INACTIVITY_ALERTS_TOTAL: &str = "logwarden_inactivity_alerts_total";

/// 소스 재연결 횟수 (counter, label: source)
pub const SOURCE_RESTARTS_TOTAL: &str = "logwarden_source_restarts_total";

/// 마지막으로 라인을 읽은 시각 (gauge, Unix epoch 초, label: source)
pub const LAST_ACTIVITY_TIMESTAMP_SECONDS: &str = "logwarden_last_activity_timestamp_seconds";

// ─── 전송/데몬 메트릭 ────────────────────────────────────────────────

/// 재시도 스풀에 남아 있는 리포트 수 (gauge)
pub const SPOOL_DEPTH: &str = "logwarden_spool_depth";

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logwarden_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logwarden_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `logwarden-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        LINES_PROCESSED_TOTAL,
        "Total number of log lines read from each source"
    );
    describe_counter!(
        ISSUES_DETECTED_TOTAL,
        "Total number of log lines matched by the source's detector"
    );
    describe_counter!(
        LINES_EXCLUDED_TOTAL,
        "Total number of matched lines discarded by the exclusion pattern"
    );
    describe_counter!(
        LINES_TRUNCATED_TOTAL,
        "Total number of log lines cut at the maximum line length"
    );
    describe_counter!(
        REPORTS_TOTAL,
        "Reports by outcome (sent, failed, rate_limited, dropped)"
    );
    describe_counter!(
        INACTIVITY_ALERTS_TOTAL,
        "Number of times a source crossed its inactivity threshold"
    );
    describe_counter!(
        SOURCE_RESTARTS_TOTAL,
        "Number of times a source stream was reopened after EOF or error"
    );
    describe_gauge!(
        LAST_ACTIVITY_TIMESTAMP_SECONDS,
        "Unix time of the last line read from each source"
    );
    describe_gauge!(SPOOL_DEPTH, "Reports waiting in the retry spool");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}

// ─── MetricsSink ─────────────────────────────────────────────────────

/// 메트릭 기록 대상
///
/// 모니터와 전송 계층은 생성 시 `Arc<dyn MetricsSink>`를 주입받습니다.
pub trait MetricsSink: Send + Sync {
    /// 카운터를 증가시킵니다.
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)], value: u64);

    /// 게이지 값을 설정합니다.
    fn gauge(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64);
}

/// `metrics` 파사드로 기록하는 싱크
///
/// 전역 레코더가 설치되지 않았으면 기록은 버려집니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)], value: u64) {
        metrics::counter!(name, to_labels(labels)).increment(value);
    }

    fn gauge(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64) {
        metrics::gauge!(name, to_labels(labels)).set(value);
    }
}

fn to_labels(labels: &[(&'static str, &str)]) -> Vec<metrics::Label> {
    labels
        .iter()
        .map(|(k, v)| metrics::Label::new(*k, (*v).to_owned()))
        .collect()
}

/// 아무것도 기록하지 않는 싱크
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str, _labels: &[(&'static str, &str)], _value: u64) {}

    fn gauge(&self, _name: &'static str, _labels: &[(&'static str, &str)], _value: f64) {}
}

/// 메모리에 값을 모으는 싱크 (테스트용)
#[derive(Debug, Default)]
pub struct LocalMetrics {
    counters: Mutex<BTreeMap<String, u64>>,
    gauges: Mutex<BTreeMap<String, f64>>,
}

impl LocalMetrics {
    /// 빈 수집기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 카운터 값을 조회합니다. 기록이 없으면 0입니다.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = series_key(name, labels);
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// 게이지 값을 조회합니다.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let key = series_key(name, labels);
        self.gauges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied()
    }
}

impl MetricsSink for LocalMetrics {
    fn increment(&self, name: &'static str, labels: &[(&'static str, &str)], value: u64) {
        let key = series_key(name, labels);
        *self
            .counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert(0) += value;
    }

    fn gauge(&self, name: &'static str, labels: &[(&'static str, &str)], value: f64) {
        let key = series_key(name, labels);
        self.gauges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }
}

/// `name{k=v,k=v}` 형식의 시계열 키 (레이블은 키 순으로 정렬)
fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = labels.to_vec();
    sorted.sort_unstable();
    let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}
