//! 리포트 조립 -- 플러시된 배치와 시스템 상태를 [`Report`]로 변환합니다.
//!
//! | 위치 | 키 | 값 |
//! |---|---|---|
//! | tags | `source` | 모니터 이름 |
//! | tags | `log_timestamp` | 배치 기준 타임스탬프 원문 |
//! | tags | `syslog_facility`, `syslog_severity` | 첫 줄 `<PRI>` |
//! | contexts | `Log Data` | 디텍터가 추출한 첫 줄 컨텍스트 |
//! | contexts | `Server State` | 상태 제공자 스냅샷 (그대로 복사) |
//! | extra | `line_count`, `byte_count`, `raw_line` | 배치 통계, 변환 전 첫 줄 |

use std::time::Duration;

use serde_json::Value;

use logwarden_core::types::{Report, Severity, StateSnapshot};

use crate::detector::Context;
use crate::monitor::batch::Batch;

/// 디텍터 컨텍스트 이름
pub const LOG_DATA_CONTEXT: &str = "Log Data";

/// 시스템 상태 컨텍스트 이름
pub const SERVER_STATE_CONTEXT: &str = "Server State";

/// 비활성 경보 태그 값
pub const INACTIVITY_ALERT_TYPE: &str = "inactivity";

/// 구조화 로그에서 심각도를 찾는 필드 (앞쪽 우선)
const LEVEL_FIELDS: [&str; 4] = ["level", "severity", "log_level", "type"];

/// 배치로 리포트를 조립합니다.
pub fn compose_report(source: &str, batch: &Batch, state: Option<StateSnapshot>) -> Report {
    let metadata = batch.metadata();
    let mut report = Report::new(batch.message(), severity_for(batch))
        .with_tag("source", source)
        .with_extra("line_count", Value::from(batch.line_count()))
        .with_extra("byte_count", Value::from(batch.byte_count()))
        .with_extra("raw_line", Value::from(metadata.raw_line.clone()));

    if let Some(anchor) = batch.anchor() {
        report = report.with_tag("log_timestamp", anchor.text.clone());
    }
    if let Some(priority) = metadata.priority {
        report = report
            .with_tag("syslog_facility", priority.facility.to_string())
            .with_tag("syslog_severity", priority.severity.to_string());
    }
    if let Some(context) = metadata.context.as_ref().filter(|c| !c.is_empty()) {
        report = report.with_context(LOG_DATA_CONTEXT, context.clone());
    }
    if let Some(state) = state {
        report = report.with_context(SERVER_STATE_CONTEXT, state);
    }
    report
}

/// 배치의 심각도를 결정합니다.
///
/// syslog `<PRI>`가 구조화 로그의 레벨 필드보다 우선하며, 둘 다 없으면 Error입니다.
pub fn severity_for(batch: &Batch) -> Severity {
    let metadata = batch.metadata();
    if let Some(priority) = metadata.priority {
        return Severity::from_syslog_severity(priority.severity);
    }
    metadata
        .context
        .as_ref()
        .and_then(severity_from_context)
        .unwrap_or_default()
}

fn severity_from_context(context: &Context) -> Option<Severity> {
    LEVEL_FIELDS
        .iter()
        .filter_map(|field| context.get(*field).and_then(Value::as_str))
        .find_map(Severity::from_str_loose)
}

/// 소스가 조용해졌을 때의 경보 리포트
pub fn inactivity_report(source: &str, threshold: Duration) -> Report {
    Report::new(
        format!(
            "No logs received from {source} for {}",
            format_duration(threshold)
        ),
        Severity::Warning,
    )
    .with_tag("source", source)
    .with_tag("alert_type", INACTIVITY_ALERT_TYPE)
}

/// 소스가 다시 살아났을 때의 복구 리포트
pub fn recovery_report(source: &str) -> Report {
    Report::new(format!("Logs resumed for {source}"), Severity::Info)
        .with_tag("source", source)
        .with_tag("alert_type", INACTIVITY_ALERT_TYPE)
}

/// `1h30m`, `10s`, `250ms` 형식으로 표시합니다.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_owned();
    }
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }

    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
