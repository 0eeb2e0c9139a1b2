//! JSON 필드 디텍터
//!
//! 패턴 형식은 `field:regex`입니다. 라인을 JSON 객체로 파싱해 `field` 값이 정규식과
//! 일치하면 매칭으로 봅니다. 문자열 값은 그대로, 그 외 스칼라는 JSON 표기로 비교합니다.
//!
//! 같은 라인에 대해 `detect` → 컨텍스트 → 타임스탬프 순으로 호출되므로,
//! 마지막으로 파싱한 문서를 라인 바이트와 함께 캐시해 두고 재사용합니다.
//! 다른 라인이 들어오면(파싱 실패 포함) 캐시는 교체되거나 비워집니다.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use super::{Context, ContextExtractor, Detector, TimestampExtractor};
use crate::error::EngineError;
use crate::timestamp::LineTimestamp;

/// 타임스탬프로 볼 필드 (앞쪽 우선)
pub const TIMESTAMP_FIELDS: [&str; 5] = ["time", "timestamp", "ts", "date", "@timestamp"];

/// 시간대 없는 문자열 레이아웃 (UTC로 간주)
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// 이 값보다 큰 숫자 타임스탬프는 밀리초로 봅니다.
const MILLIS_THRESHOLD: f64 = 1e11;

struct Cached {
    line: Vec<u8>,
    document: Arc<Context>,
}

/// 구조화 필드 디텍터
pub struct JsonDetector {
    field: String,
    regex: Regex,
    cache: Mutex<Option<Cached>>,
}

impl JsonDetector {
    /// `field:regex` 패턴으로 생성합니다.
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidPattern {
            format: "json".to_owned(),
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        let (field, expr) = pattern
            .split_once(':')
            .ok_or_else(|| invalid("expected 'field:regex'"))?;
        let (field, expr) = (field.trim(), expr.trim());
        if field.is_empty() {
            return Err(invalid("field name is empty"));
        }
        if expr.is_empty() {
            return Err(invalid("regex is empty"));
        }
        let regex = Regex::new(expr).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            field: field.to_owned(),
            regex,
            cache: Mutex::new(None),
        })
    }

    /// 검사 대상 필드 이름
    pub fn field(&self) -> &str {
        &self.field
    }

    /// 라인을 파싱하거나 캐시된 문서를 돌려줍니다.
    fn document(&self, line: &[u8]) -> Option<Arc<Context>> {
        {
            let guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = guard.as_ref().filter(|c| c.line == line) {
                return Some(Arc::clone(&cached.document));
            }
        }

        let parsed = serde_json::from_slice::<Context>(line).ok().map(Arc::new);
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *guard = parsed.as_ref().map(|document| Cached {
            line: line.to_vec(),
            document: Arc::clone(document),
        });
        parsed
    }
}

impl Detector for JsonDetector {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn detect(&self, line: &[u8]) -> bool {
        let Some(document) = self.document(line) else {
            return false;
        };
        document
            .get(&self.field)
            .is_some_and(|value| self.regex.is_match(&render(value)))
    }

    fn as_context_extractor(&self) -> Option<&dyn ContextExtractor> {
        Some(self)
    }

    fn as_timestamp_extractor(&self) -> Option<&dyn TimestampExtractor> {
        Some(self)
    }
}

impl ContextExtractor for JsonDetector {
    fn context(&self, line: &[u8]) -> Option<Context> {
        self.document(line).map(|document| (*document).clone())
    }
}

impl TimestampExtractor for JsonDetector {
    fn extract_timestamp(&self, line: &[u8]) -> Option<LineTimestamp> {
        let document = self.document(line)?;
        TIMESTAMP_FIELDS
            .iter()
            .filter_map(|name| document.get(*name))
            .find_map(timestamp_from_value)
    }
}

impl std::fmt::Debug for JsonDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDetector")
            .field("field", &self.field)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// 비교용 문자열 표현
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timestamp_from_value(value: &Value) -> Option<LineTimestamp> {
    match value {
        Value::String(s) => parse_time_text(s).map(|epoch| LineTimestamp {
            epoch,
            text: s.clone(),
        }),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            let epoch = if raw > MILLIS_THRESHOLD { raw / 1000.0 } else { raw };
            Some(LineTimestamp {
                epoch,
                text: format!("{epoch:.3}"),
            })
        }
        _ => None,
    }
}

fn parse_time_text(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9);
    }
    NAIVE_LAYOUTS.iter().find_map(|layout| {
        let naive = NaiveDateTime::parse_from_str(s, layout).ok()?;
        let utc = naive.and_utc();
        Some(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_split_on_first_colon_and_trimmed() {
        let d = JsonDetector::new(" msg : ^a:b$ ").unwrap();
        assert_eq!(d.field(), "msg");
        assert!(d.detect(br#"{"msg":"a:b"}"#));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for pattern in ["level", ":error", "level:", "level:(unclosed"] {
            let err = JsonDetector::new(pattern).unwrap_err();
            assert!(matches!(err, EngineError::InvalidPattern { .. }), "{pattern}");
        }
    }

    #[test]
    fn matches_rendered_field_value() {
        let d = JsonDetector::new("level:^(error|fatal)$").unwrap();
        assert!(d.detect(br#"{"level":"error","msg":"db down"}"#));
        assert!(d.detect(br#"{"level":"fatal"}"#));
        assert!(!d.detect(br#"{"level":"info"}"#));
        assert!(!d.detect(br#"{"msg":"error"}"#));
        assert!(!d.detect(b"level=error not json"));
        assert!(!d.detect(br#"["error"]"#));
    }

    #[test]
    fn non_string_values_use_json_text() {
        let d = JsonDetector::new("status:^5\\d\\d$").unwrap();
        assert!(d.detect(br#"{"status":503}"#));
        assert!(!d.detect(br#"{"status":200}"#));

        let d = JsonDetector::new("ok:false").unwrap();
        assert!(d.detect(br#"{"ok":false}"#));
    }

    #[test]
    fn context_follows_latest_line() {
        let d = JsonDetector::new("level:error").unwrap();
        let first = br#"{"level":"error","id":1}"#;
        let second = br#"{"level":"error","id":2}"#;

        assert!(d.detect(first));
        let ctx = d.as_context_extractor().unwrap().context(first).unwrap();
        assert_eq!(ctx["id"], 1);

        assert!(d.detect(second));
        let ctx = d.as_context_extractor().unwrap().context(second).unwrap();
        assert_eq!(ctx["id"], 2);
    }

    #[test]
    fn shared_detector_keeps_context_per_line() {
        let d = Arc::new(JsonDetector::new("level:error").unwrap());

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let d = Arc::clone(&d);
                scope.spawn(move || {
                    for i in 0..500 {
                        let id = worker * 1000 + i;
                        let line = format!(r#"{{"level":"error","id":{id}}}"#);
                        assert!(d.detect(line.as_bytes()));
                        let ctx = d
                            .as_context_extractor()
                            .unwrap()
                            .context(line.as_bytes())
                            .unwrap();
                        assert_eq!(ctx["id"], id);
                    }
                });
            }
        });
    }

    #[test]
    fn unparseable_line_clears_cache() {
        let d = JsonDetector::new("level:error").unwrap();
        assert!(d.detect(br#"{"level":"error","id":1}"#));
        assert!(!d.detect(b"garbage"));
        assert!(d.cache.lock().unwrap().is_none());
        assert!(d.as_context_extractor().unwrap().context(b"garbage").is_none());
    }

    #[test]
    fn context_without_detect_parses_directly() {
        let d = JsonDetector::new("level:error").unwrap();
        let ctx = d
            .as_context_extractor()
            .unwrap()
            .context(br#"{"level":"warn","host":"web-1"}"#)
            .unwrap();
        assert_eq!(ctx["host"], "web-1");
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn timestamp_from_rfc3339_string() {
        let d = JsonDetector::new("level:error").unwrap();
        let line = br#"{"level":"error","time":"2023-10-27T10:00:00.5+02:00"}"#;
        let ts = d.as_timestamp_extractor().unwrap().extract_timestamp(line).unwrap();
        assert_eq!(ts.text, "2023-10-27T10:00:00.5+02:00");
        assert!((ts.epoch - 1_698_393_600.5).abs() < 1e-6);
    }

    #[test]
    fn timestamp_from_naive_layouts() {
        let d = JsonDetector::new("level:error").unwrap();
        let ex = d.as_timestamp_extractor().unwrap();
        let a = ex.extract_timestamp(br#"{"timestamp":"2023-10-27 10:00:00"}"#).unwrap();
        let b = ex.extract_timestamp(br#"{"timestamp":"2023-10-27T10:00:00"}"#).unwrap();
        assert_eq!(a.epoch, 1_698_400_800.0);
        assert_eq!(b.epoch, 1_698_400_800.0);
    }

    #[test]
    fn numeric_timestamps_seconds_and_millis() {
        let d = JsonDetector::new("level:error").unwrap();
        let ex = d.as_timestamp_extractor().unwrap();

        let secs = ex.extract_timestamp(br#"{"ts":1698400800}"#).unwrap();
        assert_eq!(secs.epoch, 1_698_400_800.0);
        assert_eq!(secs.text, "1698400800.000");

        let millis = ex.extract_timestamp(br#"{"ts":1698400800250}"#).unwrap();
        assert!((millis.epoch - 1_698_400_800.25).abs() < 1e-6);
        assert_eq!(millis.text, "1698400800.250");
    }

    #[test]
    fn timestamp_field_order_and_fallthrough() {
        let d = JsonDetector::new("level:error").unwrap();
        let ex = d.as_timestamp_extractor().unwrap();
        let ts = ex
            .extract_timestamp(br#"{"@timestamp":"2023-10-27T10:00:05Z","time":"yesterday"}"#)
            .unwrap();
        assert_eq!(ts.text, "2023-10-27T10:00:05Z");
        assert!(ex.extract_timestamp(br#"{"level":"error"}"#).is_none());
    }
}
