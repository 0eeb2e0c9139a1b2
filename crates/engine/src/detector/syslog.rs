//! syslog 디텍터
//!
//! 단어 경계 키워드 매칭에 더해, `<PRI>`의 severity가 0–3(emerg..err)이면
//! 본문과 무관하게 매칭으로 봅니다.

use serde_json::Value;

use super::{Context, ContextExtractor, Detector, GenericDetector, TimestampExtractor};
use crate::error::EngineError;
use crate::timestamp::{LineTimestamp, extract_syslog_priority, parse_syslog};

/// syslog 에러 키워드 (단어 경계)
pub const SYSLOG_KEYWORDS: &str = r"(?i)\b(emerg|alert|crit|critical|error|err|fail|panic)\b";

/// 이 값 이하의 severity는 키워드 없이도 매칭합니다 (3 = err).
const MAX_ALERTING_SEVERITY: u8 = 3;

/// syslog 디텍터
#[derive(Debug)]
pub struct SyslogDetector {
    inner: GenericDetector,
}

impl SyslogDetector {
    /// 새 디텍터를 생성합니다.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            inner: GenericDetector::new(SYSLOG_KEYWORDS)?,
        })
    }
}

impl Detector for SyslogDetector {
    fn kind(&self) -> &'static str {
        "syslog"
    }

    fn detect(&self, line: &[u8]) -> bool {
        extract_syslog_priority(line).is_some_and(|p| p.severity <= MAX_ALERTING_SEVERITY)
            || self.inner.is_match(line)
    }

    fn as_context_extractor(&self) -> Option<&dyn ContextExtractor> {
        Some(self)
    }

    fn as_timestamp_extractor(&self) -> Option<&dyn TimestampExtractor> {
        Some(self)
    }
}

impl ContextExtractor for SyslogDetector {
    fn context(&self, line: &[u8]) -> Option<Context> {
        let priority = extract_syslog_priority(line)?;
        let mut context = Context::new();
        context.insert("syslog_facility".to_owned(), Value::from(priority.facility));
        context.insert("syslog_severity".to_owned(), Value::from(priority.severity));
        Some(context)
    }
}

impl TimestampExtractor for SyslogDetector {
    fn extract_timestamp(&self, line: &[u8]) -> Option<LineTimestamp> {
        parse_syslog(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_word_bounded() {
        let d = SyslogDetector::new().unwrap();
        assert!(d.detect(b"Oct 11 22:14:15 host sshd[1]: error: kex_exchange_identification"));
        assert!(d.detect(b"Oct 11 22:14:15 host kernel: PANIC in module"));
        assert!(!d.detect(b"Oct 11 22:14:15 host app: terrorism alerting zone"));
        assert!(!d.detect(b"Oct 11 22:14:15 host app: failover complete"));
    }

    #[test]
    fn severe_priority_matches_without_keyword() {
        let d = SyslogDetector::new().unwrap();
        // 34 = auth(4) * 8 + crit(2)
        assert!(d.detect(b"<34>Oct 11 22:14:15 mymachine su: 'su root' on /dev/pts/8"));
        // 38 = auth(4) * 8 + info(6)
        assert!(!d.detect(b"<38>Oct 11 22:14:15 mymachine su: session opened"));
    }

    #[test]
    fn context_exposes_facility_and_severity() {
        let d = SyslogDetector::new().unwrap();
        let ctx = d
            .as_context_extractor()
            .unwrap()
            .context(b"<34>Oct 11 22:14:15 mymachine su: fail")
            .unwrap();
        assert_eq!(ctx["syslog_facility"], 4);
        assert_eq!(ctx["syslog_severity"], 2);

        assert!(
            d.as_context_extractor()
                .unwrap()
                .context(b"Oct 11 22:14:15 mymachine su: fail")
                .is_none()
        );
    }

    #[test]
    fn timestamp_uses_syslog_parser() {
        let d = SyslogDetector::new().unwrap();
        let ts = d
            .as_timestamp_extractor()
            .unwrap()
            .extract_timestamp(b"<34>Oct  1 02:03:04 host app: error")
            .unwrap();
        assert_eq!(ts.text, "Oct  1 02:03:04");
    }
}
