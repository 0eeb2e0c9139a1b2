//! nginx 로그 디텍터 (`nginx`, `nginx-error`)

use super::{Detector, GenericDetector, TimestampExtractor};
use crate::error::EngineError;
use crate::timestamp::{LineTimestamp, parse_nginx_access, parse_nginx_error};

/// nginx 에러 키워드
pub const NGINX_KEYWORDS: &str = r"(?i)(error|critical|crit|alert|emerg)";

/// nginx error/access 로그 디텍터
///
/// 매칭은 키워드 정규식에 맡기고, 타임스탬프는 error log 형식을 먼저 본 뒤
/// access log의 괄호 형식을 찾습니다.
#[derive(Debug)]
pub struct NginxDetector {
    inner: GenericDetector,
}

impl NginxDetector {
    /// 새 디텍터를 생성합니다.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            inner: GenericDetector::new(NGINX_KEYWORDS)?,
        })
    }
}

impl Detector for NginxDetector {
    fn kind(&self) -> &'static str {
        "nginx"
    }

    fn detect(&self, line: &[u8]) -> bool {
        self.inner.is_match(line)
    }

    fn as_timestamp_extractor(&self) -> Option<&dyn TimestampExtractor> {
        Some(self)
    }
}

impl TimestampExtractor for NginxDetector {
    fn extract_timestamp(&self, line: &[u8]) -> Option<LineTimestamp> {
        parse_nginx_error(line).or_else(|| parse_nginx_access(line))
    }
}
