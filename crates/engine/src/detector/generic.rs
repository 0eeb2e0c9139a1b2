//! 리터럴/정규식 디텍터
//!
//! 패턴에 정규식 메타문자가 없으면 정규식 엔진을 거치지 않고 부분 문자열 검색을 합니다.
//! 결과는 같습니다.

use regex::bytes::Regex;

use super::Detector;
use crate::error::EngineError;

/// 정규식 메타문자
const REGEX_META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
];

enum Matcher {
    Literal(Vec<u8>),
    Regex(Regex),
}

/// 범용 패턴 디텍터
///
/// 특화 디텍터(nginx, syslog)와 제외 패턴도 이 타입을 재사용합니다.
pub struct GenericDetector {
    pattern: String,
    matcher: Matcher,
}

impl GenericDetector {
    /// 패턴을 컴파일합니다. 빈 패턴은 허용하지 않습니다.
    pub fn new(pattern: &str) -> Result<Self, EngineError> {
        if pattern.is_empty() {
            return Err(EngineError::InvalidPattern {
                format: "custom".to_owned(),
                pattern: String::new(),
                reason: "pattern must not be empty".to_owned(),
            });
        }

        let matcher = if pattern.contains(REGEX_META) {
            let regex = Regex::new(pattern).map_err(|e| EngineError::InvalidPattern {
                format: "custom".to_owned(),
                pattern: pattern.to_owned(),
                reason: e.to_string(),
            })?;
            Matcher::Regex(regex)
        } else {
            Matcher::Literal(pattern.as_bytes().to_vec())
        };

        Ok(Self {
            pattern: pattern.to_owned(),
            matcher,
        })
    }

    /// 원본 패턴
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// 부분 문자열 검색 경로를 쓰는지 여부
    pub fn is_literal(&self) -> bool {
        matches!(self.matcher, Matcher::Literal(_))
    }

    /// 라인이 패턴과 일치하는지 검사합니다.
    pub fn is_match(&self, line: &[u8]) -> bool {
        match &self.matcher {
            Matcher::Literal(needle) => contains(line, needle),
            Matcher::Regex(regex) => regex.is_match(line),
        }
    }
}

impl Detector for GenericDetector {
    fn kind(&self) -> &'static str {
        "custom"
    }

    fn detect(&self, line: &[u8]) -> bool {
        self.is_match(line)
    }
}

impl std::fmt::Debug for GenericDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericDetector")
            .field("pattern", &self.pattern)
            .field("literal", &self.is_literal())
            .finish()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
