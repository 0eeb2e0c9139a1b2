//! 도메인 타입 -- 리포트와 심각도
//!
//! 모니터가 플러시한 배치는 [`Report`]로 조립되어 전송 협력자에게 전달됩니다.
//! 직렬화 형식은 stdout JSON 라인, 웹훅 본문, 재시도 스풀이 모두 공유합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 외부 상태 제공자가 돌려주는 스냅샷 (엔진은 해석하지 않음)
pub type StateSnapshot = serde_json::Map<String, serde_json::Value>;

/// 리포트 심각도
///
/// 가장 심각한 것부터 나열합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 시스템 중단 수준
    Fatal,
    /// 일반 오류 (기본값)
    #[default]
    Error,
    /// 경고
    Warning,
    /// 정보
    Info,
    /// 디버그
    Debug,
}

impl Severity {
    /// syslog severity (PRI % 8)를 심각도로 변환합니다.
    ///
    /// 0–2 → Fatal, 3 → Error, 4 → Warning, 5–6 → Info, 7 → Debug.
    /// 범위를 벗어난 값은 Debug로 취급합니다.
    pub fn from_syslog_severity(severity: u8) -> Self {
        match severity {
            0..=2 => Self::Fatal,
            3 => Self::Error,
            4 => Self::Warning,
            5 | 6 => Self::Info,
            _ => Self::Debug,
        }
    }

    /// 구조화 로그의 레벨 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" | "critical" | "alert" | "emergency" | "panic" => Some(Self::Fatal),
            "error" | "err" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "debug" | "trace" => Some(Self::Debug),
            _ => None,
        }
    }

    /// 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 전송 단위 리포트
///
/// 하나의 인시던트(배치) 또는 비활성 경보를 나타냅니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// 리포트 고유 ID (UUID v4, 하이픈 없음)
    pub event_id: String,
    /// 본문 (배치의 라인을 개행으로 연결)
    pub message: String,
    /// 심각도
    pub severity: Severity,
    /// 생성 시각 (Unix epoch 초)
    pub timestamp: f64,
    /// 검색용 태그
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// 이름이 붙은 컨텍스트 묶음 ("Log Data", "Server State")
    #[serde(default)]
    pub contexts: BTreeMap<String, StateSnapshot>,
    /// 부가 필드
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Report {
    /// 현재 시각으로 새 리포트를 생성합니다.
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
            message: message.into(),
            severity,
            timestamp,
            tags: BTreeMap::new(),
            contexts: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// 태그를 추가합니다.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 컨텍스트 묶음을 추가합니다.
    pub fn with_context(mut self, name: impl Into<String>, context: StateSnapshot) -> Self {
        self.contexts.insert(name.into(), context);
        self
    }

    /// 부가 필드를 추가합니다.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// 태그 값을 조회합니다.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_line = self.message.lines().next().unwrap_or_default();
        write!(f, "[{}] {}", self.severity, first_line)
    }
}
