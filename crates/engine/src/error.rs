//! 엔진 에러 타입
//!
//! [`EngineError`]는 디텍터 구성과 모니터 구성 중 발생하는 에러를 표현합니다.
//! `From<EngineError> for LogwardenError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logwarden_core::error::{ConfigError, DetectorError, LogwardenError};

/// 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 디텍터 패턴이 유효하지 않음
    #[error("invalid pattern for {format} detector: '{pattern}': {reason}")]
    InvalidPattern {
        /// 디텍터 형식 (custom, json 등)
        format: String,
        /// 문제가 된 패턴
        pattern: String,
        /// 실패 사유
        reason: String,
    },

    /// 알 수 없는 디텍터 형식
    #[error("unknown detector format: {0}")]
    UnknownFormat(String),

    /// 모니터 구성 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue { field, reason } => EngineError::Config { field, reason },
            other => EngineError::Config {
                field: "monitor".to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<EngineError> for LogwardenError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidPattern { format, reason, .. } => {
                LogwardenError::Detector(DetectorError::InvalidPattern { format, reason })
            }
            EngineError::UnknownFormat(format) => {
                LogwardenError::Detector(DetectorError::UnknownFormat(format))
            }
            EngineError::Regex(e) => LogwardenError::Detector(DetectorError::InvalidPattern {
                format: "regex".to_owned(),
                reason: e.to_string(),
            }),
            EngineError::Config { field, reason } => {
                LogwardenError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
