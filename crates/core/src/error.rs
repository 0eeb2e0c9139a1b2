//! 에러 타입 -- 도메인별 에러 정의

/// logwarden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogwardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 로그 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 디텍터 구성 에러
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),

    /// 리포트 전송 에러
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 로그 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 스트림 열기 실패 (파일 없음, 프로세스 실행 실패, 바인드 실패 등)
    #[error("failed to open source '{name}': {reason}")]
    Open { name: String, reason: String },

    /// 소스 종료 실패
    #[error("failed to close source '{name}': {reason}")]
    Close { name: String, reason: String },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 디텍터 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// 패턴 컴파일 실패
    #[error("invalid pattern for '{format}': {reason}")]
    InvalidPattern { format: String, reason: String },

    /// 알 수 없는 디텍터 형식
    #[error("unknown detector format: {0}")]
    UnknownFormat(String),
}

/// 리포트 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// 전송 대상에 연결하지 못함
    #[error("transport error: {0}")]
    Transport(String),

    /// 전송 대상이 리포트를 거부함
    #[error("report rejected with status {status}")]
    Rejected { status: u16 },

    /// 직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 재시도 큐 저장 실패
    #[error("retry queue error: {0}")]
    Queue(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: LogwardenError = ConfigError::InvalidValue {
            field: "monitors[0].name".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("config error"));
        assert!(msg.contains("monitors[0].name"));
    }

    #[test]
    fn rejected_display_contains_status() {
        let err = DeliveryError::Rejected { status: 503 };
        assert_eq!(err.to_string(), "report rejected with status 503");
    }

    #[test]
    fn source_open_display() {
        let err = SourceError::Open {
            name: "kernel".to_owned(),
            reason: "dmesg not found".to_owned(),
        };
        assert!(err.to_string().contains("kernel"));
        assert!(err.to_string().contains("dmesg not found"));
    }
}
