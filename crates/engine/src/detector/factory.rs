//! 형식 이름과 패턴으로 디텍터를 생성합니다.

use std::fmt;
use std::str::FromStr;

use super::{Detector, GenericDetector, JsonDetector, KernelDetector, NginxDetector, SyslogDetector};
use crate::error::EngineError;

/// 디텍터 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorFormat {
    /// 리터럴/정규식 패턴 (`custom` 또는 빈 문자열)
    Custom,
    /// 커널 로그 상관 (`dmesg`)
    Kernel,
    /// nginx access log (`nginx`)
    Nginx,
    /// nginx error log (`nginx-error`)
    NginxError,
    /// JSON 필드 (`json`)
    Json,
    /// syslog (`syslog`)
    Syslog,
}

impl DetectorFormat {
    /// 설정 파일에 쓰는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Kernel => "dmesg",
            Self::Nginx => "nginx",
            Self::NginxError => "nginx-error",
            Self::Json => "json",
            Self::Syslog => "syslog",
        }
    }

    /// 패턴이 필요한 형식인지 여부
    pub fn requires_pattern(&self) -> bool {
        matches!(self, Self::Custom | Self::Json)
    }
}

impl fmt::Display for DetectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "custom" => Ok(Self::Custom),
            "dmesg" => Ok(Self::Kernel),
            "nginx" => Ok(Self::Nginx),
            "nginx-error" => Ok(Self::NginxError),
            "json" => Ok(Self::Json),
            "syslog" => Ok(Self::Syslog),
            other => Err(EngineError::UnknownFormat(other.to_owned())),
        }
    }
}

/// 디텍터를 생성합니다.
///
/// `dmesg`, `nginx`, `nginx-error`, `syslog`는 패턴을 무시합니다.
pub fn build_detector(format: DetectorFormat, pattern: &str) -> Result<Box<dyn Detector>, EngineError> {
    if format.requires_pattern() && pattern.trim().is_empty() {
        return Err(EngineError::InvalidPattern {
            format: format.to_string(),
            pattern: pattern.to_owned(),
            reason: "pattern is required".to_owned(),
        });
    }

    let detector: Box<dyn Detector> = match format {
        DetectorFormat::Custom => Box::new(GenericDetector::new(pattern)?),
        DetectorFormat::Kernel => Box::new(KernelDetector::new()?),
        DetectorFormat::Nginx | DetectorFormat::NginxError => Box::new(NginxDetector::new()?),
        DetectorFormat::Json => Box::new(JsonDetector::new(pattern)?),
        DetectorFormat::Syslog => Box::new(SyslogDetector::new()?),
    };
    Ok(detector)
}

/// 제외 패턴 디텍터를 생성합니다. 빈 패턴이면 `None`입니다.
pub fn build_exclusion(pattern: &str) -> Result<Option<Box<dyn Detector>>, EngineError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let detector = GenericDetector::new(pattern).map_err(|e| match e {
        EngineError::InvalidPattern {
            pattern, reason, ..
        } => EngineError::InvalidPattern {
            format: "exclude".to_owned(),
            pattern,
            reason,
        },
        other => other,
    })?;
    Ok(Some(Box::new(detector)))
}

/// 모니터의 디텍터 형식을 결정합니다.
///
/// 명시된 형식이 우선하고, 패턴 없는 `dmesg`/`syslog` 소스는 각각의 전용 형식을 씁니다.
pub fn infer_format(
    source_type: &str,
    format: &str,
    pattern: &str,
) -> Result<DetectorFormat, EngineError> {
    if !format.trim().is_empty() {
        return format.parse();
    }
    let format = match (source_type, pattern.is_empty()) {
        ("dmesg", true) => DetectorFormat::Kernel,
        ("syslog", true) => DetectorFormat::Syslog,
        _ => DetectorFormat::Custom,
    };
    Ok(format)
}
