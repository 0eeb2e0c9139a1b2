//! 디텍터 프레임워크 -- "이 라인이 문제인가"를 판단합니다.
//!
//! 모든 디텍터는 [`Detector::detect`]를 구현합니다. 일부 디텍터는 부가 능력을 가지며,
//! 모니터는 `as_*` 메서드로 능력 유무를 확인합니다. 능력이 없으면 `None`이고,
//! 호출자는 이 경우를 정상 경로로 처리해야 합니다.
//!
//! | 디텍터 | 상태 | 컨텍스트 | 메시지 변환 | 타임스탬프 |
//! |---|---|---|---|---|
//! | [`GenericDetector`] | 없음 | - | - | - |
//! | [`KernelDetector`] | 있음 | - | 괄호 제거 | - |
//! | [`JsonDetector`] | 캐시 | 최상위 필드 | - | 시각 필드 |
//! | [`NginxDetector`] | 없음 | - | - | error/access 형식 |
//! | [`SyslogDetector`] | 없음 | 호스트/앱 | - | BSD syslog |
//!
//! # 호출 순서
//!
//! 상태를 가진 디텍터는 모니터 하나가 독점합니다. 같은 라인에 대해 `detect`를 먼저
//! 호출한 뒤 컨텍스트/타임스탬프를 요청해야 JSON 캐시가 적중합니다.
//! 순서가 어긋나도 결과는 같고 다시 파싱할 뿐입니다.

use std::borrow::Cow;

use crate::timestamp::LineTimestamp;

pub mod factory;
pub mod generic;
pub mod json;
pub mod kernel;
pub mod nginx;
pub mod syslog;

pub use factory::{DetectorFormat, build_detector, build_exclusion, infer_format};
pub use generic::GenericDetector;
pub use json::JsonDetector;
pub use kernel::KernelDetector;
pub use nginx::NginxDetector;
pub use syslog::SyslogDetector;

/// 라인에서 추출한 키/값 컨텍스트 (키 순 정렬)
pub type Context = serde_json::Map<String, serde_json::Value>;

/// 라인 판별 trait
///
/// `&self`로 호출되므로 상태를 가진 구현체는 내부 가변성을 사용합니다.
pub trait Detector: Send + Sync {
    /// 디텍터 종류 이름 (로그용)
    fn kind(&self) -> &'static str;

    /// 라인이 보고 대상이면 `true`
    fn detect(&self, line: &[u8]) -> bool;

    /// 컨텍스트 추출 능력
    fn as_context_extractor(&self) -> Option<&dyn ContextExtractor> {
        None
    }

    /// 메시지 변환 능력
    fn as_message_transformer(&self) -> Option<&dyn MessageTransformer> {
        None
    }

    /// 타임스탬프 추출 능력
    fn as_timestamp_extractor(&self) -> Option<&dyn TimestampExtractor> {
        None
    }
}

/// 라인 → 키/값 컨텍스트
pub trait ContextExtractor {
    /// 컨텍스트를 추출합니다. 추출할 것이 없으면 `None`.
    fn context(&self, line: &[u8]) -> Option<Context>;
}

/// 저장 전에 라인을 다시 씁니다.
pub trait MessageTransformer {
    /// 변환된 라인. 바꿀 것이 없으면 빌린 값을 그대로 돌려줍니다.
    fn transform<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]>;
}

/// 디텍터 고유 형식의 타임스탬프 추출
pub trait TimestampExtractor {
    /// 타임스탬프를 추출합니다.
    fn extract_timestamp(&self, line: &[u8]) -> Option<LineTimestamp>;
}
