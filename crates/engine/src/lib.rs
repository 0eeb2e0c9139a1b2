#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`timestamp`]: 형식을 모르는 라인에서 타임스탬프와 syslog 우선순위 추출
//! - [`detector`]: 리터럴/정규식, 커널 상관, JSON 필드, nginx, syslog 디텍터와 팩토리
//! - [`monitor`]: 라인 분리, 배치 상태 머신, 속도 제한, 비활성 감시, 발송
//! - [`report`]: 배치와 시스템 상태로 리포트 조립
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! LineSource -> BoundedLines -> Detector -> Exclusion -> Batcher -> RateLimiter -> ReportSink
//!                    |                                      |                         |
//!               256 KiB cap                         5s window, 1000 lines,       RetryQueue
//!                                                   256 KiB body                 on failure
//! ```

pub mod detector;
pub mod error;
pub mod monitor;
pub mod report;
pub mod timestamp;

// --- 주요 타입 re-export ---

// 모니터
pub use monitor::{Monitor, MonitorBuilder};

// 디텍터
pub use detector::{Detector, DetectorFormat, build_detector, build_exclusion, infer_format};

// 타임스탬프
pub use timestamp::{LineTimestamp, SyslogPriority, extract_syslog_priority, extract_timestamp};

// 에러
pub use error::EngineError;
