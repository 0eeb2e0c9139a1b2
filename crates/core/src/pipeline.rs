//! 협력자 trait -- 모니터 엔진이 소비하는 외부 경계 정의
//!
//! 엔진은 바이트 스트림을 직접 얻지 않고, 시스템 상태를 직접 수집하지 않으며,
//! 리포트를 직접 전송하지 않습니다. 이 세 가지는 아래 trait의 구현체가 담당합니다.
//!
//! - [`LineSource`]: 로그 바이트 스트림 획득 (파일 tail, 프로세스, 소켓)
//! - [`StateProvider`]: 리포트에 첨부할 시스템 상태 스냅샷
//! - [`ReportSink`]: 조립된 리포트 전송
//! - [`RetryQueue`]: 전송 실패한 리포트 보관
//!
//! `LineSource`와 `ReportSink`는 RPITIT를 사용하므로 `dyn`으로 쓸 수 없습니다.
//! 각각의 `Dyn*` 쌍둥이 trait이 `BoxFuture`를 반환하며, blanket impl로 자동 구현됩니다.
//!
//! # 구현 예시
//! ```ignore
//! struct StdinSource;
//!
//! impl LineSource for StdinSource {
//!     fn name(&self) -> &str { "stdin" }
//!     async fn stream(&self) -> Result<LineReader, SourceError> {
//!         Ok(Box::new(tokio::io::stdin()))
//!     }
//!     async fn close(&self) -> Result<(), SourceError> { Ok(()) }
//! }
//!
//! let source: Arc<dyn DynLineSource> = Arc::new(StdinSource);
//! ```

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::error::{DeliveryError, SourceError};
use crate::types::{Report, StateSnapshot};

/// Send 가능한 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 라인 소스가 돌려주는 바이트 리더
pub type LineReader = Box<dyn AsyncRead + Send + Unpin>;

// ─── LineSource ──────────────────────────────────────────────────────

/// 로그 라인 소스
///
/// `stream()`은 EOF 또는 에러 이후 모니터에 의해 다시 호출될 수 있습니다.
/// `close()`는 외부(종료 처리)에서 호출되어 하위 프로세스/소켓을 정리합니다.
pub trait LineSource: Send + Sync {
    /// 소스 이름 (리포트 `source` 태그, 메트릭 레이블)
    fn name(&self) -> &str;

    /// 새 바이트 스트림을 엽니다.
    fn stream(&self) -> impl Future<Output = Result<LineReader, SourceError>> + Send;

    /// 소스 리소스를 해제합니다.
    fn close(&self) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// dyn-compatible 라인 소스 trait
pub trait DynLineSource: Send + Sync {
    /// 소스 이름
    fn name(&self) -> &str;

    /// 새 바이트 스트림을 엽니다.
    fn stream(&self) -> BoxFuture<'_, Result<LineReader, SourceError>>;

    /// 소스 리소스를 해제합니다.
    fn close(&self) -> BoxFuture<'_, Result<(), SourceError>>;
}

/// LineSource를 구현한 타입은 자동으로 DynLineSource도 구현됩니다.
impl<T: LineSource> DynLineSource for T {
    fn name(&self) -> &str {
        LineSource::name(self)
    }

    fn stream(&self) -> BoxFuture<'_, Result<LineReader, SourceError>> {
        Box::pin(LineSource::stream(self))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(LineSource::close(self))
    }
}

// ─── StateProvider ───────────────────────────────────────────────────

/// 시스템 상태 스냅샷 제공자
///
/// 반환값은 리포트의 "Server State" 컨텍스트에 그대로 복사됩니다.
/// 호출은 플러시마다 일어나므로 구현체는 캐시된 값을 돌려줘야 합니다.
pub trait StateProvider: Send + Sync {
    /// 현재 스냅샷
    fn state(&self) -> StateSnapshot;
}

// ─── ReportSink ──────────────────────────────────────────────────────

/// 리포트 전송 협력자
///
/// 여러 모니터가 동시에 호출하므로 동시 사용에 안전해야 합니다.
pub trait ReportSink: Send + Sync {
    /// 리포트를 전송합니다. 실패는 엔진이 재시도하지 않습니다.
    fn send(&self, report: &Report) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// dyn-compatible 리포트 전송 trait
pub trait DynReportSink: Send + Sync {
    /// 리포트를 전송합니다.
    fn send<'a>(&'a self, report: &'a Report) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

impl<T: ReportSink> DynReportSink for T {
    fn send<'a>(&'a self, report: &'a Report) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(ReportSink::send(self, report))
    }
}

// ─── RetryQueue ──────────────────────────────────────────────────────

/// 전송 실패 리포트 보관소
///
/// 영속화와 재전송 정책은 구현체의 책임입니다.
pub trait RetryQueue: Send + Sync {
    /// 실패한 리포트를 큐에 넣습니다.
    fn enqueue(&self, report: Report) -> BoxFuture<'_, Result<(), DeliveryError>>;
}
