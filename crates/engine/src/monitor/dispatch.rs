//! 리포트 발송 -- 속도 제한, 전송, 재시도 큐 인계
//!
//! 모니터는 발송 결과에 반응하지 않습니다. 닫힌 배치와 경보는 [`Outbox`]를 통해
//! 제한된 크기의 채널로 넘어가고, 모니터마다 하나인 발송 태스크([`run_delivery`])가
//! 채널을 비우며 [`Dispatcher`]로 전송합니다. 실패한 리포트는 재시도 큐로 넘어가고
//! 배치 상태 머신으로 되돌아가지 않습니다.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use logwarden_core::metrics::{
    self, LABEL_SOURCE, LABEL_STATUS, MetricsSink, STATUS_DROPPED, STATUS_FAILED,
    STATUS_RATE_LIMITED, STATUS_SENT,
};
use logwarden_core::pipeline::{DynReportSink, RetryQueue, StateProvider};
use logwarden_core::types::Report;

use super::batch::Batch;
use super::rate_limit::RateLimiter;
use crate::report::compose_report;

/// 발송 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 전송 성공
    Sent,
    /// 속도 제한으로 버려짐
    RateLimited,
    /// 전송 실패, 재시도 큐에 들어감
    Queued,
    /// 전송 실패, 재시도 큐도 없거나 실패함
    Dropped,
}

/// 모니터당 발송 대기열 크기
pub const DELIVERY_QUEUE_CAPACITY: usize = 256;

/// 발송 태스크로 넘기는 작업
#[derive(Debug)]
pub enum Delivery {
    /// 닫힌 배치 (속도 제한 대상)
    Batch(Batch),
    /// 비활성/복구 경보
    Alert(Report),
}

/// 발송 대기열의 보내는 쪽
///
/// 읽기 루프, 플러시 타이머, 감시 태스크가 복제해서 씁니다. 넣기는 기다리지 않습니다.
#[derive(Clone)]
pub struct Outbox {
    source: Arc<str>,
    tx: mpsc::Sender<Delivery>,
    metrics: Arc<dyn MetricsSink>,
}

impl Outbox {
    /// 대기열과 받는 쪽을 생성합니다.
    pub fn channel(
        source: &str,
        capacity: usize,
        metrics: Arc<dyn MetricsSink>,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outbox = Self {
            source: Arc::from(source),
            tx,
            metrics,
        };
        (outbox, rx)
    }

    /// 작업을 대기열에 넣습니다. 가득 찼으면 버리고 `dropped`로 셉니다.
    pub fn submit(&self, delivery: Delivery) {
        match self.tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(source = %self.source, "delivery queue full, report dropped");
                self.metrics.increment(
                    metrics::REPORTS_TOTAL,
                    &[(LABEL_SOURCE, &*self.source), (LABEL_STATUS, STATUS_DROPPED)],
                    1,
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(source = %self.source, "delivery task stopped, report discarded");
            }
        }
    }
}

/// 모든 [`Outbox`]가 사라질 때까지 대기열을 비우며 발송합니다.
pub async fn run_delivery(mut rx: mpsc::Receiver<Delivery>, dispatcher: Arc<Dispatcher>) {
    while let Some(delivery) = rx.recv().await {
        match delivery {
            Delivery::Batch(batch) => dispatcher.dispatch_batch(batch).await,
            Delivery::Alert(report) => dispatcher.dispatch_alert(report).await,
        };
    }
}

/// 모니터 하나의 발송 경로
pub struct Dispatcher {
    source: String,
    sink: Arc<dyn DynReportSink>,
    retry: Option<Arc<dyn RetryQueue>>,
    state: Option<Arc<dyn StateProvider>>,
    limiter: Option<Mutex<RateLimiter>>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    pub(crate) fn new(
        source: String,
        sink: Arc<dyn DynReportSink>,
        retry: Option<Arc<dyn RetryQueue>>,
        state: Option<Arc<dyn StateProvider>>,
        limiter: Option<RateLimiter>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            source,
            sink,
            retry,
            state,
            limiter: limiter.map(Mutex::new),
            metrics,
        }
    }

    /// 플러시된 배치를 발송합니다. 속도 제한이 적용됩니다.
    pub async fn dispatch_batch(&self, batch: Batch) -> DispatchOutcome {
        if !self.admit() {
            tracing::debug!(
                source = %self.source,
                lines = batch.line_count(),
                "report dropped by rate limit"
            );
            self.count(STATUS_RATE_LIMITED);
            return DispatchOutcome::RateLimited;
        }

        let state = self.state.as_ref().map(|provider| provider.state());
        let report = compose_report(&self.source, &batch, state);
        self.deliver(report).await
    }

    /// 비활성 경보를 발송합니다. 속도 제한을 거치지 않습니다.
    pub async fn dispatch_alert(&self, report: Report) -> DispatchOutcome {
        self.deliver(report).await
    }

    fn admit(&self) -> bool {
        self.limiter.as_ref().is_none_or(|limiter| {
            limiter
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .allow()
        })
    }

    async fn deliver(&self, report: Report) -> DispatchOutcome {
        match self.sink.send(&report).await {
            Ok(()) => {
                tracing::debug!(source = %self.source, event_id = %report.event_id, "report sent");
                self.count(STATUS_SENT);
                DispatchOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(source = %self.source, error = %e, "report delivery failed");
                self.count(STATUS_FAILED);
                let Some(retry) = &self.retry else {
                    return DispatchOutcome::Dropped;
                };
                match retry.enqueue(report).await {
                    Ok(()) => DispatchOutcome::Queued,
                    Err(e) => {
                        tracing::warn!(
                            source = %self.source,
                            error = %e,
                            "failed to queue report for retry"
                        );
                        DispatchOutcome::Dropped
                    }
                }
            }
        }
    }

    fn count(&self, status: &'static str) {
        self.metrics.increment(
            metrics::REPORTS_TOTAL,
            &[(LABEL_SOURCE, self.source.as_str()), (LABEL_STATUS, status)],
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use logwarden_core::error::DeliveryError;
    use logwarden_core::metrics::LocalMetrics;
    use logwarden_core::pipeline::{BoxFuture, ReportSink};
    use logwarden_core::types::{Severity, StateSnapshot};
    use tokio::time::{Duration, Instant};

    use super::*;
    use crate::monitor::batch::{BatchMetadata, Batcher};

    #[derive(Default)]
    struct FlakySink {
        fail: bool,
        sent: Mutex<Vec<Report>>,
    }

    impl ReportSink for FlakySink {
        async fn send(&self, report: &Report) -> Result<(), logwarden_core::DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected { status: 503 });
            }
            self.sent.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryQueue {
        queued: AtomicUsize,
    }

    impl RetryQueue for MemoryQueue {
        fn enqueue(&self, _report: Report) -> BoxFuture<'_, Result<(), DeliveryError>> {
            self.queued.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct FixedState;

    impl StateProvider for FixedState {
        fn state(&self) -> StateSnapshot {
            let mut s = StateSnapshot::new();
            s.insert("load".to_owned(), serde_json::json!(0.5));
            s
        }
    }

    fn batch() -> Batch {
        let now = Instant::now();
        let mut b = Batcher::new(now);
        b.push(b"boom", None, BatchMetadata::default, now);
        b.take().unwrap()
    }

    #[tokio::test]
    async fn sends_with_state_and_counts() {
        let sink = Arc::new(FlakySink::default());
        let recorder = Arc::new(LocalMetrics::new());
        let d = Dispatcher::new(
            "app".to_owned(),
            sink.clone(),
            None,
            Some(Arc::new(FixedState)),
            None,
            recorder.clone(),
        );

        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::Sent);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].contexts["Server State"]["load"], 0.5);
        assert_eq!(
            recorder.counter(metrics::REPORTS_TOTAL, &[(LABEL_SOURCE, "app"), (LABEL_STATUS, STATUS_SENT)]),
            1
        );
    }

    #[tokio::test]
    async fn failures_go_to_retry_queue() {
        let queue = Arc::new(MemoryQueue::default());
        let recorder = Arc::new(LocalMetrics::new());
        let d = Dispatcher::new(
            "app".to_owned(),
            Arc::new(FlakySink {
                fail: true,
                ..FlakySink::default()
            }),
            Some(queue.clone()),
            None,
            None,
            recorder.clone(),
        );

        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::Queued);
        assert_eq!(queue.queued.load(Ordering::SeqCst), 1);
        assert_eq!(
            recorder.counter(metrics::REPORTS_TOTAL, &[(LABEL_SOURCE, "app"), (LABEL_STATUS, STATUS_FAILED)]),
            1
        );
    }

    #[tokio::test]
    async fn failure_without_queue_is_dropped() {
        let d = Dispatcher::new(
            "app".to_owned(),
            Arc::new(FlakySink {
                fail: true,
                ..FlakySink::default()
            }),
            None,
            None,
            None,
            Arc::new(LocalMetrics::new()),
        );
        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::Dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_applies_to_batches_only() {
        let sink = Arc::new(FlakySink::default());
        let recorder = Arc::new(LocalMetrics::new());
        let d = Dispatcher::new(
            "app".to_owned(),
            sink.clone(),
            None,
            None,
            Some(RateLimiter::new(1, Duration::from_secs(60))),
            recorder.clone(),
        );

        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::Sent);
        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::RateLimited);
        let alert = Report::new("No logs received", Severity::Warning);
        assert_eq!(d.dispatch_alert(alert).await, DispatchOutcome::Sent);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(d.dispatch_batch(batch()).await, DispatchOutcome::Sent);

        assert_eq!(sink.sent.lock().unwrap().len(), 3);
        assert_eq!(
            recorder.counter(
                metrics::REPORTS_TOTAL,
                &[(LABEL_SOURCE, "app"), (LABEL_STATUS, STATUS_RATE_LIMITED)]
            ),
            1
        );
    }

    #[tokio::test]
    async fn full_outbox_drops_without_waiting() {
        let recorder = Arc::new(LocalMetrics::new());
        let (outbox, mut rx) = Outbox::channel("app", 1, recorder.clone());

        outbox.submit(Delivery::Batch(batch()));
        outbox.submit(Delivery::Batch(batch()));

        assert!(matches!(rx.try_recv(), Ok(Delivery::Batch(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            recorder.counter(metrics::REPORTS_TOTAL, &[(LABEL_SOURCE, "app"), (LABEL_STATUS, STATUS_DROPPED)]),
            1
        );
    }

    #[tokio::test]
    async fn delivery_task_drains_queue_in_order() {
        let sink = Arc::new(FlakySink::default());
        let d = Arc::new(Dispatcher::new(
            "app".to_owned(),
            sink.clone(),
            None,
            None,
            None,
            Arc::new(LocalMetrics::new()),
        ));
        let (outbox, rx) = Outbox::channel("app", 8, Arc::new(LocalMetrics::new()));
        let worker = tokio::spawn(run_delivery(rx, d));

        outbox.submit(Delivery::Batch(batch()));
        outbox.submit(Delivery::Alert(Report::new("No logs received", Severity::Warning)));
        drop(outbox);
        worker.await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message, "boom");
        assert_eq!(sent[1].message, "No logs received");
    }
}
