//! 모니터 -- 소스 하나와 디텍터 하나를 묶어 사건 단위 리포트를 만듭니다.
//!
//! # 내부 아키텍처
//! ```text
//!                ┌──────────── touch ───────────┐
//!                │                              ▼
//! LineSource -> BoundedLines -> Detector -> Exclusion -> Batcher ──(closed)──> Outbox ══mpsc══> Dispatcher -> ReportSink
//!                                                          ▲                    ▲                   └─(fail)─> RetryQueue
//!                                        flush timer ──────┘                    │
//!                                        watchdog ──────────────────────────────┘
//! ```
//!
//! 읽기 루프, 플러시 타이머, 비활성 감시 태스크가 동시에 동작합니다. 배치 상태는
//! `std::sync::Mutex` 하나로 직렬화되며, 잠금은 `.await`를 넘지 않습니다.
//! 전송은 별도의 발송 태스크가 맡으므로 읽기 루프는 소스 I/O에서만 멈춥니다.
//!
//! # 사용 예시
//! ```ignore
//! use logwarden_engine::MonitorBuilder;
//!
//! let monitor = MonitorBuilder::from_config(&monitor_config)?
//!     .source(source)
//!     .sink(sink)
//!     .state_provider(state)
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(async move { monitor.run(cancel).await });
//! ```

pub mod batch;
pub mod dispatch;
pub mod lines;
pub mod rate_limit;
pub mod watchdog;

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use logwarden_core::config::MonitorConfig;
use logwarden_core::metrics::{self, LABEL_SOURCE, MetricsSink, NoopMetrics};
use logwarden_core::pipeline::{DynLineSource, DynReportSink, RetryQueue, StateProvider};

use crate::detector::{Detector, build_detector, build_exclusion, infer_format};
use crate::error::EngineError;
use crate::report::{inactivity_report, recovery_report};
use crate::timestamp::{extract_syslog_priority, extract_timestamp};

pub use batch::{Batch, BatchMetadata, Batcher};
pub use dispatch::{
    DELIVERY_QUEUE_CAPACITY, Delivery, DispatchOutcome, Dispatcher, Outbox, run_delivery,
};
pub use lines::BoundedLines;
pub use rate_limit::RateLimiter;
pub use watchdog::{InactivityWatchdog, WatchdogEvent};

/// 소스가 끝나거나 실패했을 때 다시 여는 간격
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// 스트림 하나가 끝난 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Eof,
    Failed,
    Cancelled,
}

/// 소스 하나를 감시하는 모니터
///
/// [`MonitorBuilder`]로 생성합니다.
pub struct Monitor {
    name: String,
    source: Arc<dyn DynLineSource>,
    detector: Box<dyn Detector>,
    exclusion: Option<Box<dyn Detector>>,
    batcher: Arc<Mutex<Batcher>>,
    wake: Arc<Notify>,
    dispatcher: Arc<Dispatcher>,
    watchdog: Option<Arc<InactivityWatchdog>>,
    metrics: Arc<dyn MetricsSink>,
    stop_on_eof: bool,
    reconnect_delay: Duration,
}

impl Monitor {
    /// 모니터 이름 (소스 이름)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 라인 소스. 종료 처리에서 `close()`를 호출할 때 사용합니다.
    pub fn source(&self) -> &Arc<dyn DynLineSource> {
        &self.source
    }

    /// 비활성 감시기 (설정된 경우)
    pub fn watchdog(&self) -> Option<&Arc<InactivityWatchdog>> {
        self.watchdog.as_ref()
    }

    /// 취소되거나, `stop_on_eof`에서 스트림이 끝날 때까지 실행합니다.
    ///
    /// 종료 전에 열린 배치를 플러시하고, 대기 중인 리포트를 모두 발송한 뒤 소스를 닫습니다.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            source = %self.name,
            detector = self.detector.kind(),
            stop_on_eof = self.stop_on_eof,
            "monitor started"
        );

        let (outbox, queue) =
            Outbox::channel(&self.name, DELIVERY_QUEUE_CAPACITY, Arc::clone(&self.metrics));
        let delivery = tokio::spawn(run_delivery(queue, Arc::clone(&self.dispatcher)));

        let background = cancel.child_token();
        let mut tasks = vec![tokio::spawn(flush_timer(
            Arc::clone(&self.batcher),
            Arc::clone(&self.wake),
            outbox.clone(),
            background.clone(),
        ))];
        if let Some(watchdog) = &self.watchdog {
            watchdog.touch();
            tasks.push(tokio::spawn(watch_inactivity(
                self.name.clone(),
                Arc::clone(watchdog),
                outbox.clone(),
                Arc::clone(&self.metrics),
                background.clone(),
            )));
        }

        loop {
            let end = self.consume_stream(&cancel, &outbox).await;
            self.flush(&outbox);

            if end == StreamEnd::Cancelled {
                break;
            }
            if self.stop_on_eof {
                tracing::info!(source = %self.name, "source ended, stopping monitor");
                break;
            }

            self.metrics
                .increment(metrics::SOURCE_RESTARTS_TOTAL, &[(LABEL_SOURCE, self.name.as_str())], 1);
            tracing::debug!(
                source = %self.name,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "reopening source"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        background.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(source = %self.name, error = %e, "monitor task failed");
            }
        }
        drop(outbox);
        if let Err(e) = delivery.await {
            tracing::warn!(source = %self.name, error = %e, "delivery task failed");
        }
        if let Err(e) = self.source.close().await {
            tracing::warn!(source = %self.name, error = %e, "failed to close source");
        }
        tracing::info!(source = %self.name, "monitor stopped");
    }

    async fn consume_stream(&self, cancel: &CancellationToken, outbox: &Outbox) -> StreamEnd {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            opened = self.source.stream() => opened,
        };
        let reader = match opened {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "failed to open source");
                return StreamEnd::Failed;
            }
        };

        let mut lines = BoundedLines::new(reader);
        let mut truncated = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = lines.next_line() => next,
            };
            match next {
                Ok(Some(line)) => self.process_line(line, outbox),
                Ok(None) => return StreamEnd::Eof,
                Err(e) => {
                    tracing::warn!(source = %self.name, error = %e, "failed to read from source");
                    return StreamEnd::Failed;
                }
            }
            if lines.truncated() > truncated {
                self.metrics.increment(
                    metrics::LINES_TRUNCATED_TOTAL,
                    &[(LABEL_SOURCE, self.name.as_str())],
                    lines.truncated() - truncated,
                );
                truncated = lines.truncated();
            }
        }
    }

    fn process_line(&self, line: &[u8], outbox: &Outbox) {
        let labels = [(LABEL_SOURCE, self.name.as_str())];
        if let Some(watchdog) = &self.watchdog {
            watchdog.touch();
        }
        self.metrics.increment(metrics::LINES_PROCESSED_TOTAL, &labels, 1);
        self.metrics
            .gauge(metrics::LAST_ACTIVITY_TIMESTAMP_SECONDS, &labels, unix_now());

        if !self.detector.detect(line) {
            return;
        }
        self.metrics.increment(metrics::ISSUES_DETECTED_TOTAL, &labels, 1);

        if self.exclusion.as_ref().is_some_and(|ex| ex.detect(line)) {
            self.metrics.increment(metrics::LINES_EXCLUDED_TOTAL, &labels, 1);
            tracing::debug!(
                source = %self.name,
                line = %String::from_utf8_lossy(line),
                "line excluded"
            );
            return;
        }
        tracing::debug!(
            source = %self.name,
            line = %String::from_utf8_lossy(line),
            "line matched"
        );

        if let Some(closed) = self.buffer_line(line) {
            outbox.submit(Delivery::Batch(closed));
        }
    }

    /// 매칭된 라인을 배치에 넣고, 그 때문에 닫힌 배치가 있으면 돌려줍니다.
    fn buffer_line(&self, line: &[u8]) -> Option<Batch> {
        let timestamp = self
            .detector
            .as_timestamp_extractor()
            .and_then(|ex| ex.extract_timestamp(line))
            .or_else(|| extract_timestamp(line));
        let text = match self.detector.as_message_transformer() {
            Some(transformer) => transformer.transform(line),
            None => Cow::Borrowed(line),
        };

        let mut batcher = lock(&self.batcher);
        let was_open = batcher.is_open();
        let closed = batcher.push(&text, timestamp, || self.metadata(line), Instant::now());
        drop(batcher);

        if !was_open || closed.is_some() {
            self.wake.notify_one();
        }
        closed
    }

    fn metadata(&self, line: &[u8]) -> BatchMetadata {
        BatchMetadata {
            priority: extract_syslog_priority(line),
            context: self
                .detector
                .as_context_extractor()
                .and_then(|ex| ex.context(line)),
            raw_line: String::from_utf8_lossy(line).into_owned(),
        }
    }

    fn flush(&self, outbox: &Outbox) {
        let pending = lock(&self.batcher).take();
        if let Some(batch) = pending {
            tracing::debug!(source = %self.name, lines = batch.line_count(), "flushing batch");
            outbox.submit(Delivery::Batch(batch));
        }
    }
}

/// 마지막 매칭 후 플러시 간격이 지나면 배치를 닫습니다.
async fn flush_timer(
    batcher: Arc<Mutex<Batcher>>,
    wake: Arc<Notify>,
    outbox: Outbox,
    stop: CancellationToken,
) {
    loop {
        let deadline = lock(&batcher).flush_deadline();
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = wake.notified() => {}
            _ = sleep_until(deadline) => {
                let stale = lock(&batcher).take_if_stale(Instant::now());
                if let Some(batch) = stale {
                    outbox.submit(Delivery::Batch(batch));
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 비활성 감시 태스크
async fn watch_inactivity(
    name: String,
    watchdog: Arc<InactivityWatchdog>,
    outbox: Outbox,
    recorder: Arc<dyn MetricsSink>,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(watchdog.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match watchdog.check() {
            Some(WatchdogEvent::Silent { idle }) => {
                tracing::warn!(
                    source = %name,
                    idle_secs = idle.as_secs(),
                    "no logs received within inactivity threshold"
                );
                recorder.increment(
                    metrics::INACTIVITY_ALERTS_TOTAL,
                    &[(LABEL_SOURCE, name.as_str())],
                    1,
                );
                outbox.submit(Delivery::Alert(inactivity_report(&name, watchdog.threshold())));
            }
            Some(WatchdogEvent::Resumed) => {
                tracing::info!(source = %name, "logs resumed");
                outbox.submit(Delivery::Alert(recovery_report(&name)));
            }
            None => {}
        }
    }
}

fn lock(batcher: &Mutex<Batcher>) -> MutexGuard<'_, Batcher> {
    batcher.lock().unwrap_or_else(|e| e.into_inner())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ─── MonitorBuilder ──────────────────────────────────────────────────

/// 모니터 빌더
///
/// 소스, 디텍터, 싱크는 필수입니다.
pub struct MonitorBuilder {
    source: Option<Arc<dyn DynLineSource>>,
    detector: Option<Box<dyn Detector>>,
    exclusion: Option<Box<dyn Detector>>,
    rate_limit: Option<(u32, Duration)>,
    inactivity: Option<Duration>,
    state_provider: Option<Arc<dyn StateProvider>>,
    sink: Option<Arc<dyn DynReportSink>>,
    retry_queue: Option<Arc<dyn RetryQueue>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    stop_on_eof: bool,
    reconnect_delay: Duration,
}

impl MonitorBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            source: None,
            detector: None,
            exclusion: None,
            rate_limit: None,
            inactivity: None,
            state_provider: None,
            sink: None,
            retry_queue: None,
            metrics: None,
            stop_on_eof: false,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// 모니터 설정에서 디텍터, 제외 패턴, 속도 제한, 비활성 임계값을 구성합니다.
    ///
    /// 소스와 싱크는 호출자가 따로 지정해야 합니다.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, EngineError> {
        let format = infer_format(&config.source_type, &config.format, &config.pattern)?;
        let mut builder = Self::new()
            .detector(build_detector(format, &config.pattern)?)
            .stop_on_eof(config.stop_on_eof);

        if let Some(exclusion) = build_exclusion(&config.exclude_pattern)? {
            builder = builder.exclusion(exclusion);
        }
        if let Some(window) = config.rate_limit_window()? {
            builder = builder.rate_limit(config.rate_limit_burst, window);
        }
        if let Some(threshold) = config.max_inactivity()? {
            builder = builder.inactivity(threshold);
        }

        tracing::debug!(
            monitor = %config.name,
            format = %format,
            "monitor configured"
        );
        Ok(builder)
    }

    /// 라인 소스를 지정합니다.
    pub fn source(mut self, source: Arc<dyn DynLineSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 디텍터를 지정합니다.
    pub fn detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// 제외 디텍터를 지정합니다. 매칭된 라인 중 이 디텍터에도 걸리면 버립니다.
    pub fn exclusion(mut self, exclusion: Box<dyn Detector>) -> Self {
        self.exclusion = Some(exclusion);
        self
    }

    /// 윈도우당 리포트 수를 제한합니다.
    pub fn rate_limit(mut self, burst: u32, window: Duration) -> Self {
        self.rate_limit = Some((burst, window));
        self
    }

    /// 비활성 경보 임계값을 지정합니다.
    pub fn inactivity(mut self, threshold: Duration) -> Self {
        self.inactivity = Some(threshold);
        self
    }

    /// 시스템 상태 제공자를 지정합니다.
    pub fn state_provider(mut self, provider: Arc<dyn StateProvider>) -> Self {
        self.state_provider = Some(provider);
        self
    }

    /// 리포트 싱크를 지정합니다.
    pub fn sink(mut self, sink: Arc<dyn DynReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 재시도 큐를 지정합니다.
    pub fn retry_queue(mut self, queue: Arc<dyn RetryQueue>) -> Self {
        self.retry_queue = Some(queue);
        self
    }

    /// 메트릭 싱크를 지정합니다. 지정하지 않으면 기록하지 않습니다.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// EOF에서 재연결하지 않고 종료할지 여부
    pub fn stop_on_eof(mut self, stop: bool) -> Self {
        self.stop_on_eof = stop;
        self
    }

    /// 재연결 간격을 지정합니다.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// 모니터를 빌드합니다.
    pub fn build(self) -> Result<Monitor, EngineError> {
        let missing = |field: &str| EngineError::Config {
            field: field.to_owned(),
            reason: "required".to_owned(),
        };
        let source = self.source.ok_or_else(|| missing("source"))?;
        let detector = self.detector.ok_or_else(|| missing("detector"))?;
        let sink = self.sink.ok_or_else(|| missing("sink"))?;
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn MetricsSink>);

        let name = source.name().to_owned();
        let limiter = self
            .rate_limit
            .map(|(burst, window)| RateLimiter::new(burst, window));
        let dispatcher = Dispatcher::new(
            name.clone(),
            sink,
            self.retry_queue,
            self.state_provider,
            limiter,
            Arc::clone(&metrics),
        );

        Ok(Monitor {
            name,
            source,
            detector,
            exclusion: self.exclusion,
            batcher: Arc::new(Mutex::new(Batcher::new(Instant::now()))),
            wake: Arc::new(Notify::new()),
            dispatcher: Arc::new(dispatcher),
            watchdog: self
                .inactivity
                .map(|threshold| Arc::new(InactivityWatchdog::new(threshold))),
            metrics,
            stop_on_eof: self.stop_on_eof,
            reconnect_delay: self.reconnect_delay,
        })
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
