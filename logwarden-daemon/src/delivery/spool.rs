//! Retry spool -- failed reports persisted as JSON lines.
//!
//! Reports the sink could not deliver are appended to
//! `{data_dir}/spool.jsonl`. A background task periodically re-sends
//! the spooled reports and keeps only those that fail again. The number
//! of waiting reports is published as the `logwarden_spool_depth` gauge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logwarden_core::error::DeliveryError;
use logwarden_core::metrics::{self, MetricsSink};
use logwarden_core::pipeline::{BoxFuture, DynReportSink, RetryQueue};
use logwarden_core::types::Report;

/// Spool file name inside `data_dir`.
pub const SPOOL_FILE: &str = "spool.jsonl";

/// Result of one re-send pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResendSummary {
    /// Delivered and removed from the spool
    pub sent: usize,
    /// Still failing, kept in the spool
    pub kept: usize,
    /// Unreadable lines dropped from the spool
    pub discarded: usize,
}

/// File-backed [`RetryQueue`].
pub struct SpoolQueue {
    path: PathBuf,
    /// Guards the spool file. Never held across a send.
    lock: Mutex<()>,
    /// Serializes re-send passes.
    pass: Mutex<()>,
    depth: AtomicUsize,
    metrics: Arc<dyn MetricsSink>,
}

impl SpoolQueue {
    /// Open (or create) the spool under `data_dir`.
    pub async fn open(
        data_dir: impl AsRef<Path>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, DeliveryError> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(SPOOL_FILE);

        let depth = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let queue = Self {
            path,
            lock: Mutex::new(()),
            pass: Mutex::new(()),
            depth: AtomicUsize::new(depth),
            metrics,
        };
        queue.publish_depth();
        if depth > 0 {
            tracing::info!(path = %queue.path.display(), depth, "spooled reports found");
        }
        Ok(queue)
    }

    /// Spool file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of reports waiting.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn publish_depth(&self) {
        #[allow(clippy::cast_precision_loss)]
        self.metrics
            .gauge(metrics::SPOOL_DEPTH, &[], self.depth() as f64);
    }

    async fn append(&self, report: &Report) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        self.depth.fetch_add(1, Ordering::SeqCst);
        self.publish_depth();
        Ok(())
    }

    async fn read_spool(&self) -> Result<String, DeliveryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Try to deliver every spooled report once.
    ///
    /// Sends happen on a snapshot of the spool, so `enqueue` is not blocked
    /// while the pass waits on the sink. Reports appended during the pass are
    /// kept behind the ones that failed again.
    pub async fn resend(&self, sink: &dyn DynReportSink) -> Result<ResendSummary, DeliveryError> {
        let _pass = self.pass.lock().await;

        let content = {
            let _guard = self.lock.lock().await;
            self.read_spool().await?
        };
        if content.is_empty() {
            return Ok(ResendSummary::default());
        }

        let mut summary = ResendSummary::default();
        let mut kept = String::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let report: Report = match serde_json::from_str(line) {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable spool entry");
                    summary.discarded += 1;
                    continue;
                }
            };
            match sink.send(&report).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    tracing::debug!(event_id = %report.event_id, error = %e, "spooled report still failing");
                    kept.push_str(line);
                    kept.push('\n');
                    summary.kept += 1;
                }
            }
        }

        let _guard = self.lock.lock().await;
        let current = self.read_spool().await?;
        let appended = current.get(content.len()..).unwrap_or_default();
        let appended_count = appended.lines().filter(|l| !l.trim().is_empty()).count();
        kept.push_str(appended);

        // replace the spool atomically
        let staging = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&staging, kept.as_bytes()).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        self.depth
            .store(summary.kept + appended_count, Ordering::SeqCst);
        self.publish_depth();
        Ok(summary)
    }

    /// Re-send on a fixed interval until cancelled.
    pub fn spawn_resend(
        self: Arc<Self>,
        sink: Arc<dyn DynReportSink>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("spool resend task shutting down");
                        break;
                    }
                    _ = interval.tick() => {}
                }
                if self.depth() == 0 {
                    continue;
                }
                match self.resend(sink.as_ref()).await {
                    Ok(summary) => tracing::info!(
                        sent = summary.sent,
                        kept = summary.kept,
                        discarded = summary.discarded,
                        "spool resend pass finished"
                    ),
                    Err(e) => tracing::warn!(error = %e, "spool resend failed"),
                }
            }
        })
    }
}

impl RetryQueue for SpoolQueue {
    fn enqueue(&self, report: Report) -> BoxFuture<'_, Result<(), DeliveryError>> {
        Box::pin(async move {
            self.append(&report).await?;
            tracing::debug!(event_id = %report.event_id, depth = self.depth(), "report spooled");
            Ok(())
        })
    }
}
