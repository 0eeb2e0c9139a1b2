//! Report delivery -- sinks and the retry spool.
//!
//! - [`StdoutSink`]: one JSON line per report on stdout
//! - [`WebhookSink`]: HTTP POST of the report JSON
//! - [`SpoolQueue`]: [`RetryQueue`](logwarden_core::pipeline::RetryQueue)
//!   persisting failed reports under `data_dir`
//!
//! Every sink built by [`build_sink`] is wrapped in [`Stamped`], which adds
//! the `environment` and `release` tags from `[delivery]`.

pub mod spool;
pub mod stdout;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use logwarden_core::config::DeliveryConfig;
use logwarden_core::error::DeliveryError;
use logwarden_core::pipeline::{DynReportSink, ReportSink};
use logwarden_core::types::Report;

pub use spool::SpoolQueue;
pub use stdout::StdoutSink;
pub use webhook::WebhookSink;

/// Tags added to every delivered report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryTags {
    environment: String,
    release: String,
}

impl DeliveryTags {
    /// Take the tag values from `[delivery]`.
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            release: config.release.clone(),
        }
    }

    fn apply(&self, report: &mut Report) {
        if !self.environment.is_empty() {
            report
                .tags
                .insert("environment".to_owned(), self.environment.clone());
        }
        if !self.release.is_empty() {
            report.tags.insert("release".to_owned(), self.release.clone());
        }
    }
}

/// Sink decorator that stamps [`DeliveryTags`] onto each report.
pub struct Stamped<S> {
    inner: S,
    tags: DeliveryTags,
}

impl<S> Stamped<S> {
    /// Wrap `inner`.
    pub fn new(inner: S, tags: DeliveryTags) -> Self {
        Self { inner, tags }
    }
}

impl<S: ReportSink> ReportSink for Stamped<S> {
    async fn send(&self, report: &Report) -> Result<(), DeliveryError> {
        let mut stamped = report.clone();
        self.tags.apply(&mut stamped);
        ReportSink::send(&self.inner, &stamped).await
    }
}

/// Build the configured sink.
pub fn build_sink(config: &DeliveryConfig) -> Result<Arc<dyn DynReportSink>, DeliveryError> {
    let tags = DeliveryTags::from_config(config);
    let sink: Arc<dyn DynReportSink> = match config.sink.as_str() {
        "stdout" => Arc::new(Stamped::new(StdoutSink::new(), tags)),
        "webhook" => {
            let timeout = Duration::from_secs(config.timeout_secs);
            Arc::new(Stamped::new(WebhookSink::new(&config.url, timeout)?, tags))
        }
        other => {
            return Err(DeliveryError::Transport(format!(
                "unknown sink '{other}', expected 'stdout' or 'webhook'"
            )));
        }
    };
    tracing::info!(sink = %config.sink, "report sink configured");
    Ok(sink)
}
