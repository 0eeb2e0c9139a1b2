//! Stdout sink -- one JSON line per report.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use logwarden_core::error::DeliveryError;
use logwarden_core::pipeline::ReportSink;
use logwarden_core::types::Report;

type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes reports as JSON lines.
///
/// The writer is locked per report so lines from concurrent monitors
/// never interleave.
pub struct StdoutSink {
    out: Mutex<Output>,
}

impl StdoutSink {
    /// Write to the process's standard output.
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    /// Write to an arbitrary writer.
    pub fn with_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for StdoutSink {
    async fn send(&self, report: &Report) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};

    use logwarden_core::types::Severity;

    use super::*;

    #[tokio::test]
    async fn test_each_report_is_one_json_line() {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let sink = StdoutSink::with_writer(writer);

        sink.send(&Report::new("first\nsecond", Severity::Error).with_tag("source", "app"))
            .await
            .expect("should write");
        sink.send(&Report::new("third", Severity::Warning))
            .await
            .expect("should write");

        let mut lines = BufReader::new(reader).lines();
        let first: Report = serde_json::from_str(&lines.next_line().await.unwrap().unwrap())
            .expect("valid JSON");
        let second: Report = serde_json::from_str(&lines.next_line().await.unwrap().unwrap())
            .expect("valid JSON");

        assert_eq!(first.message, "first\nsecond");
        assert_eq!(first.tag("source"), Some("app"));
        assert_eq!(second.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_closed_writer_is_io_error() {
        let (writer, reader) = tokio::io::duplex(16);
        drop(reader);
        let sink = StdoutSink::with_writer(writer);

        let err = sink
            .send(&Report::new("lost", Severity::Error))
            .await
            .expect_err("reader is gone");
        assert!(matches!(err, DeliveryError::Io(_)));
    }
}
