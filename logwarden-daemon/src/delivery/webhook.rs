//! Webhook sink -- POSTs each report as JSON.

use std::time::Duration;

use logwarden_core::error::DeliveryError;
use logwarden_core::pipeline::ReportSink;
use logwarden_core::types::Report;

/// HTTP webhook sink.
///
/// Any non-2xx response is [`DeliveryError::Rejected`]; connection and
/// timeout failures are [`DeliveryError::Transport`].
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// Create a sink posting to `url` with a per-request timeout.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        if url.trim().is_empty() {
            return Err(DeliveryError::Transport("webhook url is empty".to_owned()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("logwarden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }
}

impl ReportSink for WebhookSink {
    async fn send(&self, report: &Report) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::debug!(event_id = %report.event_id, status = status.as_u16(), "report delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use logwarden_core::types::Severity;

    use super::*;

    /// Accept one HTTP request, answer with `status`, and return the request body.
    async fn serve_once(listener: TcpListener, status: &'static str) -> String {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut reader = BufReader::new(stream);

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).await.expect("read header");
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().expect("numeric length");
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await.expect("read body");

        let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        reader
            .get_mut()
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        String::from_utf8(body).expect("utf-8 body")
    }

    #[tokio::test]
    async fn test_posts_report_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}/hook", listener.local_addr().expect("addr"));
        let server = tokio::spawn(serve_once(listener, "200 OK"));

        let sink = WebhookSink::new(&url, Duration::from_secs(5)).expect("valid sink");
        sink.send(&Report::new("disk error", Severity::Error))
            .await
            .expect("should deliver");

        let body: serde_json::Value =
            serde_json::from_str(&server.await.expect("server task")).expect("JSON body");
        assert_eq!(body["message"], "disk error");
        assert_eq!(body["severity"], "error");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}/hook", listener.local_addr().expect("addr"));
        let server = tokio::spawn(serve_once(listener, "503 Service Unavailable"));

        let sink = WebhookSink::new(&url, Duration::from_secs(5)).expect("valid sink");
        let err = sink
            .send(&Report::new("disk error", Severity::Error))
            .await
            .expect_err("503 should be rejected");

        assert!(matches!(err, DeliveryError::Rejected { status: 503 }));
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let sink = WebhookSink::new(&format!("http://{addr}/hook"), Duration::from_secs(2))
            .expect("valid sink");
        let err = sink
            .send(&Report::new("x", Severity::Error))
            .await
            .expect_err("nothing is listening");
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[test]
    fn test_empty_url_is_rejected() {
        assert!(WebhookSink::new("  ", Duration::from_secs(1)).is_err());
    }
}
