//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose the scrape endpoint. Monitors record through
//! [`RecorderMetrics`](logwarden_core::metrics::RecorderMetrics), which
//! forwards to the recorder installed here.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;

use logwarden_core::config::MetricsConfig;
use logwarden_core::metrics as m;

/// How often the uptime gauge is refreshed.
const UPTIME_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(10);

/// Resolve the listen address from the metrics config.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// This function should be called once per process.
///
/// # Errors
///
/// - Unsupported endpoint or unparseable address
/// - Socket binding fails
/// - Global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Spawn a background task that periodically updates the uptime gauge.
pub fn spawn_uptime_updater(
    start_time: Instant,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
        MetricsConfig {
            enabled: true,
            listen_addr: listen_addr.to_owned(),
            port,
            endpoint: endpoint.to_owned(),
        }
    }

    #[test]
    fn test_listen_addr_parses_ipv4() {
        let addr = listen_addr(&config("127.0.0.1", 9464, "/metrics")).expect("valid address");
        assert_eq!(addr.port(), 9464);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_listen_addr_rejects_custom_endpoint() {
        let err = listen_addr(&config("127.0.0.1", 9464, "/custom")).expect_err("unsupported");
        assert!(err.to_string().contains("/custom"));
    }

    #[test]
    fn test_listen_addr_rejects_bad_ip() {
        assert!(listen_addr(&config("999.999.999.999", 9464, "/metrics")).is_err());
    }

    #[tokio::test]
    async fn test_uptime_updater_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let task = spawn_uptime_updater(Instant::now(), cancel.clone());

        cancel.cancel();

        let result = tokio::time::timeout(tokio::time::Duration::from_millis(500), task).await;
        assert!(result.is_ok(), "uptime updater should stop after cancel");
    }
}
