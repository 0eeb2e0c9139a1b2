//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> sources -> monitors -> sink/spool -> shutdown.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use logwarden_core::config::{LogwardenConfig, MonitorConfig};
use logwarden_core::error::DeliveryError;
use logwarden_core::pipeline::{DynReportSink, ReportSink};
use logwarden_core::types::Report;
use logwarden_daemon::delivery::spool::SPOOL_FILE;
use logwarden_daemon::orchestrator::Orchestrator;

const APP_LOG: &str = "\
2023-10-27T09:59:58Z INFO service started
2023-10-27T10:00:00Z ERROR unhandled exception
    at com.example.Main.run(Main.java:10)
    at com.example.Main.main(Main.java:3)
2023-10-27T10:00:10Z INFO request served
2023-10-27T10:00:30Z ERROR second failure
";

/// Records reports, or rejects them while `failing` is set.
#[derive(Default)]
struct CollectingSink {
    reports: Mutex<Vec<Report>>,
    failing: AtomicBool,
}

impl CollectingSink {
    fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for CollectingSink {
    async fn send(&self, report: &Report) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected { status: 503 });
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// A config with one file monitor, no metrics, and no system state.
fn file_config(data_dir: &Path, log_path: &Path) -> LogwardenConfig {
    let mut config = LogwardenConfig::default();
    config.general.data_dir = data_dir.display().to_string();
    config.general.oneshot = true;
    config.system_state.enabled = false;
    config.delivery.spool = false;
    config.monitors.push(MonitorConfig {
        name: "app".to_owned(),
        path: log_path.display().to_string(),
        pattern: "ERROR|\\s+at ".to_owned(),
        ..MonitorConfig::default()
    });
    config
}

fn write_log(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("app.log");
    std::fs::write(&path, APP_LOG).expect("should write log file");
    path
}

#[tokio::test]
async fn test_oneshot_reads_file_and_delivers_incidents() {
    // Given: A log file with two incidents and a oneshot config
    let temp_dir = TempDir::new().expect("should create temp dir");
    let log_path = write_log(&temp_dir);
    let config = file_config(temp_dir.path(), &log_path);
    let sink = Arc::new(CollectingSink::default());

    // When: Running the orchestrator to the end of the file
    let orchestrator = Orchestrator::build_with_sink(config, sink.clone() as Arc<dyn DynReportSink>)
        .await
        .expect("should build orchestrator");
    assert_eq!(orchestrator.monitor_count(), 1);
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("oneshot run should finish")
        .expect("run should succeed");

    // Then: One report per incident, stack frames kept with the first
    let reports = sink.reports();
    assert_eq!(reports.len(), 2, "{reports:?}");
    assert_eq!(reports[0].tag("source"), Some("app"));
    assert_eq!(reports[0].extra["line_count"], 3);
    assert!(reports[0].message.contains("Main.java:3"));
    assert_eq!(reports[1].message, "2023-10-27T10:00:30Z ERROR second failure");
    assert!(reports.iter().all(|r| !r.contexts.contains_key("Server State")));
}

#[tokio::test]
async fn test_failed_deliveries_land_in_spool() {
    // Given: A sink that rejects everything and the spool enabled
    let temp_dir = TempDir::new().expect("should create temp dir");
    let log_path = write_log(&temp_dir);
    let mut config = file_config(temp_dir.path(), &log_path);
    config.delivery.spool = true;
    let sink = Arc::new(CollectingSink::default());
    sink.failing.store(true, Ordering::SeqCst);

    // When: Running in oneshot mode
    let orchestrator = Orchestrator::build_with_sink(config, sink.clone() as Arc<dyn DynReportSink>)
        .await
        .expect("should build orchestrator");
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("oneshot run should finish")
        .expect("run should succeed");

    // Then: Both reports are persisted as JSON lines
    assert!(sink.reports().is_empty());
    let spooled = std::fs::read_to_string(temp_dir.path().join(SPOOL_FILE))
        .expect("spool file should exist");
    let reports: Vec<Report> = spooled
        .lines()
        .map(|line| serde_json::from_str(line).expect("spool line should be a report"))
        .collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].message, "2023-10-27T10:00:30Z ERROR second failure");
}

#[tokio::test]
async fn test_shutdown_token_stops_following_monitor() {
    // Given: A following (non-oneshot) file monitor and a PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let log_path = temp_dir.path().join("app.log");
    std::fs::write(&log_path, "").expect("should create log file");
    let pid_path = temp_dir.path().join("run").join("logwarden.pid");

    let mut config = file_config(temp_dir.path(), &log_path);
    config.general.oneshot = false;
    config.general.pid_file = pid_path.display().to_string();
    let sink = Arc::new(CollectingSink::default());

    let orchestrator = Orchestrator::build_with_sink(config, sink.clone() as Arc<dyn DynReportSink>)
        .await
        .expect("should build orchestrator");
    let shutdown = orchestrator.shutdown_token();
    let run = tokio::spawn(async move { orchestrator.run().await });

    // When: A line is appended while running, then shutdown is requested
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pid_path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("PID file should be written");
    tokio::time::sleep(Duration::from_millis(500)).await;
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .expect("should open log file");
        writeln!(file, "2023-10-27T10:00:00Z ERROR appended while running")
            .expect("should append");
    }
    tokio::time::sleep(Duration::from_millis(800)).await;
    shutdown.cancel();

    // Then: The run returns, the open batch is flushed, and the PID file is gone
    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should stop after cancel")
        .expect("task should not panic")
        .expect("run should succeed");

    let reports = sink.reports();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert_eq!(
        reports[0].message,
        "2023-10-27T10:00:00Z ERROR appended while running"
    );
    assert!(!pid_path.exists(), "PID file should be removed");
}

#[tokio::test]
async fn test_build_rejects_invalid_detector_pattern() {
    // Given: A json monitor whose pattern lacks the field name
    let temp_dir = TempDir::new().expect("should create temp dir");
    let log_path = write_log(&temp_dir);
    let mut config = file_config(temp_dir.path(), &log_path);
    config.monitors[0].format = "json".to_owned();
    config.monitors[0].pattern = "error".to_owned();

    // When: Building the orchestrator
    let result = Orchestrator::build_with_sink(
        config,
        Arc::new(CollectingSink::default()) as Arc<dyn DynReportSink>,
    )
    .await;

    // Then: The detector error is surfaced
    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("json"), "{err}");
}

#[tokio::test]
async fn test_build_rejects_duplicate_monitor_names() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let log_path = write_log(&temp_dir);
    let mut config = file_config(temp_dir.path(), &log_path);
    let duplicate = config.monitors[0].clone();
    config.monitors.push(duplicate);

    let result = Orchestrator::build_with_sink(
        config,
        Arc::new(CollectingSink::default()) as Arc<dyn DynReportSink>,
    )
    .await;

    assert!(result.is_err());
}
