//! Monitor orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logwarden-daemon`.
//! It validates configuration, builds one [`Monitor`] per `[[monitors]]`
//! entry around a shared report sink, and runs them until a shutdown
//! signal arrives or (in oneshot mode) every monitor has reached the end
//! of its stream.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (if enabled)
//! 2. Report sink, retry spool, system state provider
//! 3. Line sources and monitors
//!
//! # Shutdown Order (producers first)
//!
//! 1. Monitors (flush open batches into the sink or the spool)
//! 2. Spool resend, state refresher, uptime updater

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use logwarden_core::config::{LogwardenConfig, MonitorConfig};
use logwarden_core::metrics::{MetricsSink, RecorderMetrics};
use logwarden_core::pipeline::{DynReportSink, RetryQueue, StateProvider};
use logwarden_engine::{Monitor, MonitorBuilder};

use crate::delivery::{self, SpoolQueue};
use crate::metrics_server;
use crate::sources;
use crate::state::SysinfoStateProvider;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Validated configuration.
    config: LogwardenConfig,
    /// One monitor per configured source.
    monitors: Vec<Arc<Monitor>>,
    /// Shared report sink (spool resends go through it as well).
    sink: Arc<dyn DynReportSink>,
    /// Retry spool, when `delivery.spool` is on.
    spool: Option<Arc<SpoolQueue>>,
    /// Cached "Server State" provider, when `system_state.enabled` is on.
    state: Option<Arc<SysinfoStateProvider>>,
    /// Cancelled on shutdown.
    shutdown: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or any
    /// monitor fails to build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogwardenConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build the orchestrator from an already-loaded configuration.
    ///
    /// Installs the Prometheus recorder when metrics are enabled and
    /// delivers reports through the configured sink.
    pub async fn build_from_config(config: LogwardenConfig) -> Result<Self> {
        config.validate()?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let sink = delivery::build_sink(&config.delivery)?;
        Self::build_with_sink(config, sink).await
    }

    /// Build the orchestrator around an explicit report sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the spool cannot
    /// be opened, or a source or monitor cannot be built.
    pub async fn build_with_sink(
        config: LogwardenConfig,
        sink: Arc<dyn DynReportSink>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics: Arc<dyn MetricsSink> = Arc::new(RecorderMetrics);

        let spool = if config.delivery.spool {
            let queue = SpoolQueue::open(&config.general.data_dir, Arc::clone(&metrics)).await?;
            Some(Arc::new(queue))
        } else {
            None
        };

        let state = config.system_state.enabled.then(|| {
            Arc::new(SysinfoStateProvider::new(
                config.system_state.top_processes,
            ))
        });

        let mut monitors = Vec::with_capacity(config.monitors.len());
        for monitor_config in &config.monitors {
            let monitor = build_monitor(
                &config,
                monitor_config,
                &sink,
                spool.as_ref(),
                state.as_ref(),
                &metrics,
            )?;
            tracing::info!(
                monitor = monitor.name(),
                source_type = %monitor_config.source_type,
                format = %monitor_config.format,
                "monitor configured"
            );
            monitors.push(Arc::new(monitor));
        }

        Ok(Self {
            config,
            monitors,
            sink,
            spool,
            state,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of configured monitors.
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogwardenConfig {
        &self.config
    }

    /// Run every monitor until shutdown.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    /// - [`shutdown_token`](Self::shutdown_token) cancelled
    /// - every monitor finished (stop-on-EOF sources)
    pub async fn run(&self) -> Result<()> {
        let pid_path = (!self.config.general.pid_file.is_empty())
            .then(|| PathBuf::from(&self.config.general.pid_file));
        if let Some(path) = &pid_path {
            write_pid_file(path)?;
        }

        let result = self.run_monitors().await;

        if let Some(path) = &pid_path {
            remove_pid_file(path);
        }
        result
    }

    async fn run_monitors(&self) -> Result<()> {
        let background_cancel = CancellationToken::new();
        let background = self.spawn_background(&background_cancel);

        let monitor_cancel = self.shutdown.child_token();
        let mut running = JoinSet::new();
        for monitor in &self.monitors {
            let monitor = Arc::clone(monitor);
            let cancel = monitor_cancel.clone();
            running.spawn(async move { monitor.run(cancel).await });
        }

        tracing::info!(
            monitors = self.monitors.len(),
            oneshot = self.config.general.oneshot,
            "logwarden-daemon running"
        );

        let outcome = tokio::select! {
            signal = wait_for_shutdown_signal() => signal.map(|name| {
                tracing::info!(signal = name, "shutdown signal received");
            }),
            () = self.shutdown.cancelled() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            () = join_all(&mut running) => {
                tracing::info!("all monitors finished");
                Ok(())
            }
        };

        // monitors flush into the sink or spool before the resend task stops
        monitor_cancel.cancel();
        join_all(&mut running).await;

        background_cancel.cancel();
        for task in background {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task failed");
            }
        }

        if let Some(spool) = &self.spool
            && spool.depth() > 0
        {
            tracing::warn!(
                path = %spool.path().display(),
                depth = spool.depth(),
                "reports left in spool"
            );
        }

        tracing::info!("logwarden-daemon stopped");
        outcome
    }

    fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if let Some(spool) = &self.spool {
            let every = Duration::from_secs(self.config.delivery.retry_interval_secs);
            tasks.push(Arc::clone(spool).spawn_resend(
                Arc::clone(&self.sink),
                every,
                cancel.child_token(),
            ));
        }

        if let Some(state) = &self.state {
            let every = Duration::from_secs(self.config.system_state.refresh_secs);
            tasks.push(Arc::clone(state).spawn_refresh(every, cancel.child_token()));
        }

        if self.config.metrics.enabled {
            tasks.push(metrics_server::spawn_uptime_updater(
                self.start_time,
                cancel.child_token(),
            ));
        }

        tasks
    }
}

/// Whether a monitor stops at the end of its stream.
///
/// Stdin cannot be reopened, so it always stops.
pub fn stops_on_eof(config: &LogwardenConfig, monitor: &MonitorConfig) -> bool {
    config.general.oneshot || monitor.stop_on_eof || monitor.source_type == "stdin"
}

fn build_monitor(
    config: &LogwardenConfig,
    monitor_config: &MonitorConfig,
    sink: &Arc<dyn DynReportSink>,
    spool: Option<&Arc<SpoolQueue>>,
    state: Option<&Arc<SysinfoStateProvider>>,
    metrics: &Arc<dyn MetricsSink>,
) -> Result<Monitor> {
    let stop_on_eof = stops_on_eof(config, monitor_config);
    let source = sources::build_source(monitor_config, stop_on_eof)?;

    let mut builder = MonitorBuilder::from_config(monitor_config)?
        .source(source)
        .sink(Arc::clone(sink))
        .metrics(Arc::clone(metrics))
        .stop_on_eof(stop_on_eof);
    if let Some(spool) = spool {
        builder = builder.retry_queue(Arc::clone(spool) as Arc<dyn RetryQueue>);
    }
    if let Some(state) = state {
        builder = builder.state_provider(Arc::clone(state) as Arc<dyn StateProvider>);
    }
    Ok(builder.build()?)
}

async fn join_all(running: &mut JoinSet<()>) {
    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "monitor task panicked");
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with mode 0o700 and the file with 0o600
///
/// # Errors
///
/// Returns an error if the file already exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .mode(0o700)
            .recursive(true)
            .create(parent)?;
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
