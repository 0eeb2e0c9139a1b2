//! System state snapshot -- the "Server State" context of every report.
//!
//! [`SysinfoStateProvider`] refreshes a cached snapshot in a background
//! task using `sysinfo`, so that `state()` never touches `/proc` on the
//! report path. The snapshot contains:
//!
//! - `load`: 1/5/15 minute load average
//! - `memory`: total/used/available bytes and used percent
//! - `uptime`: seconds since boot
//! - `top_cpu`, `top_mem`: top-N processes with sanitized command lines
//!
//! Refreshing backs off to [`BACKOFF_INTERVAL`] while the 1-minute load
//! exceeds the number of CPUs.

pub mod sanitizer;

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use sysinfo::{Process, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logwarden_core::pipeline::StateProvider;
use logwarden_core::types::StateSnapshot;

pub use sanitizer::sanitize_command;

/// Refresh interval while the host is under high load.
pub const BACKOFF_INTERVAL: Duration = Duration::from_secs(600);

/// Cached system state.
pub struct SysinfoStateProvider {
    snapshot: RwLock<StateSnapshot>,
    top_processes: usize,
}

impl SysinfoStateProvider {
    /// Create a provider with an empty snapshot.
    pub fn new(top_processes: usize) -> Self {
        Self {
            snapshot: RwLock::new(StateSnapshot::new()),
            top_processes,
        }
    }

    fn store(&self, snapshot: StateSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Refresh in the background until cancelled.
    pub fn spawn_refresh(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            let mut system = Some(System::new());

            loop {
                let Some(mut sys) = system.take() else {
                    break;
                };
                let top = self.top_processes;
                let collected = tokio::task::spawn_blocking(move || {
                    let snapshot = collect_snapshot(&mut sys, top);
                    (sys, snapshot)
                })
                .await;

                let next = match collected {
                    Ok((sys, snapshot)) => {
                        let next = next_interval(load_one(&snapshot), cpus, interval);
                        self.store(snapshot);
                        system = Some(sys);
                        next
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "system state refresh failed");
                        system = Some(System::new());
                        interval
                    }
                };

                if next != interval {
                    tracing::debug!(next_secs = next.as_secs(), "high load, backing off state refresh");
                }

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("system state refresher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(next) => {}
                }
            }
        })
    }
}

impl StateProvider for SysinfoStateProvider {
    fn state(&self) -> StateSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Pick the next refresh delay from the 1-minute load.
#[allow(clippy::cast_precision_loss)]
pub fn next_interval(load_one: f64, cpus: usize, base: Duration) -> Duration {
    if load_one > cpus as f64 {
        BACKOFF_INTERVAL.max(base)
    } else {
        base
    }
}

fn load_one(snapshot: &StateSnapshot) -> f64 {
    snapshot
        .get("load")
        .and_then(|load| load.get("one"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Refresh `system` and build a snapshot.
pub fn collect_snapshot(system: &mut System, top_processes: usize) -> StateSnapshot {
    system.refresh_memory();
    system.refresh_processes();

    let load = System::load_average();
    let total = system.total_memory();
    let used = system.used_memory();
    #[allow(clippy::cast_precision_loss)]
    let percent = if total == 0 {
        0.0
    } else {
        used as f64 * 100.0 / total as f64
    };

    let mut processes: Vec<&Process> = system.processes().values().collect();

    let mut snapshot = StateSnapshot::new();
    snapshot.insert(
        "timestamp".to_owned(),
        json!(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        ),
    );
    snapshot.insert("uptime".to_owned(), json!(System::uptime()));
    snapshot.insert(
        "load".to_owned(),
        json!({"one": load.one, "five": load.five, "fifteen": load.fifteen}),
    );
    snapshot.insert(
        "memory".to_owned(),
        json!({
            "total": total,
            "used": used,
            "available": system.available_memory(),
            "percent": (percent * 100.0).round() / 100.0,
        }),
    );

    if top_processes > 0 {
        processes.sort_by(|a, b| {
            b.cpu_usage()
                .partial_cmp(&a.cpu_usage())
                .unwrap_or(Ordering::Equal)
        });
        snapshot.insert(
            "top_cpu".to_owned(),
            Value::Array(
                processes
                    .iter()
                    .take(top_processes)
                    .map(|p| process_entry(p))
                    .collect(),
            ),
        );

        processes.sort_by_key(|p| std::cmp::Reverse(p.memory()));
        snapshot.insert(
            "top_mem".to_owned(),
            Value::Array(
                processes
                    .iter()
                    .take(top_processes)
                    .map(|p| process_entry(p))
                    .collect(),
            ),
        );
    }
    snapshot.insert(
        "process_count".to_owned(),
        json!(system.processes().len()),
    );

    snapshot
}

fn process_entry(process: &Process) -> Value {
    let command = if process.cmd().is_empty() {
        process.name().to_owned()
    } else {
        sanitize_command(process.cmd())
    };
    json!({
        "pid": process.pid().as_u32(),
        "cpu": format!("{:.1}", process.cpu_usage()),
        "rss": process.memory(),
        "command": command,
    })
}
