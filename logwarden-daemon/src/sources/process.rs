//! Process source -- streams the stdout of a child process.
//!
//! Used for `command`, `dmesg` and `journalctl` monitors. Every call to
//! `stream()` spawns a fresh child; a supervisor task reaps it and logs
//! a non-zero exit, or kills it when the source is closed or the next
//! child replaces it.

use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use logwarden_core::error::SourceError;
use logwarden_core::pipeline::{LineReader, LineSource};

/// Handle to the supervisor of the current child.
struct Running {
    kill: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// A source backed by an external command.
pub struct ProcessSource {
    name: String,
    program: String,
    args: Vec<String>,
    running: Mutex<Option<Running>>,
}

impl ProcessSource {
    /// Run `program args...`.
    pub fn command(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            running: Mutex::new(None),
        }
    }

    /// Kernel ring buffer. `follow` adds `-w`.
    pub fn dmesg(name: impl Into<String>, follow: bool) -> Self {
        let args = if follow {
            vec!["-w".to_owned()]
        } else {
            Vec::new()
        };
        Self::command(name, "dmesg", args)
    }

    /// systemd journal in `short-iso` output. `follow` adds `-f`.
    pub fn journalctl(name: impl Into<String>, extra_args: Vec<String>, follow: bool) -> Self {
        let mut args = Vec::with_capacity(extra_args.len() + 3);
        if follow {
            args.push("-f".to_owned());
        }
        args.push("-o".to_owned());
        args.push("short-iso".to_owned());
        args.extend(extra_args);
        Self::command(name, "journalctl", args)
    }

    /// Program being run.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn take_running(&self) -> Option<Running> {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl LineSource for ProcessSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<LineReader, SourceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Open {
                name: self.name.clone(),
                reason: format!("failed to start '{}': {}", self.program, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SourceError::Open {
            name: self.name.clone(),
            reason: "child stdout unavailable".to_owned(),
        })?;

        tracing::debug!(source = %self.name, program = %self.program, pid = ?child.id(), "command started");

        let (kill, kill_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            self.name.clone(),
            self.program.clone(),
            child,
            kill_rx,
        ));

        // dropping the previous sender kills the previous child
        let previous = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Running { kill, task });
        drop(previous);

        Ok(Box::new(stdout))
    }

    async fn close(&self) -> Result<(), SourceError> {
        let Some(running) = self.take_running() else {
            return Ok(());
        };
        let _ = running.kill.send(());
        running.task.await.map_err(|e| SourceError::Close {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

async fn supervise(
    name: String,
    program: String,
    mut child: Child,
    kill: oneshot::Receiver<()>,
) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {
                tracing::debug!(source = %name, program = %program, "command exited");
            }
            Ok(status) => {
                tracing::warn!(source = %name, program = %program, status = %status, "command exited with error");
            }
            Err(e) => {
                tracing::warn!(source = %name, program = %program, error = %e, "failed to wait for command");
            }
        },
        _ = kill => {
            if let Err(e) = child.kill().await {
                tracing::warn!(source = %name, program = %program, error = %e, "failed to kill command");
            } else {
                tracing::debug!(source = %name, program = %program, "command killed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::time::Duration;

    use super::*;

    #[test]
    fn test_dmesg_args() {
        assert_eq!(ProcessSource::dmesg("k", true).args(), ["-w"]);
        assert!(ProcessSource::dmesg("k", false).args().is_empty());
    }

    #[test]
    fn test_journalctl_args() {
        let source = ProcessSource::journalctl("j", vec!["-u".to_owned(), "nginx".to_owned()], true);
        assert_eq!(source.program(), "journalctl");
        assert_eq!(source.args(), ["-f", "-o", "short-iso", "-u", "nginx"]);

        let once = ProcessSource::journalctl("j", Vec::new(), false);
        assert_eq!(once.args(), ["-o", "short-iso"]);
    }

    #[tokio::test]
    async fn test_streams_command_stdout() {
        let source = ProcessSource::command(
            "echo",
            "sh",
            vec!["-c".to_owned(), "printf 'one\\ntwo\\n'".to_owned()],
        );

        let mut reader = LineSource::stream(&source).await.expect("should spawn");
        let mut out = String::new();
        reader.read_to_string(&mut out).await.expect("should read");

        assert_eq!(out, "one\ntwo\n");
        LineSource::close(&source).await.expect("should close");
    }

    #[tokio::test]
    async fn test_missing_program_is_open_error() {
        let source = ProcessSource::command("nope", "/nonexistent/logwarden-cmd", Vec::new());
        let err = LineSource::stream(&source).await.err().expect("should fail");
        assert!(err.to_string().contains("/nonexistent/logwarden-cmd"));
    }

    #[tokio::test]
    async fn test_close_kills_long_running_child() {
        // Given: A child that would run for a long time
        let source = ProcessSource::command("sleeper", "sleep", vec!["30".to_owned()]);
        let mut reader = LineSource::stream(&source).await.expect("should spawn");

        // When: Closing the source
        tokio::time::timeout(Duration::from_secs(5), LineSource::close(&source))
            .await
            .expect("close should not hang")
            .expect("close should succeed");

        // Then: Its stdout reaches EOF
        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut rest))
            .await
            .expect("stdout should close after kill")
            .expect("read should succeed");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_close_without_stream_is_noop() {
        let source = ProcessSource::command("idle", "true", Vec::new());
        LineSource::close(&source).await.expect("should close");
    }
}
