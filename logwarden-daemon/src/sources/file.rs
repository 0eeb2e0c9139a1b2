//! File source -- follows a log file the way `tail -F` does.
//!
//! In follow mode a background task polls the file every
//! [`POLL_INTERVAL`], copies new bytes into an in-process pipe, and
//! detects rotation:
//!
//! - inode change (logrotate `create`): drain the old handle, reopen from the start
//! - size below the read offset (`copytruncate`): rewind to the start
//! - file removed: drain, then wait for it to reappear
//!
//! The first stream starts at the end of the file so that history is not
//! replayed on startup. Without follow mode the file is read once from
//! the start and the stream ends at EOF.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use logwarden_core::error::SourceError;
use logwarden_core::pipeline::{LineReader, LineSource};

/// How often the followed file is checked for growth and rotation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Capacity of the pipe between the follow task and the monitor.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Read chunk size.
const READ_CHUNK: usize = 16 * 1024;

/// A followed (or one-shot) log file.
pub struct FileSource {
    name: String,
    path: PathBuf,
    follow: bool,
    /// Set once the first stream has been opened.
    started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileSource {
    /// Create a file source. `follow = false` reads the file once.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, follow: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            follow,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_error(&self, e: std::io::Error) -> SourceError {
        SourceError::Open {
            name: self.name.clone(),
            reason: format!("{}: {}", self.path.display(), e),
        }
    }
}

impl LineSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<LineReader, SourceError> {
        if !self.follow {
            let file = File::open(&self.path)
                .await
                .map_err(|e| self.open_error(e))?;
            return Ok(Box::new(file));
        }

        let from_end = !self.started.swap(true, Ordering::SeqCst);
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let task = tokio::spawn(follow(
            self.name.clone(),
            self.path.clone(),
            from_end,
            writer,
            self.cancel.child_token(),
        ));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(Box::new(reader))
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }
}

// ─── Follow task ─────────────────────────────────────────────────────

/// An open handle and how far into it we have read.
struct Tailed {
    file: File,
    offset: u64,
    id: u64,
}

impl Tailed {
    async fn open(path: &Path, from_end: bool) -> std::io::Result<Self> {
        let mut file = File::open(path).await?;
        let id = file_id(&file.metadata().await?);
        let offset = if from_end {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };
        Ok(Self { file, offset, id })
    }

    /// Copy everything up to the current end of file into the pipe.
    ///
    /// Returns `false` when the reading side of the pipe is gone.
    async fn drain(&mut self, buf: &mut [u8], pipe: &mut DuplexStream) -> std::io::Result<bool> {
        loop {
            let n = self.file.read(buf).await?;
            if n == 0 {
                return Ok(true);
            }
            if pipe.write_all(&buf[..n]).await.is_err() {
                return Ok(false);
            }
            self.offset += n as u64;
        }
    }
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> u64 {
    0
}

async fn follow(
    name: String,
    path: PathBuf,
    mut from_end: bool,
    mut pipe: DuplexStream,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut tailed: Option<Tailed> = None;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if tailed.is_none() {
            match Tailed::open(&path, from_end).await {
                Ok(opened) => {
                    tracing::debug!(source = %name, path = %path.display(), offset = opened.offset, "file opened");
                    tailed = Some(opened);
                    from_end = false;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // a file that appears later is read from its first byte
                    from_end = false;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(source = %name, path = %path.display(), error = %e, "failed to open file");
                    continue;
                }
            }
        }

        let Some(current) = tailed.as_mut() else {
            continue;
        };

        match current.drain(&mut buf, &mut pipe).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(source = %name, path = %path.display(), error = %e, "failed to read file");
                tailed = None;
                continue;
            }
        }

        match tokio::fs::metadata(&path).await {
            Ok(meta) if file_id(&meta) != current.id => {
                tracing::info!(source = %name, path = %path.display(), "file rotated, reopening");
                tailed = None;
            }
            Ok(meta) if meta.len() < current.offset => {
                tracing::info!(source = %name, path = %path.display(), "file truncated, rewinding");
                if current.file.seek(SeekFrom::Start(0)).await.is_err() {
                    tailed = None;
                } else {
                    current.offset = 0;
                }
            }
            Ok(_) => {}
            Err(_) => {
                tracing::debug!(source = %name, path = %path.display(), "file removed, waiting for it to reappear");
                tailed = None;
            }
        }
    }
}
