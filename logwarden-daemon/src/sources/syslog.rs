//! Syslog source -- receives syslog messages over UDP or TCP.
//!
//! The listener address comes from the monitor's `path`:
//! `udp:host:port`, `tcp:host:port`, or a bare `host:port` (UDP).
//! Datagrams and newline-framed TCP lines are written into an
//! in-process pipe, one line per message, which the monitor reads like
//! any other stream.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logwarden_core::error::SourceError;
use logwarden_core::pipeline::{LineReader, LineSource};

/// Capacity of the pipe between the listener and the monitor.
const PIPE_CAPACITY: usize = 256 * 1024;

/// Largest UDP datagram.
const MAX_DATAGRAM: usize = 65_536;

/// Longest TCP frame read before forcing a line break.
const MAX_TCP_FRAME: u64 = 64 * 1024;

/// Maximum concurrent TCP connections.
const MAX_CONNECTIONS: usize = 256;

/// Listener transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// One message per datagram
    Udp,
    /// Newline-framed stream
    Tcp,
}

/// Pipe shared by TCP connection tasks; one lock per line keeps lines whole.
type SharedPipe = Arc<tokio::sync::Mutex<DuplexStream>>;

/// A syslog listener.
pub struct SyslogSource {
    name: String,
    transport: Transport,
    address: String,
    local_addr: Mutex<Option<SocketAddr>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyslogSource {
    /// Parse the listener address and create the source. Nothing is bound yet.
    pub fn new(name: impl Into<String>, listen: &str) -> Result<Self, SourceError> {
        let name = name.into();
        let (transport, address) = parse_listen_address(listen).ok_or_else(|| SourceError::Open {
            name: name.clone(),
            reason: format!("invalid syslog listen address '{listen}', expected [udp:|tcp:]host:port"),
        })?;
        Ok(Self {
            name,
            transport,
            address,
            local_addr: Mutex::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Configured transport.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Address actually bound by the last `stream()` call.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bind_error(&self, e: std::io::Error) -> SourceError {
        SourceError::Open {
            name: self.name.clone(),
            reason: format!("failed to bind {:?} {}: {}", self.transport, self.address, e),
        }
    }
}

/// Split `[udp:|tcp:]host:port` into transport and socket address text.
fn parse_listen_address(listen: &str) -> Option<(Transport, String)> {
    let listen = listen.trim();
    let (transport, address) = if let Some(rest) = listen.strip_prefix("tcp:") {
        (Transport::Tcp, rest)
    } else if let Some(rest) = listen.strip_prefix("udp:") {
        (Transport::Udp, rest)
    } else {
        (Transport::Udp, listen)
    };

    let (host, port) = address.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    let bracketed = host.starts_with('[') && host.ends_with(']');
    if host.is_empty() || (host.contains(':') && !bracketed) {
        return None;
    }
    Some((transport, address.to_owned()))
}

impl LineSource for SyslogSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self) -> Result<LineReader, SourceError> {
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let cancel = self.cancel.child_token();

        let (bound, task) = match self.transport {
            Transport::Udp => {
                let socket = UdpSocket::bind(&self.address)
                    .await
                    .map_err(|e| self.bind_error(e))?;
                let bound = socket.local_addr().map_err(|e| self.bind_error(e))?;
                let task = tokio::spawn(receive_udp(self.name.clone(), socket, writer, cancel));
                (bound, task)
            }
            Transport::Tcp => {
                let listener = TcpListener::bind(&self.address)
                    .await
                    .map_err(|e| self.bind_error(e))?;
                let bound = listener.local_addr().map_err(|e| self.bind_error(e))?;
                let pipe = Arc::new(tokio::sync::Mutex::new(writer));
                let task = tokio::spawn(accept_tcp(self.name.clone(), listener, pipe, cancel));
                (bound, task)
            }
        };

        tracing::info!(source = %self.name, transport = ?self.transport, listen_addr = %bound, "syslog listener started");
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(bound);
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

// ─── Receive loops ───────────────────────────────────────────────────

async fn receive_udp(name: String, socket: UdpSocket, mut pipe: DuplexStream, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = socket.recv_from(&mut buf) => match result {
                Ok((n, _peer)) => n,
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "failed to receive syslog datagram");
                    return;
                }
            },
        };
        if n == 0 {
            continue;
        }

        let mut message = buf[..n].to_vec();
        if message.last() != Some(&b'\n') {
            message.push(b'\n');
        }
        if pipe.write_all(&message).await.is_err() {
            return;
        }
    }
}

async fn accept_tcp(name: String, listener: TcpListener, pipe: SharedPipe, cancel: CancellationToken) {
    let permits = Arc::new(Semaphore::new(MAX_CONNECTIONS));
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "failed to accept syslog connection");
                    continue;
                }
            },
        };

        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
            tracing::warn!(source = %name, peer = %peer, "max connections reached, rejecting syslog connection");
            continue;
        };

        tracing::debug!(source = %name, peer = %peer, "syslog connection accepted");
        let pipe = Arc::clone(&pipe);
        let cancel = cancel.clone();
        let name = name.clone();
        tokio::spawn(async move {
            read_tcp_lines(&name, stream, pipe, cancel).await;
            drop(permit);
        });
    }
}

async fn read_tcp_lines(name: &str, stream: TcpStream, pipe: SharedPipe, cancel: CancellationToken) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        let mut frame = (&mut reader).take(MAX_TCP_FRAME);
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = frame.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(source = %name, error = %e, "syslog connection read failed");
                return;
            }
        }

        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        if pipe.lock().await.write_all(&line).await.is_err() {
            return;
        }
    }
}
