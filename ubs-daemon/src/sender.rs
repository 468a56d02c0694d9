//! File sender: probe, connect, send `name|size` then the file, retry transient failures.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};
use ubs_core::plan::SEND_BACKOFF_SECS;
use ubs_core::wire::{encode_header, HeaderError, TransferHeader, CHUNK_SIZE};

use crate::probe::Prober;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after the header so it does not share a segment with the payload.
const HEADER_SETTLE: Duration = Duration::from_millis(100);

/// Opens the byte stream to a peer.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncWrite + Unpin + Send;
    async fn connect(&self, addr: SocketAddr) -> io::Result<Self::Stream>;
}

/// TCP with a bounded connect; an expired bound surfaces as `ErrorKind::TimedOut`.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    pub timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        bounded_connect(self.timeout, TcpStream::connect(addr)).await
    }
}

async fn bounded_connect<S, F>(limit: Duration, connect: F) -> io::Result<S>
where
    F: std::future::Future<Output = io::Result<S>>,
{
    match tokio::time::timeout(limit, connect).await {
        Ok(r) => r,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
    }
}

/// Wait between two attempts.
#[async_trait]
pub trait Backoff: Send + Sync {
    /// Called after failed attempt number `attempt` (1-based) when another follows.
    async fn wait(&self, attempt: u32);
}

/// Uniform random 2–5 s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBackoff;

#[async_trait]
impl Backoff for RandomBackoff {
    async fn wait(&self, _attempt: u32) {
        let secs = SEND_BACKOFF_SECS.pick(&mut rand::thread_rng());
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

/// Why one attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("{0} did not answer the reachability probe")]
    Unreachable(Ipv4Addr),
    #[error("connection timed out")]
    Timeout,
    #[error("connection refused")]
    Refused,
    #[error("no route to host: {0}")]
    NoRoute(io::Error),
    #[error("cannot read local file: {0}")]
    File(io::Error),
    #[error("cannot build header: {0}")]
    Header(#[from] HeaderError),
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl SendError {
    fn from_connect(e: io::Error) -> Self {
        if is_no_route(&e) {
            return SendError::NoRoute(e);
        }
        match e.kind() {
            io::ErrorKind::TimedOut => SendError::Timeout,
            io::ErrorKind::ConnectionRefused => SendError::Refused,
            _ => SendError::Io(e),
        }
    }

    /// Failures where another attempt cannot help.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SendError::Unreachable(_)
                | SendError::NoRoute(_)
                | SendError::File(_)
                | SendError::Header(_)
        )
    }
}

fn is_no_route(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::ENETUNREACH) | Some(libc::EHOSTUNREACH)
        )
    }
    #[cfg(windows)]
    {
        // WSAENETUNREACH, WSAEHOSTUNREACH
        matches!(e.raw_os_error(), Some(10051) | Some(10065))
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

/// Sends one file per connection to peers listening on `port`.
pub struct FileSender<P, C, B> {
    prober: P,
    connector: C,
    backoff: B,
    port: u16,
}

impl FileSender<crate::probe::PingProber, TcpConnector, RandomBackoff> {
    pub fn tcp(port: u16) -> Self {
        Self::new(
            crate::probe::PingProber,
            TcpConnector::default(),
            RandomBackoff,
            port,
        )
    }
}

impl<P: Prober, C: Connector, B: Backoff> FileSender<P, C, B> {
    pub fn new(prober: P, connector: C, backoff: B, port: u16) -> Self {
        Self {
            prober,
            connector,
            backoff,
            port,
        }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    #[cfg(test)]
    pub(crate) fn connector(&self) -> &C {
        &self.connector
    }

    /// Send `path` to `ip`, trying at most `max_retries` times. Returns whether a
    /// full send completed. Unreachable targets and routing failures are not retried.
    pub async fn send(&self, ip: Ipv4Addr, path: &Path, max_retries: u32) -> bool {
        let attempts = max_retries.max(1);
        for attempt in 1..=attempts {
            match self.attempt(ip, path).await {
                Ok(bytes) => {
                    info!(target_ip = %ip, file = %path.display(), bytes, attempt, "file sent");
                    return true;
                }
                Err(e) if e.is_structural() => {
                    warn!(target_ip = %ip, file = %path.display(), attempt, error = %e, "send abandoned");
                    return false;
                }
                Err(e) => {
                    warn!(target_ip = %ip, attempt, max_attempts = attempts, error = %e, "send attempt failed");
                }
            }
            if attempt < attempts {
                self.backoff.wait(attempt).await;
            }
        }
        false
    }

    async fn attempt(&self, ip: Ipv4Addr, path: &Path) -> Result<u64, SendError> {
        if !self.prober.probe(ip).await {
            return Err(SendError::Unreachable(ip));
        }
        let mut stream = self
            .connector
            .connect(SocketAddr::from((ip, self.port)))
            .await
            .map_err(SendError::from_connect)?;

        let mut file = tokio::fs::File::open(path).await.map_err(SendError::File)?;
        let size = file.metadata().await.map_err(SendError::File)?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let header = encode_header(&TransferHeader::new(filename, size)?)?;

        stream.write_all(&header).await.map_err(SendError::Io)?;
        stream.flush().await.map_err(SendError::Io)?;
        tokio::time::sleep(HEADER_SETTLE).await;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        while sent < size {
            let want = (size - sent).min(CHUNK_SIZE as u64) as usize;
            let n = file.read(&mut buf[..want]).await.map_err(SendError::File)?;
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).await.map_err(SendError::Io)?;
            sent += n as u64;
        }
        stream.flush().await.map_err(SendError::Io)?;
        let _ = stream.shutdown().await;
        Ok(sent)
    }
}
