//! File receiver: accept one file per connection on the share port and store it.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use ubs_core::wire::{decode_header, HeaderError, CHUNK_SIZE, HEADER_BUF_LEN};
use uuid::Uuid;

use crate::artifacts::{self, Direction, TransferRecord};
use crate::lifecycle::Running;

/// Accept wait; bounds how long a stop request goes unnoticed.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);
/// Per-read bound inside one connection.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("malformed header: {0}")]
    Header(#[from] HeaderError),
    #[error("connection closed before a header arrived")]
    EmptyHeader,
    #[error("peer went silent for {}s", READ_TIMEOUT.as_secs())]
    Timeout,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of one connection that got past the header.
#[derive(Debug, Clone)]
pub struct Received {
    pub filename: String,
    pub path: PathBuf,
    pub expected: u64,
    pub received: u64,
    pub sha256: [u8; 32],
}

impl Received {
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

/// Read one header and its payload from `stream` into `dir/<filename>`.
/// An early close leaves the partial file in place.
pub async fn receive_file<S>(stream: &mut S, dir: &Path) -> Result<Received, ReceiveError>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_BUF_LEN];
    let n = read_bounded(stream, &mut head).await?;
    if n == 0 {
        return Err(ReceiveError::EmptyHeader);
    }
    let (header, consumed) = decode_header(&head[..n])?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(&header.filename);
    let mut file = tokio::fs::File::create(&path).await?;
    let mut hasher = Sha256::new();
    let mut received = 0u64;

    // payload bytes that arrived together with the header
    let early = &head[consumed..n];
    let early = &early[..early.len().min(usize::try_from(header.size).unwrap_or(usize::MAX))];
    if !early.is_empty() {
        file.write_all(early).await?;
        hasher.update(early);
        received += early.len() as u64;
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    while received < header.size {
        let want = (header.size - received).min(CHUNK_SIZE as u64) as usize;
        let n = read_bounded(stream, &mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        hasher.update(&buf[..n]);
        received += n as u64;
    }
    file.flush().await?;

    Ok(Received {
        filename: header.filename,
        path,
        expected: header.size,
        received,
        sha256: hasher.finalize().into(),
    })
}

async fn read_bounded<S>(stream: &mut S, buf: &mut [u8]) -> Result<usize, ReceiveError>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(READ_TIMEOUT, stream.read(buf)).await {
        Ok(r) => Ok(r?),
        Err(_) => Err(ReceiveError::Timeout),
    }
}

/// Listening side of the exchange. Connections are served one at a time.
pub struct FileReceiver {
    listener: TcpListener,
    received_dir: PathBuf,
    log_dir: PathBuf,
}

impl FileReceiver {
    /// Bind `0.0.0.0:port`.
    pub async fn bind(port: u16, received_dir: PathBuf, log_dir: PathBuf) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self::from_listener(listener, received_dir, log_dir))
    }

    pub fn from_listener(listener: TcpListener, received_dir: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            listener,
            received_dir,
            log_dir,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Exits within `ACCEPT_TIMEOUT` of the flag clearing; a failing
    /// connection is logged and dropped without affecting the loop.
    pub async fn run(self, running: Running) {
        match self.local_addr() {
            Ok(addr) => info!(%addr, dir = %self.received_dir.display(), "file receiver listening"),
            Err(_) => info!("file receiver listening"),
        }
        while running.is_set() {
            let (mut stream, peer) =
                match tokio::time::timeout(ACCEPT_TIMEOUT, self.listener.accept()).await {
                    Err(_) => continue,
                    Ok(Err(e)) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                    Ok(Ok(conn)) => conn,
                };
            debug!(%peer, "connection accepted");
            match receive_file(&mut stream, &self.received_dir).await {
                Ok(r) => self.record(peer, r).await,
                Err(e) => warn!(%peer, error = %e, "dropping connection"),
            }
        }
        info!("file receiver stopped");
    }

    async fn record(&self, peer: SocketAddr, r: Received) {
        let outcome = if r.is_complete() {
            info!(%peer, file = %r.filename, path = %r.path.display(), bytes = r.received, "file received");
            "complete"
        } else {
            warn!(
                %peer,
                path = %r.path.display(),
                expected = r.expected,
                received = r.received,
                "transfer ended early; keeping partial file"
            );
            "truncated"
        };
        let record = TransferRecord {
            id: Uuid::new_v4(),
            direction: Direction::Received,
            peer: peer.to_string(),
            filename: r.filename,
            expected: r.expected,
            transferred: r.received,
            outcome: outcome.to_string(),
            sha256: Some(r.sha256),
        };
        if let Err(e) = artifacts::write_transfer_log(&self.log_dir, &record).await {
            warn!(error = %e, "cannot write transfer log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunningFlag;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn stores_exact_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"a.txt|13").await.unwrap();
        client.write_all(b"hello, world!").await.unwrap();
        drop(client);
        let r = receive_file(&mut server, dir.path()).await.unwrap();
        assert!(r.is_complete());
        assert_eq!(r.path, dir.path().join("a.txt"));
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello, world!");
    }

    #[tokio::test]
    async fn stops_at_announced_size() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"b.txt|3abcdef").await.unwrap();
        drop(client);
        let r = receive_file(&mut server, dir.path()).await.unwrap();
        assert_eq!(r.received, 3);
        assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn early_close_keeps_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"c.txt|100").await.unwrap();
        client.write_all(b"only this").await.unwrap();
        drop(client);
        let r = receive_file(&mut server, dir.path()).await.unwrap();
        assert!(!r.is_complete());
        assert_eq!(r.received, 9);
        assert_eq!(std::fs::read(dir.path().join("c.txt")).unwrap(), b"only this");
    }

    #[tokio::test]
    async fn malformed_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(b"no delimiter here").await.unwrap();
        drop(client);
        let err = receive_file(&mut server, dir.path()).await.unwrap_err();
        assert!(matches!(err, ReceiveError::Header(HeaderError::MissingDelimiter)));
    }

    #[tokio::test]
    async fn empty_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (client, mut server) = tokio::io::duplex(16);
        drop(client);
        assert!(matches!(
            receive_file(&mut server, dir.path()).await,
            Err(ReceiveError::EmptyHeader)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mut server) = tokio::io::duplex(4096);
        let start = tokio::time::Instant::now();
        let err = receive_file(&mut server, dir.path()).await.unwrap_err();
        assert!(matches!(err, ReceiveError::Timeout));
        assert_eq!(start.elapsed(), READ_TIMEOUT);

        // stalls after the header as well
        client.write_all(b"d.txt|10abc").await.unwrap();
        let err = receive_file(&mut server, dir.path()).await.unwrap_err();
        assert!(matches!(err, ReceiveError::Timeout));
        drop(client);
    }

    async fn wait_for_file(path: &Path, len: u64) -> bool {
        for _ in 0..100 {
            if std::fs::metadata(path).map(|m| m.len() == len).unwrap_or(false) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn serves_after_bad_connection_and_stops_on_flag() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let receiver = FileReceiver::from_listener(
            listener,
            dir.path().join("received"),
            dir.path().join("logs"),
        );
        let addr = receiver.local_addr().unwrap();
        let flag = RunningFlag::raised();
        let worker = tokio::spawn(receiver.run(flag.view()));

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(b"garbage without delimiter").await.unwrap();
        drop(bad);

        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(b"a.txt|13").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        good.write_all(b"hello, world!").await.unwrap();
        drop(good);

        let stored = dir.path().join("received").join("a.txt");
        assert!(wait_for_file(&stored, 13).await);
        assert_eq!(std::fs::read(&stored).unwrap(), b"hello, world!");

        flag.lower();
        let stopped = tokio::time::timeout(ACCEPT_TIMEOUT * 2, worker).await;
        assert!(stopped.is_ok(), "receiver did not stop within the accept timeout");
        let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs")).unwrap().collect();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn loopback_round_trip_with_long_name() {
        use crate::sender::tests::{CountingBackoff, ScriptedProber};
        use crate::sender::{FileSender, TcpConnector};
        use std::net::Ipv4Addr;

        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let receiver = FileReceiver::from_listener(
            listener,
            dir.path().join("received"),
            dir.path().join("logs"),
        );
        let port = receiver.local_addr().unwrap().port();
        let flag = RunningFlag::raised();
        let worker = tokio::spawn(receiver.run(flag.view()));

        let name = format!("{}.txt", "n".repeat(236));
        let body: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        let outbox = dir.path().join("outbox");
        std::fs::create_dir_all(&outbox).unwrap();
        std::fs::write(outbox.join(&name), &body).unwrap();

        let loopback = Ipv4Addr::LOCALHOST;
        let sender = FileSender::new(
            ScriptedProber::all_up(&[loopback]),
            TcpConnector::default(),
            CountingBackoff::default(),
            port,
        );
        assert!(sender.send(loopback, &outbox.join(&name), 1).await);

        let stored = dir.path().join("received").join(&name);
        assert!(wait_for_file(&stored, body.len() as u64).await);
        assert_eq!(std::fs::read(&stored).unwrap(), body);

        let logs = dir.path().join("logs");
        let mut text = String::new();
        for _ in 0..100 {
            let entry = std::fs::read_dir(&logs).ok().and_then(|mut d| d.next());
            if let Some(Ok(entry)) = entry {
                text = std::fs::read_to_string(entry.path()).unwrap_or_default();
                if text.contains("SHA-256") {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(text.contains(&format!("File: {name}")));
        assert!(text.contains("Outcome: complete"));
        let digest = crate::artifacts::hex(&Sha256::digest(&body));
        assert!(text.contains(&format!("SHA-256: {digest}")));

        flag.lower();
        tokio::time::timeout(ACCEPT_TIMEOUT * 2, worker)
            .await
            .unwrap()
            .unwrap();
    }
}
