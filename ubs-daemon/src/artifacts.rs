//! Plain-text log files left behind for human inspection: one per ping, one per transfer.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

/// Timestamp used in artifact file names.
pub fn stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Direction of a transfer as seen from this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// One finished (or abandoned) transfer.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: Uuid,
    pub direction: Direction,
    pub peer: String,
    pub filename: String,
    pub expected: u64,
    pub transferred: u64,
    pub outcome: String,
    pub sha256: Option<[u8; 32]>,
}

impl TransferRecord {
    fn render(&self) -> String {
        let mut out = String::new();
        let direction = match self.direction {
            Direction::Sent => "sent",
            Direction::Received => "received",
        };
        let _ = writeln!(out, "Transfer {}", self.id);
        let _ = writeln!(out, "Time: {}", Local::now().to_rfc3339());
        let _ = writeln!(out, "Direction: {direction}");
        let _ = writeln!(out, "Peer: {}", self.peer);
        let _ = writeln!(out, "File: {}", self.filename);
        let _ = writeln!(out, "Bytes: {}/{}", self.transferred, self.expected);
        let _ = writeln!(out, "Outcome: {}", self.outcome);
        if let Some(digest) = &self.sha256 {
            let _ = writeln!(out, "SHA-256: {}", hex(digest));
        }
        out
    }
}

/// Longest part of a transferred file's name carried into its log file name, in characters.
const LOG_NAME_CHARS: usize = 100;

/// Write `transfer_<file>_<stamp>_<id>.txt` into `dir`. Long file names are cut to
/// `LOG_NAME_CHARS` so the log name stays within file system limits; the log body
/// keeps the full name.
pub async fn write_transfer_log(dir: &Path, record: &TransferRecord) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "transfer_{}_{}_{}.txt",
        truncate_chars(&record.filename, LOG_NAME_CHARS),
        stamp(),
        &record.id.simple().to_string()[..8]
    ));
    tokio::fs::write(&path, record.render()).await?;
    Ok(path)
}

/// Write `ping_<ip>_<stamp>.txt` with the exit code and captured output of one ping run.
pub async fn write_ping_log(
    dir: &Path,
    ip: Ipv4Addr,
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("ping_{ip}_{}.txt", stamp()));
    let mut out = String::new();
    let _ = writeln!(out, "Ping results for {ip}:");
    match code {
        Some(c) => {
            let _ = writeln!(out, "Return code: {c}");
        }
        None => {
            let _ = writeln!(out, "Return code: none (terminated)");
        }
    }
    out.push_str("STDOUT:\n");
    out.push_str(&String::from_utf8_lossy(stdout));
    if !stderr.is_empty() {
        out.push_str("\nSTDERR:\n");
        out.push_str(&String::from_utf8_lossy(stderr));
    }
    tokio::fs::write(&path, out).await?;
    Ok(path)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
