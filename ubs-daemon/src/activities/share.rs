//! File-share activity: send one local text document to a few peers.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use ubs_core::plan::{fallback_targets, sample_targets, TARGET_GAP_SECS};
use ubs_core::wire::CHUNK_SIZE;
use ubs_core::{SharePolicy, Targets};
use uuid::Uuid;

use crate::artifacts::{self, Direction, TransferRecord};
use crate::config::{desktop_dir, Config};
use crate::lifecycle::Running;
use crate::probe::Prober;
use crate::registry::Activity;
use crate::sender::{Backoff, Connector, FileSender, DEFAULT_MAX_RETRIES};

pub struct ShareActivity<P, C, B> {
    config: Arc<Config>,
    sender: FileSender<P, C, B>,
    running: Running,
    policy: SharePolicy,
    /// Directories searched for `.txt` files to share.
    search_dirs: Vec<PathBuf>,
}

impl<P: Prober, C: Connector, B: Backoff> ShareActivity<P, C, B> {
    pub fn new(config: Arc<Config>, sender: FileSender<P, C, B>, running: Running) -> Self {
        let search_dirs = vec![config.save_paths.text_files(), desktop_dir()];
        Self {
            config,
            sender,
            running,
            policy: SharePolicy::default(),
            search_dirs,
        }
    }

    #[cfg(test)]
    fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Candidate peers. From an enabled range only addresses answering a probe
    /// qualify; if none answer, the configured targets are used.
    async fn candidates(&self) -> Vec<Ipv4Addr> {
        let targets = self.config.ip_range.targets(&self.config.target_ips);
        let range = match targets {
            Targets::Range(range) => range,
            Targets::Configured(v) => return v,
            Targets::Fallback(e, v) => {
                warn!(error = %e, "ip range unusable; sharing with configured targets");
                return v;
            }
        };
        let sample = sample_targets(&mut rand::thread_rng(), &range, self.policy.probe_sample);
        debug!(range = range.len(), probing = sample.len(), "checking which range addresses respond");
        let mut available = Vec::new();
        for ip in sample {
            if self.sender.prober().probe(ip).await {
                available.push(ip);
            }
        }
        if available.is_empty() {
            info!("no range address responded; using configured targets");
            self.config.target_ips.clone()
        } else {
            info!(available = available.len(), "found responding addresses");
            available
        }
    }

    async fn pick_file(&self) -> Option<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.search_dirs {
            let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let is_file = entry.file_type().await.map_or(false, |t| t.is_file());
                if is_file && path.extension().map_or(false, |e| e == "txt") {
                    files.push(path);
                }
            }
        }
        files.choose(&mut rand::thread_rng()).cloned()
    }

    /// Send to one peer and leave a transfer log either way.
    async fn send_to(&self, ip: Ipv4Addr, file: &Path, size: u64, digest: [u8; 32]) -> bool {
        let ok = self.sender.send(ip, file, DEFAULT_MAX_RETRIES).await;
        let record = TransferRecord {
            id: Uuid::new_v4(),
            direction: Direction::Sent,
            peer: SocketAddr::from((ip, self.config.file_share_port)).to_string(),
            filename: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            expected: size,
            transferred: if ok { size } else { 0 },
            outcome: if ok { "complete" } else { "failed" }.to_string(),
            sha256: Some(digest),
        };
        if let Err(e) = artifacts::write_transfer_log(&self.config.save_paths.transfer_logs(), &record).await {
            warn!(error = %e, "cannot write transfer log");
        }
        ok
    }
}

/// Size and SHA-256 of the file at `path`, read in `CHUNK_SIZE` pieces.
async fn digest_file(path: &Path) -> std::io::Result<(u64, [u8; 32])> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize().into()))
}

#[async_trait]
impl<P: Prober, C: Connector, B: Backoff> Activity for ShareActivity<P, C, B> {
    async fn run(&self) -> anyhow::Result<()> {
        let candidates = self.candidates().await;
        let Some(file) = self.pick_file().await else {
            info!("no text files available to share");
            return Ok(());
        };
        let (size, digest) = digest_file(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        info!(file = %file.display(), candidates = candidates.len(), "sharing file");

        let selected = sample_targets(&mut rand::thread_rng(), &candidates, self.policy.max_targets);
        let mut successes = 0;
        for ip in &selected {
            if !self.running.is_set() {
                return Ok(());
            }
            if self.send_to(*ip, &file, size, digest).await {
                successes += 1;
                if successes >= self.policy.enough {
                    break;
                }
            }
            let gap = TARGET_GAP_SECS.pick(&mut rand::thread_rng());
            if !self.running.pause(Duration::from_secs(gap)).await {
                return Ok(());
            }
        }

        if successes == 0 {
            let fallback = fallback_targets(&self.config.target_ips, &selected, self.policy.fallback_targets);
            if !fallback.is_empty() {
                warn!(tried = selected.len(), "sharing failed to every target; trying fallbacks");
            }
            for ip in fallback {
                if !self.running.is_set() {
                    break;
                }
                if self.send_to(ip, &file, size, digest).await {
                    successes += 1;
                    break;
                }
            }
        }
        info!(successes, "file sharing finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunningFlag;
    use crate::sender::tests::{timed_out, CountingBackoff, ScriptedConnector, ScriptedProber};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    type Mocked = ShareActivity<ScriptedProber, ScriptedConnector, CountingBackoff>;

    fn ip(d: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, d)
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let docs = dir.path().join("docs");
            std::fs::create_dir_all(&docs).unwrap();
            std::fs::write(docs.join("note.txt"), b"shared text").unwrap();
            std::fs::write(docs.join("image.png"), b"not shared").unwrap();
            let mut config = Config::default();
            config.save_paths.text_files = Some(docs);
            config.save_paths.transfer_logs = Some(dir.path().join("logs"));
            Self { dir, config }
        }

        fn activity(
            &self,
            flag: &RunningFlag,
            prober: ScriptedProber,
            connector: ScriptedConnector,
        ) -> Mocked {
            let sender = FileSender::new(prober, connector, CountingBackoff::default(), 8888);
            ShareActivity::new(Arc::new(self.config.clone()), sender, flag.view())
                .with_search_dirs(vec![self.dir.path().join("docs")])
        }

        fn logs(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("logs"))
                .map(|d| d.count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn digest_matches_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, &body).unwrap();
        let (size, digest) = digest_file(&path).await.unwrap();
        assert_eq!(size, body.len() as u64);
        assert_eq!(digest, <[u8; 32]>::from(Sha256::digest(&body)));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_two_successes() {
        let mut fx = Fixture::new();
        fx.config.target_ips = (1..=6).map(ip).collect();
        let flag = RunningFlag::raised();
        let all: Vec<_> = fx.config.target_ips.clone();
        let activity = fx.activity(
            &flag,
            ScriptedProber::all_up(&all),
            ScriptedConnector::new(&all, timed_out),
        );
        activity.run().await.unwrap();
        assert_eq!(activity.sender.connector().attempts().len(), 2);
        assert_eq!(fx.logs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_untried_targets() {
        let mut fx = Fixture::new();
        fx.config.target_ips = (1..=6).map(ip).collect();
        let flag = RunningFlag::raised();
        let all: Vec<_> = fx.config.target_ips.clone();
        let activity = fx.activity(
            &flag,
            ScriptedProber::all_up(&all),
            ScriptedConnector::new(&[], timed_out),
        );
        activity.run().await.unwrap();
        let attempts = activity.sender.connector().attempts();
        // five sampled targets plus the one left over, three tries each
        assert_eq!(attempts.len(), 18);
        assert_eq!(attempts.iter().collect::<HashSet<_>>().len(), 6);
        assert_eq!(fx.logs(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn range_uses_responding_addresses() {
        let mut fx = Fixture::new();
        fx.config.ip_range.enabled = true;
        fx.config.ip_range.start_ip = ip(1);
        fx.config.ip_range.end_ip = ip(10);
        let flag = RunningFlag::raised();
        let activity = fx.activity(
            &flag,
            ScriptedProber::all_up(&[ip(3)]),
            ScriptedConnector::new(&[ip(3)], timed_out),
        );
        activity.run().await.unwrap();
        assert_eq!(activity.sender.connector().attempts(), vec![ip(3)]);
        // ten range probes plus the one before connecting
        assert_eq!(activity.sender.prober().calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_range_falls_back_to_configured() {
        let mut fx = Fixture::new();
        fx.config.ip_range.enabled = true;
        fx.config.ip_range.start_ip = ip(1);
        fx.config.ip_range.end_ip = ip(10);
        let configured = Ipv4Addr::new(192, 168, 1, 100);
        fx.config.target_ips = vec![configured];
        let flag = RunningFlag::raised();
        let activity = fx.activity(
            &flag,
            ScriptedProber::all_up(&[configured]),
            ScriptedConnector::new(&[configured], timed_out),
        );
        activity.run().await.unwrap();
        assert_eq!(activity.sender.connector().attempts(), vec![configured]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_share() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.dir.path().join("docs").join("note.txt")).unwrap();
        let flag = RunningFlag::raised();
        let activity = fx.activity(
            &flag,
            ScriptedProber::all_up(&fx.config.target_ips),
            ScriptedConnector::new(&fx.config.target_ips, timed_out),
        );
        activity.run().await.unwrap();
        assert!(activity.sender.connector().attempts().is_empty());
        assert_eq!(fx.logs(), 0);
    }
}
