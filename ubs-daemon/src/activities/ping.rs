//! Ping activity: ping a handful of targets and leave one log file per address.

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use ubs_core::plan::{sample_targets, PING_GAP_SECS};

use crate::artifacts;
use crate::config::Config;
use crate::lifecycle::Running;
use crate::probe::ping_command;
use crate::registry::Activity;

/// Addresses pinged per run when targets come from the range.
const RANGE_SAMPLE: usize = 10;
/// Bound on one `ping` process.
const PING_PROCESS_BOUND: Duration = Duration::from_secs(30);

pub struct PingActivity {
    config: Arc<Config>,
    running: Running,
}

impl PingActivity {
    pub fn new(config: Arc<Config>, running: Running) -> Self {
        Self { config, running }
    }

    fn targets(&self) -> Vec<Ipv4Addr> {
        let targets = self.config.ip_range.targets(&self.config.target_ips);
        if let ubs_core::Targets::Fallback(e, _) = &targets {
            warn!(error = %e, "ip range unusable; pinging configured targets");
        }
        if targets.from_range() {
            info!(addresses = targets.addrs().len(), "pinging a sample of the ip range");
            sample_targets(&mut rand::thread_rng(), targets.addrs(), RANGE_SAMPLE)
        } else {
            targets.into_addrs()
        }
    }

    async fn ping_one(&self, ip: Ipv4Addr) {
        let mut cmd = ping_command(ip, self.config.ping_count, false);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        let output = match tokio::time::timeout(PING_PROCESS_BOUND, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(target_ip = %ip, error = %e, "cannot run ping");
                return;
            }
            Err(_) => {
                warn!(target_ip = %ip, "ping did not finish in time");
                return;
            }
        };
        let success = output.status.success();
        info!(target_ip = %ip, success, "ping finished");
        let dir = self.config.save_paths.ping_logs();
        match artifacts::write_ping_log(&dir, ip, output.status.code(), &output.stdout, &output.stderr)
            .await
        {
            Ok(path) => debug!(path = %path.display(), "ping log written"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "cannot write ping log"),
        }
    }
}

#[async_trait]
impl Activity for PingActivity {
    async fn run(&self) -> anyhow::Result<()> {
        let targets = self.targets();
        if targets.is_empty() {
            info!("no targets to ping");
            return Ok(());
        }
        for ip in targets {
            if !self.running.is_set() {
                break;
            }
            self.ping_one(ip).await;
            let gap = PING_GAP_SECS.pick(&mut rand::thread_rng());
            if !self.running.pause(Duration::from_secs(gap)).await {
                break;
            }
        }
        Ok(())
    }
}
