//! Reachability probing through the system `ping`.

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Hard bound on a probe process, on top of ping's own one-second wait.
const PROBE_PROCESS_BOUND: Duration = Duration::from_secs(5);

/// Answers "does this host respond right now". Advisory: firewalled hosts may say no.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, ip: Ipv4Addr) -> bool;
}

/// Single ICMP echo with a one-second reply timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProber;

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, ip: Ipv4Addr) -> bool {
        let mut cmd = ping_command(ip, 1, true);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(PROBE_PROCESS_BOUND, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(target_ip = %ip, error = %e, "ping could not be run");
                false
            }
            Err(_) => {
                debug!(target_ip = %ip, "ping timed out");
                false
            }
        }
    }
}

/// Build a platform `ping` invocation sending `count` echo requests.
/// With `one_second_wait`, each reply is waited for at most one second.
pub fn ping_command(ip: Ipv4Addr, count: u32, one_second_wait: bool) -> Command {
    let mut cmd = Command::new("ping");
    cmd.args(ping_args(ip, count, one_second_wait));
    cmd
}

fn ping_args(ip: Ipv4Addr, count: u32, one_second_wait: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(5);
    if cfg!(windows) {
        args.extend(["-n".to_string(), count.to_string()]);
        if one_second_wait {
            args.extend(["-w".to_string(), "1000".to_string()]);
        }
    } else {
        args.extend(["-c".to_string(), count.to_string()]);
        if one_second_wait {
            args.extend(["-W".to_string(), "1".to_string()]);
        }
    }
    args.push(ip.to_string());
    args
}
