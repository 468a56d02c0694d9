// ubs-daemon: scheduled/random activity driver with a peer file receiver.

mod activities;
mod artifacts;
mod config;
mod driver;
mod lifecycle;
mod logging;
mod probe;
mod receiver;
mod registry;
mod sender;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use crate::config::ConfigSource;
use crate::lifecycle::Lifecycle;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Version,
    PrintConfig,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    config: Option<PathBuf>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Args> {
    let mut out = Args {
        command: Command::Run,
        config: None,
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => out.command = Command::Version,
            "--print-config" => {
                if out.command == Command::Run {
                    out.command = Command::PrintConfig;
                }
            }
            "--config" | "-c" => {
                let Some(path) = args.next() else {
                    bail!("{arg} needs a path");
                };
                out.config = Some(PathBuf::from(path));
            }
            other => match other.strip_prefix("--config=") {
                Some(path) => out.config = Some(PathBuf::from(path)),
                None => bail!("unknown argument: {other}"),
            },
        }
    }
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.command == Command::Version {
        println!("ubs-daemon {}", VERSION);
        return Ok(());
    }

    let (cfg, source) = config::load(args.config.as_deref());
    if args.command == Command::PrintConfig {
        if let ConfigSource::Rejected(e) = &source {
            eprintln!("warning: {e}; showing defaults");
        }
        print!("{}", cfg.to_toml()?);
        return Ok(());
    }

    logging::init_logger(&cfg.log).context("initializing logging")?;
    match &source {
        ConfigSource::Defaults => info!("no config file found; using defaults"),
        ConfigSource::File(path) => info!(path = %path.display(), "config loaded"),
        ConfigSource::Rejected(e) => warn!(error = %e, "config file ignored; using defaults"),
    }
    info!(
        version = VERSION,
        port = cfg.file_share_port,
        mode = if cfg.scheduled_tasks.enabled { "scheduled" } else { "random" },
        "ubs-daemon starting"
    );

    let cfg = Arc::new(cfg);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let lifecycle = Lifecycle::start(cfg).await?;
        let signal = shutdown_signal().await;
        if let Err(e) = &signal {
            warn!(error = %e, "signal handling failed; stopping");
        }
        info!("shutdown requested");
        lifecycle.shutdown().await;
        info!("ubs-daemon stopped");
        anyhow::Ok(())
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
