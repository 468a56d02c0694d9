//! Running flag and worker lifecycle: start the receiver and one driver, stop them cooperatively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activities;
use crate::config::Config;
use crate::driver::{LocalClock, RandomDriver, ScheduledDriver};
use crate::receiver::FileReceiver;

/// Longest a worker sleeps without looking at the running flag.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long shutdown waits for each worker before moving on.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Owner side of the running flag. Only the lifecycle controller holds one.
#[derive(Debug)]
pub struct RunningFlag(Arc<AtomicBool>);

/// Read-only view of the running flag handed to workers.
#[derive(Debug, Clone)]
pub struct Running(Arc<AtomicBool>);

impl RunningFlag {
    pub fn raised() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn view(&self) -> Running {
        Running(self.0.clone())
    }

    /// Clear the flag. Returns false if it was already cleared.
    pub fn lower(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Running {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, waking every `POLL_INTERVAL` to check the flag.
    /// Returns whether the flag is still set.
    pub async fn pause(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if !self.is_set() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }
}

/// Owns the running flag and the worker handles.
pub struct Lifecycle {
    flag: RunningFlag,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Lifecycle {
    /// Bind the receiver and spawn it plus the driver chosen by `scheduled_tasks.enabled`.
    pub async fn start(config: Arc<Config>) -> anyhow::Result<Self> {
        let flag = RunningFlag::raised();
        let receiver = FileReceiver::bind(
            config.file_share_port,
            config.save_paths.received_files(),
            config.save_paths.transfer_logs(),
        )
        .await
        .with_context(|| format!("binding file receiver on port {}", config.file_share_port))?;

        let registry = Arc::new(activities::build_registry(config.clone(), flag.view()));
        let mut workers = Vec::with_capacity(2);
        workers.push(("receiver", tokio::spawn(receiver.run(flag.view()))));

        if config.scheduled_tasks.enabled {
            let driver = ScheduledDriver::new(
                config.active_hours,
                config.scheduled_tasks.tasks.clone(),
                registry,
                LocalClock,
                flag.view(),
            );
            workers.push(("scheduled driver", tokio::spawn(driver.run())));
        } else {
            let driver = RandomDriver::new(&config, registry, LocalClock, flag.view());
            workers.push(("random driver", tokio::spawn(driver.run())));
        }

        if config.active_hours.enabled {
            info!(
                start_hour = config.active_hours.start_hour,
                end_hour = config.active_hours.end_hour,
                "active hours enabled"
            );
        }
        Ok(Self { flag, workers })
    }

    /// Clear the flag and give each worker a short grace period to exit.
    /// Workers that overrun are abandoned.
    pub async fn shutdown(mut self) {
        if !self.flag.lower() {
            return;
        }
        info!("stopping workers");
        for (name, handle) in self.workers.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => debug!(worker = name, "worker stopped"),
                Ok(Err(e)) => warn!(worker = name, error = %e, "worker ended abnormally"),
                Err(_) => warn!(worker = name, "worker still busy after grace period; abandoning"),
            }
        }
    }
}
