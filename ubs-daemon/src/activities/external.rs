//! External activity: run the command bound to a task name and wait for it.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::ExternalTask;
use crate::registry::Activity;

pub struct ExternalActivity {
    name: String,
    binding: Option<ExternalTask>,
}

impl ExternalActivity {
    pub fn new(name: impl Into<String>, binding: Option<ExternalTask>) -> Self {
        Self {
            name: name.into(),
            binding,
        }
    }
}

#[async_trait]
impl Activity for ExternalActivity {
    async fn run(&self) -> anyhow::Result<()> {
        let Some(task) = &self.binding else {
            bail!("no command bound to {}", self.name);
        };
        if !task.enabled {
            bail!("{} is disabled", self.name);
        }
        trace!(task = %self.name, command = %task.command, args = ?task.args, "spawning command");

        let mut cmd = Command::new(&task.command);
        cmd.args(&task.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", task.command))?;

        let limit = Duration::from_secs(task.timeout_secs);
        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.context("waiting for command")?,
            Err(_) => {
                debug!(task = %self.name, "command over its time limit; killing");
                let _ = child.kill().await;
                return Err(anyhow!("{} exceeded {}s", task.command, task.timeout_secs));
            }
        };
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(anyhow!("{} exited with code {code}", task.command)),
            None => Err(anyhow!("{} terminated by signal", task.command)),
        }
    }
}
