//! Task registry: run activities by name, containing their failures.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// A unit of work dispatched by name.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// What `execute` observed. Drivers ignore it; it exists for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Panicked,
    Unknown,
}

struct Entry {
    name: String,
    activity: Arc<dyn Activity>,
    /// Whether the random driver may pick it.
    in_rotation: bool,
}

/// Fixed table of task name to activity, in registration order.
#[derive(Default)]
pub struct TaskRegistry {
    entries: Vec<Entry>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace `name`.
    pub fn register(&mut self, name: impl Into<String>, activity: Arc<dyn Activity>, in_rotation: bool) {
        let name = name.into();
        self.entries.retain(|e| e.name != name);
        self.entries.push(Entry {
            name,
            activity,
            in_rotation,
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Names the random driver chooses from.
    pub fn rotation(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.in_rotation)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Run `name` to completion. Unknown names are a no-op. Errors and panics inside
    /// the activity stop here; the caller always gets control back.
    pub async fn execute(&self, name: &str) -> Outcome {
        let Some(activity) = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.activity.clone())
        else {
            debug!(task = name, "no such task; ignoring");
            return Outcome::Unknown;
        };
        info!(task = name, "running activity");
        match tokio::spawn(async move { activity.run().await }).await {
            Ok(Ok(())) => {
                debug!(task = name, "activity finished");
                Outcome::Completed
            }
            Ok(Err(e)) => {
                warn!(task = name, error = format!("{e:#}"), "activity failed");
                Outcome::Failed
            }
            Err(e) => {
                warn!(task = name, error = %e, "activity panicked");
                Outcome::Panicked
            }
        }
    }
}
