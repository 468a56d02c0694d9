//! Scheduled mode: run configured tasks at their time of day.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use ubs_core::{select_next, within_tolerance, DueTask, FiredLog, ScheduleWindow, TaskDescriptor};

use super::{wait_for_active_hours, Clock};
use crate::lifecycle::Running;
use crate::registry::TaskRegistry;

/// Longest sleep before active hours are re-checked while waiting for a task.
const WAIT_INCREMENT: Duration = Duration::from_secs(60);
/// Pause after a fire, or when nothing is enabled, before selecting again.
const RECOMPUTE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Due,
    LeftActiveHours,
    Stopped,
}

pub struct ScheduledDriver<K> {
    window: ScheduleWindow,
    tasks: Vec<TaskDescriptor>,
    registry: Arc<TaskRegistry>,
    clock: K,
    running: Running,
    fired: FiredLog,
}

impl<K: Clock> ScheduledDriver<K> {
    pub fn new(
        window: ScheduleWindow,
        tasks: Vec<TaskDescriptor>,
        registry: Arc<TaskRegistry>,
        clock: K,
        running: Running,
    ) -> Self {
        Self {
            window,
            tasks,
            registry,
            clock,
            running,
            fired: FiredLog::new(),
        }
    }

    pub async fn run(mut self) {
        for desc in self.tasks.iter().filter(|d| d.enabled) {
            if let Err(e) = desc.time_of_day() {
                warn!(task = %desc.task, error = %e, "scheduled task ignored");
            } else if !self.registry.contains(&desc.task) {
                warn!(task = %desc.task, "scheduled task has no activity; it will do nothing");
            }
        }
        info!(
            tasks = self.tasks.iter().filter(|d| d.enabled).count(),
            "scheduled driver started"
        );

        while self.running.is_set() {
            if !wait_for_active_hours(&self.window, &self.clock, &self.running).await {
                break;
            }
            let Some(due) = select_next(&self.tasks, self.clock.now(), &self.fired) else {
                debug!("no enabled scheduled tasks");
                if !self.running.pause(RECOMPUTE_INTERVAL).await {
                    break;
                }
                continue;
            };
            info!(task = %due.task, at = %due.at, wait_secs = due.wait.as_secs(), "next scheduled task");

            match self.wait_until_due(&due).await {
                WaitOutcome::Stopped => break,
                WaitOutcome::LeftActiveHours => {
                    info!(task = %due.task, "left active hours; wait abandoned");
                    continue;
                }
                WaitOutcome::Due => self.fire(&due).await,
            }
            if !self.running.pause(RECOMPUTE_INTERVAL).await {
                break;
            }
        }
        info!("scheduled driver stopped");
    }

    /// Sleep until `due.at` in steps of at most `WAIT_INCREMENT`, checking the
    /// window after each step.
    async fn wait_until_due(&self, due: &DueTask) -> WaitOutcome {
        loop {
            let Ok(remaining) = (due.at - self.clock.now()).to_std() else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            if !self.running.pause(remaining.min(WAIT_INCREMENT)).await {
                return WaitOutcome::Stopped;
            }
            if !self.window.is_active_at(&self.clock.now()) {
                return WaitOutcome::LeftActiveHours;
            }
        }
        if self.running.is_set() {
            WaitOutcome::Due
        } else {
            WaitOutcome::Stopped
        }
    }

    async fn fire(&mut self, due: &DueTask) {
        let now = self.clock.now();
        if !within_tolerance(due.at, now) {
            warn!(task = %due.task, at = %due.at, %now, "missed the firing window; skipping");
            return;
        }
        self.fired.record(due.index, due.at);
        self.registry.execute(&due.task).await;
    }
}
