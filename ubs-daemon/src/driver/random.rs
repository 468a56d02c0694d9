//! Random mode: a few sessions a day, each running randomly chosen activities.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};
use ubs_core::plan::{DAILY_SLEEP_HOURS, SESSION_BREAK_MINUTES};
use ubs_core::{ScheduleWindow, Span};

use super::{wait_for_active_hours, Clock};
use crate::config::Config;
use crate::lifecycle::{Running, POLL_INTERVAL};
use crate::registry::TaskRegistry;

pub struct RandomDriver<K> {
    window: ScheduleWindow,
    daily_sessions: u32,
    session_minutes: Span,
    task_wait_minutes: Span,
    registry: Arc<TaskRegistry>,
    rotation: Vec<String>,
    clock: K,
    running: Running,
    rng: StdRng,
}

impl<K: Clock> RandomDriver<K> {
    pub fn new(config: &Config, registry: Arc<TaskRegistry>, clock: K, running: Running) -> Self {
        let rotation = registry.rotation();
        Self {
            window: config.active_hours,
            daily_sessions: config.daily_sessions,
            session_minutes: config.session_duration_minutes,
            task_wait_minutes: config.task_wait_minutes,
            registry,
            rotation,
            clock,
            running,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub async fn run(mut self) {
        info!(
            sessions = self.daily_sessions,
            activities = ?self.rotation,
            "random driver started"
        );
        'days: while self.running.is_set() {
            for session in 1..=self.daily_sessions {
                if !wait_for_active_hours(&self.window, &self.clock, &self.running).await {
                    break 'days;
                }
                let minutes = self.session_minutes.pick(&mut self.rng);
                self.session(session, minutes).await;
                if !self.running.is_set() {
                    break 'days;
                }
                if session < self.daily_sessions {
                    let pause = SESSION_BREAK_MINUTES.pick(&mut self.rng);
                    info!(minutes = pause, "session break");
                    if !self.running.pause(Duration::from_secs(pause * 60)).await {
                        break 'days;
                    }
                }
            }
            let hours = DAILY_SLEEP_HOURS.pick(&mut self.rng);
            info!(hours, "daily sessions done; sleeping");
            if !self.running.pause(Duration::from_secs(hours * 3600)).await {
                break;
            }
        }
        info!("random driver stopped");
    }

    /// Run activities until `minutes` have passed, the flag clears or active hours end.
    async fn session(&mut self, index: u32, minutes: u64) {
        let length = TimeDelta::minutes(minutes.min(u64::from(u32::MAX)) as i64);
        let end = self.clock.now() + length;
        info!(session = index, of = self.daily_sessions, minutes, "session started");
        loop {
            let now = self.clock.now();
            if !self.running.is_set() || now >= end || !self.window.is_active_at(&now) {
                break;
            }
            let left = (end - now).to_std().unwrap_or_default();
            let Some(name) = self.rotation.choose(&mut self.rng).cloned() else {
                debug!("no activities in rotation; idling through the session");
                self.running.pause(left).await;
                break;
            };
            self.registry.execute(&name).await;

            let wait = Duration::from_secs(self.task_wait_minutes.pick(&mut self.rng) * 60);
            let left = (end - self.clock.now()).to_std().unwrap_or_default();
            if !self.running.pause(wait.min(left).max(POLL_INTERVAL)).await {
                break;
            }
        }
        info!(session = index, "session ended");
    }
}
