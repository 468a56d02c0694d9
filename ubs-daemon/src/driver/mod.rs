//! Top-level drivers. Exactly one runs: scheduled when `scheduled_tasks.enabled`, random otherwise.

mod random;
mod scheduled;

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::debug;
use ubs_core::ScheduleWindow;

use crate::lifecycle::Running;

pub use random::RandomDriver;
pub use scheduled::ScheduledDriver;

/// How often the active-hours gate is re-evaluated while closed.
pub const ACTIVE_HOURS_RECHECK: Duration = Duration::from_secs(60);

/// Local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Block until the window admits `clock.now()`. Returns false if the flag cleared first.
pub async fn wait_for_active_hours<K: Clock>(window: &ScheduleWindow, clock: &K, running: &Running) -> bool {
    let mut logged = false;
    while running.is_set() {
        if window.is_active_at(&clock.now()) {
            return true;
        }
        if !logged {
            debug!(
                start_hour = window.start_hour,
                end_hour = window.end_hour,
                "outside active hours; waiting"
            );
            logged = true;
        }
        if !running.pause(ACTIVE_HOURS_RECHECK).await {
            break;
        }
    }
    false
}
