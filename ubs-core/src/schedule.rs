//! Scheduled mode: pick the next due task, check firing tolerance, remember fired occurrences.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// A task fires only if reached within this many seconds of its configured time.
pub const FIRE_TOLERANCE_SECS: i64 = 60;

/// One entry of the scheduled task list. Identity is structural; the position in the
/// list breaks ties between tasks due at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task: String,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_time() -> String {
    "00:00".to_string()
}

impl TaskDescriptor {
    pub fn new(task: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            time: time.into(),
            enabled: true,
        }
    }

    pub fn time_of_day(&self) -> Result<NaiveTime, TimeOfDayError> {
        parse_time_of_day(&self.time)
    }
}

/// Parse `"HH:MM"`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, TimeOfDayError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| TimeOfDayError(s.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day {0:?} (expected HH:MM)")]
pub struct TimeOfDayError(pub String);

/// The task chosen by `select_next`, with its concrete occurrence and how long until it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    /// Declaration index in the task list.
    pub index: usize,
    pub task: String,
    pub at: NaiveDateTime,
    pub wait: Duration,
}

/// Next occurrence of `time` at or after `now`: today if not yet passed, else tomorrow.
pub fn next_occurrence(time: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today >= now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Whether `now` is close enough to `occurrence` for the task to fire.
pub fn within_tolerance(occurrence: NaiveDateTime, now: NaiveDateTime) -> bool {
    (now - occurrence).num_seconds().abs() <= FIRE_TOLERANCE_SECS
}

/// Last fired occurrence per task index. Keeps a task from firing twice for the
/// same slot when the driver re-selects inside the tolerance window.
#[derive(Debug, Clone, Default)]
pub struct FiredLog {
    last: HashMap<usize, NaiveDateTime>,
}

impl FiredLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, index: usize, occurrence: NaiveDateTime) {
        self.last.insert(index, occurrence);
    }

    pub fn has_fired(&self, index: usize, occurrence: NaiveDateTime) -> bool {
        self.last.get(&index) == Some(&occurrence)
    }
}

/// An occurrence of `time` that has already passed but is still within the firing
/// tolerance and has not fired. Lets a task that lost a same-time tie run on the next pass.
fn pending_occurrence(
    index: usize,
    time: NaiveTime,
    now: NaiveDateTime,
    fired: &FiredLog,
) -> Option<NaiveDateTime> {
    let today = now.date().and_time(time);
    [today - TimeDelta::days(1), today]
        .into_iter()
        .find(|&at| at < now && within_tolerance(at, now) && !fired.has_fired(index, at))
}

/// Pick the enabled task with the smallest forward distance from `now`. An unfired
/// occurrence that passed less than `FIRE_TOLERANCE_SECS` ago counts as due now.
/// Ties go to the earlier declaration. Descriptors with an unparseable time are skipped.
pub fn select_next(
    tasks: &[TaskDescriptor],
    now: NaiveDateTime,
    fired: &FiredLog,
) -> Option<DueTask> {
    let mut best: Option<DueTask> = None;
    for (index, desc) in tasks.iter().enumerate() {
        if !desc.enabled {
            continue;
        }
        let Ok(time) = desc.time_of_day() else {
            continue;
        };
        let at = match pending_occurrence(index, time, now, fired) {
            Some(at) => at,
            None => {
                let mut at = next_occurrence(time, now);
                if fired.has_fired(index, at) {
                    at += TimeDelta::days(1);
                }
                at
            }
        };
        if best.as_ref().map_or(true, |b| at < b.at) {
            best = Some(DueTask {
                index,
                task: desc.task.clone(),
                at,
                wait: (at - now).to_std().unwrap_or_default(),
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parses_hh_mm() {
        assert_eq!(
            parse_time_of_day("09:05").unwrap(),
            NaiveTime::from_hms_opt(9, 5, 0).unwrap()
        );
        assert!(parse_time_of_day("9h05").is_err());
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn picks_nearest_upcoming() {
        let tasks = vec![
            TaskDescriptor::new("ping_target_ips", "14:00"),
            TaskDescriptor::new("create_text_files", "11:30"),
        ];
        let due = select_next(&tasks, at(10, 0, 0), &FiredLog::new()).unwrap();
        assert_eq!(due.task, "create_text_files");
        assert_eq!(due.wait, Duration::from_secs(90 * 60));
    }

    #[test]
    fn both_passed_wraps_to_next_day() {
        let tasks = vec![
            TaskDescriptor::new("a", "09:00"),
            TaskDescriptor::new("b", "09:05"),
        ];
        let due = select_next(&tasks, at(9, 10, 0), &FiredLog::new()).unwrap();
        assert_eq!(due.index, 0);
        assert_eq!(due.wait, Duration::from_secs((23 * 60 + 50) * 60));
    }

    #[test]
    fn equal_times_use_declaration_order() {
        let tasks = vec![
            TaskDescriptor::new("first", "10:00"),
            TaskDescriptor::new("second", "10:00"),
        ];
        let due = select_next(&tasks, at(8, 0, 0), &FiredLog::new()).unwrap();
        assert_eq!(due.task, "first");
        assert_eq!(due.index, 0);
    }

    #[test]
    fn skips_disabled_and_unparseable() {
        let mut off = TaskDescriptor::new("off", "08:01");
        off.enabled = false;
        let tasks = vec![
            off,
            TaskDescriptor::new("broken", "soon"),
            TaskDescriptor::new("on", "12:00"),
        ];
        let due = select_next(&tasks, at(8, 0, 0), &FiredLog::new()).unwrap();
        assert_eq!(due.task, "on");
    }

    #[test]
    fn nothing_enabled() {
        let mut t = TaskDescriptor::new("x", "10:00");
        t.enabled = false;
        assert!(select_next(&[t], at(8, 0, 0), &FiredLog::new()).is_none());
    }

    #[test]
    fn exact_time_is_due_now() {
        let tasks = vec![TaskDescriptor::new("x", "10:00")];
        let due = select_next(&tasks, at(10, 0, 0), &FiredLog::new()).unwrap();
        assert_eq!(due.wait, Duration::ZERO);
    }

    #[test]
    fn fired_occurrence_moves_to_next_day() {
        let tasks = vec![TaskDescriptor::new("x", "10:00")];
        let mut fired = FiredLog::new();
        // fired 40s early, re-selected 30s later while still before 10:00
        let first = select_next(&tasks, at(9, 59, 20), &fired).unwrap();
        fired.record(first.index, first.at);
        let again = select_next(&tasks, at(9, 59, 50), &fired).unwrap();
        assert_eq!(again.at, first.at + TimeDelta::days(1));
    }

    #[test]
    fn same_time_task_runs_after_the_first() {
        let tasks = vec![
            TaskDescriptor::new("first", "10:00"),
            TaskDescriptor::new("second", "10:00"),
        ];
        let mut fired = FiredLog::new();
        let due = select_next(&tasks, at(10, 0, 0), &fired).unwrap();
        assert_eq!(due.index, 0);
        fired.record(due.index, due.at);

        // re-selected after the recompute pause, still inside the tolerance
        let due = select_next(&tasks, at(10, 0, 30), &fired).unwrap();
        assert_eq!(due.task, "second");
        assert_eq!(due.at, at(10, 0, 0));
        assert_eq!(due.wait, Duration::ZERO);
        fired.record(due.index, due.at);

        let due = select_next(&tasks, at(10, 1, 0), &fired).unwrap();
        assert_eq!(due.at, at(10, 0, 0) + TimeDelta::days(1));
        assert_eq!(due.index, 0);
    }

    #[test]
    fn slot_just_before_midnight_still_pending() {
        let tasks = vec![TaskDescriptor::new("x", "23:59")];
        let now = at(23, 59, 0) + TimeDelta::seconds(FIRE_TOLERANCE_SECS);
        let due = select_next(&tasks, now, &FiredLog::new()).unwrap();
        assert_eq!(due.at, at(23, 59, 0));
        assert_eq!(due.wait, Duration::ZERO);
    }

    #[test]
    fn tolerance_window() {
        let slot = at(10, 0, 0);
        assert!(within_tolerance(slot, at(10, 0, 59)));
        assert!(within_tolerance(slot, at(9, 59, 0)));
        assert!(!within_tolerance(slot, at(10, 1, 1)));
        assert!(!within_tolerance(slot, at(9, 58, 59)));
    }

    #[test]
    fn descriptor_defaults() {
        let d: TaskDescriptor = toml::from_str(r#"task = "ping_target_ips""#).unwrap();
        assert_eq!(d.time, "00:00");
        assert!(!d.enabled);
    }
}
