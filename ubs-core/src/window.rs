//! Active hours: the daily wall-clock window outside of which nothing runs.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Daily window `[start_hour, end_hour)`. When `start_hour > end_hour` the window
/// wraps past midnight. A disabled window is always active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleWindow {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 0,
            end_hour: 23,
        }
    }
}

impl ScheduleWindow {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            enabled: true,
            start_hour,
            end_hour,
        }
    }

    /// Whether `hour` (0..=23) falls inside the window.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if !self.enabled {
            return true;
        }
        let start = u32::from(self.start_hour);
        let end = u32::from(self.end_hour);
        if start <= end {
            start <= hour && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Evaluate against a wall-clock time. Never cached; callers pass a fresh `now`.
    pub fn is_active_at<T: Timelike>(&self, now: &T) -> bool {
        self.contains_hour(now.hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn disabled_is_always_active() {
        let w = ScheduleWindow {
            enabled: false,
            start_hour: 9,
            end_hour: 10,
        };
        assert!((0..24).all(|h| w.contains_hour(h)));
    }

    #[test]
    fn daytime_window() {
        let w = ScheduleWindow::new(9, 17);
        assert!(!w.contains_hour(8));
        assert!(w.contains_hour(9));
        assert!(w.contains_hour(16));
        assert!(!w.contains_hour(17));
    }

    #[test]
    fn overnight_window_wraps() {
        let w = ScheduleWindow::new(22, 6);
        assert!(w.contains_hour(23));
        assert!(w.contains_hour(0));
        assert!(w.contains_hour(5));
        assert!(!w.contains_hour(6));
        assert!(!w.contains_hour(10));
    }

    #[test]
    fn agrees_with_hour_arithmetic() {
        for start in 0u8..24 {
            for end in 0u8..24 {
                let w = ScheduleWindow::new(start, end);
                for hour in 0u32..24 {
                    // hours elapsed since start, modulo a day, against the window length
                    let len = (u32::from(end) + 24 - u32::from(start)) % 24;
                    let offset = (hour + 24 - u32::from(start)) % 24;
                    assert_eq!(w.contains_hour(hour), offset < len, "{start}-{end} at {hour}");
                }
            }
        }
    }

    #[test]
    fn evaluates_wall_clock() {
        let w = ScheduleWindow::new(22, 6);
        let late = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        let morning = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(w.is_active_at(&late));
        assert!(!w.is_active_at(&morning));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let w: ScheduleWindow = toml::from_str("enabled = true").unwrap();
        assert_eq!(w.start_hour, 0);
        assert_eq!(w.end_hour, 23);
        assert!(!w.contains_hour(23));
    }
}
