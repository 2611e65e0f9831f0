//! Schedules for the rollup runner: daily at a fixed UTC time, or a fixed interval.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::parse_time_of_day;
use crate::error::{AnalyticsError, Result};

/// Run once per day at `at` (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// Parse "HH:MM" or "HH:MM:SS".
    pub fn parse(value: &str) -> Result<Self> {
        parse_time_of_day(value).map(Self::new).ok_or_else(|| {
            AnalyticsError::invalid_config(format!(
                "rollup.daily_at must be HH:MM or HH:MM:SS, got {:?}",
                value
            ))
        })
    }

    /// The first run time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = Utc.from_utc_datetime(&now.date_naive().and_time(self.at));
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::new(NaiveTime::MIN)
    }
}

/// Schedule specification for the rollup runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleSpec {
    /// Run once a day at a fixed time
    Daily(DailySchedule),
    /// Run at fixed intervals, first run one interval after start
    Interval(Duration),
}

impl ScheduleSpec {
    /// The next run time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily(daily) => daily.next_after(now),
            Self::Interval(interval) => {
                let step = ChronoDuration::from_std(*interval)
                    .unwrap_or(ChronoDuration::MAX)
                    .max(ChronoDuration::milliseconds(1));
                now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
        }
    }

    /// How long to sleep from `now` until the next run.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or_default()
    }
}

impl From<DailySchedule> for ScheduleSpec {
    fn from(daily: DailySchedule) -> Self {
        Self::Daily(daily)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_after_later_today() {
        let schedule = DailySchedule::parse("02:30").unwrap();
        assert_eq!(schedule.next_after(at(1, 0, 0)), at(2, 30, 0));
    }

    #[test]
    fn test_next_after_rolls_to_tomorrow() {
        let schedule = DailySchedule::parse("02:30").unwrap();
        let next = schedule.next_after(at(3, 0, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_next_after_is_strictly_after_now() {
        let schedule = DailySchedule::default();
        let midnight = at(0, 0, 0);
        assert_eq!(
            schedule.next_after(midnight),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_after_crosses_month_end() {
        let schedule = DailySchedule::parse("00:00").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap();
        assert_eq!(
            schedule.next_after(now),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DailySchedule::parse("midnight").is_err());
        assert!(DailySchedule::parse("24:00").is_err());
    }

    #[test]
    fn test_interval_delay() {
        let spec = ScheduleSpec::Interval(Duration::from_secs(90));
        let now = at(12, 0, 0);
        assert_eq!(spec.next_after(now), at(12, 1, 30));
        assert_eq!(spec.delay_from(now), Duration::from_secs(90));
    }

    #[test]
    fn test_daily_delay() {
        let spec = ScheduleSpec::from(DailySchedule::parse("12:00:30").unwrap());
        assert_eq!(spec.delay_from(at(12, 0, 0)), Duration::from_secs(30));
    }
}
