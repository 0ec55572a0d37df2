//! Weekly schedule + temporary overrides, resolved into a per-zone target
//! temperature at a given instant.

use chrono::{DateTime, Datelike, NaiveTime, Utc};

pub type ZoneId = i64;

/// The control plane's day-keyed, "HH:MM"-stringed wire format is parsed
/// into this shape by [`crate::http_client`], not derived here: the two
/// representations don't line up closely enough for a derive to help.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    /// 0..6, Monday = 0.
    pub day: u8,
    pub start: NaiveTime,
    pub zone: ZoneId,
    pub target: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FullSchedule {
    /// Sorted by (day, time, zone).
    entries: Vec<ScheduleEntry>,
}

impl FullSchedule {
    pub fn new(mut entries: Vec<ScheduleEntry>) -> Self {
        entries.sort_by(|a, b| (a.day, a.start, a.zone).partial_cmp(&(b.day, b.start, b.zone)).unwrap());
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetOverride {
    pub zone: ZoneId,
    pub end: DateTime<Utc>,
    pub target: f64,
}

/// Immutable snapshot of the schedule plus any temporary overrides,
/// rebuilt wholesale whenever the control plane reports a change.
#[derive(Debug, Clone, Default)]
pub struct SchedulePolicy {
    schedule: FullSchedule,
    overrides: Vec<TargetOverride>,
}

impl SchedulePolicy {
    pub fn new(schedule: FullSchedule, overrides: Vec<TargetOverride>) -> Self {
        Self { schedule, overrides }
    }

    /// Carry-forward rule: the day's schedule for `zone`, always either
    /// starting exactly at 00:00 or empty.
    pub fn get_day(&self, day: u8, zone: ZoneId) -> Vec<(NaiveTime, f64)> {
        let for_zone: Vec<&ScheduleEntry> =
            self.schedule.entries().iter().filter(|e| e.zone == zone).collect();
        if for_zone.is_empty() {
            return Vec::new();
        }

        let mut entries: Vec<(NaiveTime, f64)> = Vec::new();
        let mut candidate_beginning: Option<f64> = None;

        for e in &for_zone {
            if e.day == day {
                entries.push((e.start, e.target));
            } else if e.day < day {
                candidate_beginning = Some(e.target);
            }
        }

        let candidate_beginning = candidate_beginning.unwrap_or_else(|| for_zone.last().unwrap().target);

        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        if entries.first().map(|(t, _)| *t) != Some(midnight) {
            entries.insert(0, (midnight, candidate_beginning));
        }

        entries
    }

    pub fn target_overridden(&self, now: DateTime<Utc>, zone: ZoneId) -> bool {
        self.overrides.iter().any(|o| o.zone == zone && o.end > now)
    }

    pub fn target(&self, now: DateTime<Utc>, zone: ZoneId) -> Option<f64> {
        if let Some(o) = self.overrides.iter().find(|o| o.zone == zone && o.end > now) {
            return Some(o.target);
        }

        let day = now.weekday().num_days_from_monday() as u8;
        let day_schedule = self.get_day(day, zone);
        let now_time = now.time();

        let mut target = None;
        for (start, value) in day_schedule {
            if start <= now_time {
                target = Some(value);
            } else {
                break;
            }
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, 0).unwrap()
    }

    fn time(hour: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, min, 0).unwrap()
    }

    #[test]
    fn empty_schedule_has_no_target() {
        let policy = SchedulePolicy::new(FullSchedule::new(vec![]), vec![]);
        assert_eq!(policy.target(dt(2024, 1, 1, 12, 0), 1), None);
    }

    // 2024-01-01 is a Monday.
    #[test]
    fn carry_forward_wraps_from_the_weeks_last_entry() {
        let schedule = FullSchedule::new(vec![
            ScheduleEntry { day: 0, start: time(12, 0), zone: 1, target: 20.0 },
            ScheduleEntry { day: 2, start: time(0, 0), zone: 1, target: 22.0 },
        ]);
        let policy = SchedulePolicy::new(schedule, vec![]);

        assert_eq!(policy.target(dt(2024, 1, 2, 0, 0), 1), Some(20.0)); // Tue 00:00
        assert_eq!(policy.target(dt(2024, 1, 2, 12, 0), 1), Some(20.0)); // Tue 12:00
        assert_eq!(policy.target(dt(2024, 1, 3, 12, 0), 1), Some(22.0)); // Wed 12:00
        assert_eq!(policy.target(dt(2024, 1, 1, 11, 59), 1), Some(22.0)); // Mon 11:59, wraps
        assert_eq!(policy.target(dt(2024, 1, 1, 12, 1), 1), Some(20.0)); // Mon 12:01
    }

    #[test]
    fn two_zones_change_independently_at_the_same_time() {
        let schedule = FullSchedule::new(vec![
            ScheduleEntry { day: 0, start: time(12, 0), zone: 1, target: 20.0 },
            ScheduleEntry { day: 0, start: time(12, 0), zone: 2, target: 22.0 },
        ]);
        let policy = SchedulePolicy::new(schedule, vec![]);

        assert_eq!(policy.target(dt(2024, 1, 1, 13, 0), 1), Some(20.0));
        assert_eq!(policy.target(dt(2024, 1, 1, 13, 0), 2), Some(22.0));
    }

    #[test]
    fn active_override_wins_over_the_schedule() {
        let schedule = FullSchedule::new(vec![
            ScheduleEntry { day: 0, start: time(0, 0), zone: 1, target: 20.0 },
        ]);
        let overrides = vec![TargetOverride { zone: 1, end: dt(2024, 1, 1, 18, 0), target: 25.0 }];
        let policy = SchedulePolicy::new(schedule, overrides);

        assert_eq!(policy.target(dt(2024, 1, 1, 12, 0), 1), Some(25.0));
        assert!(policy.target_overridden(dt(2024, 1, 1, 12, 0), 1));
        assert_eq!(policy.target(dt(2024, 1, 1, 19, 0), 1), Some(20.0));
        assert!(!policy.target_overridden(dt(2024, 1, 1, 19, 0), 1));
    }

    #[test]
    fn non_empty_day_schedule_always_starts_at_midnight() {
        let schedule = FullSchedule::new(vec![
            ScheduleEntry { day: 0, start: time(7, 0), zone: 1, target: 20.0 },
        ]);
        let policy = SchedulePolicy::new(schedule, vec![]);
        let day = policy.get_day(0, 1);
        assert_eq!(day.first().unwrap().0, time(0, 0));
    }
}
