use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Self::Sat | Self::Sun)
    }
}

/// One entry of a schedule's day set. Group selectors expand at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DaySelector {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    All,
    Weekdays,
    Weekends,
}

impl DaySelector {
    pub fn matches(self, day: DayOfWeek) -> bool {
        match self {
            Self::All => true,
            Self::Weekdays => !day.is_weekend(),
            Self::Weekends => day.is_weekend(),
            Self::Mon => day == DayOfWeek::Mon,
            Self::Tue => day == DayOfWeek::Tue,
            Self::Wed => day == DayOfWeek::Wed,
            Self::Thu => day == DayOfWeek::Thu,
            Self::Fri => day == DayOfWeek::Fri,
            Self::Sat => day == DayOfWeek::Sat,
            Self::Sun => day == DayOfWeek::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTieBreak {
    /// The schedule defined latest in the list wins an overlap.
    #[default]
    LastDefined,
    FirstDefined,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub days: Vec<DaySelector>,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    #[serde(rename = "endMinutes")]
    pub end_minutes: u16,
    #[serde(rename = "targetTemp")]
    pub target_temp_c: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Schedule {
    pub fn validate(&self) -> bool {
        self.start_minutes < 24 * 60
            && self.end_minutes < 24 * 60
            && self.target_temp_c.is_finite()
            && (10.0..=35.0).contains(&self.target_temp_c)
    }

    pub fn sanitize(&mut self) {
        self.start_minutes = self.start_minutes.min(24 * 60 - 1);
        self.end_minutes = self.end_minutes.min(24 * 60 - 1);
        if !self.target_temp_c.is_finite() {
            self.enabled = false;
        } else {
            self.target_temp_c = self.target_temp_c.clamp(10.0, 35.0);
        }
    }

    /// Half-open `[start, end)` window; `end < start` crosses midnight. Both
    /// halves of a wrapping window are checked against the same weekday.
    pub fn window_contains(&self, minutes: u16) -> bool {
        let (start, end) = (self.start_minutes, self.end_minutes);
        if start == end {
            false
        } else if start < end {
            start <= minutes && minutes < end
        } else {
            minutes >= start || minutes < end
        }
    }

    pub fn applies_on(&self, day: DayOfWeek) -> bool {
        self.days.iter().any(|selector| selector.matches(day))
    }

    pub fn is_active_at(&self, now: DateTime<FixedOffset>) -> bool {
        if !self.enabled || !self.validate() {
            return false;
        }
        let day = DayOfWeek::from_chrono(now.weekday());
        let minutes = now.hour() as u16 * 60 + now.minute() as u16;
        self.applies_on(day) && self.window_contains(minutes)
    }
}

pub fn active_schedule(
    schedules: &[Schedule],
    now: DateTime<FixedOffset>,
    tie_break: ScheduleTieBreak,
) -> Option<&Schedule> {
    let mut matching = schedules.iter().filter(|schedule| schedule.is_active_at(now));
    match tie_break {
        ScheduleTieBreak::LastDefined => matching.last(),
        ScheduleTieBreak::FirstDefined => matching.next(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    pub(crate) fn schedule(name: &str, days: Vec<DaySelector>, start: u16, end: u16, target: f32) -> Schedule {
        Schedule {
            name: name.to_string(),
            days,
            start_minutes: start,
            end_minutes: end,
            target_temp_c: target,
            enabled: true,
        }
    }

    #[test]
    fn window_crossing_midnight_matches_both_sides() {
        let sleep = vec![schedule("Sleep", vec![DaySelector::All], 22 * 60, 8 * 60, 20.0)];

        // Jan 5, 2026 is Monday.
        let late = fixed_time(5, 23, 0);
        let early = fixed_time(6, 7, 59);
        let outside = fixed_time(6, 8, 0);
        let afternoon = fixed_time(6, 15, 30);

        assert_eq!(
            active_schedule(&sleep, late, ScheduleTieBreak::LastDefined).map(|s| s.target_temp_c),
            Some(20.0)
        );
        assert!(active_schedule(&sleep, early, ScheduleTieBreak::LastDefined).is_some());
        assert!(active_schedule(&sleep, outside, ScheduleTieBreak::LastDefined).is_none());
        assert!(active_schedule(&sleep, afternoon, ScheduleTieBreak::LastDefined).is_none());
    }

    #[test]
    fn wrapping_window_uses_current_weekday() {
        let weekday_nights = vec![schedule(
            "Weeknights",
            vec![DaySelector::Weekdays],
            22 * 60,
            6 * 60,
            19.5,
        )];

        // Saturday 02:00 belongs to Friday night, but the current weekday is Saturday.
        let saturday_early = fixed_time(10, 2, 0);
        let friday_late = fixed_time(9, 23, 0);

        assert!(active_schedule(&weekday_nights, saturday_early, ScheduleTieBreak::LastDefined).is_none());
        assert!(active_schedule(&weekday_nights, friday_late, ScheduleTieBreak::LastDefined).is_some());
    }

    #[test]
    fn overlap_follows_tie_break() {
        let schedules = vec![
            schedule("Day", vec![DaySelector::All], 8 * 60, 20 * 60, 23.0),
            schedule("Movie", vec![DaySelector::Sat, DaySelector::Sun], 18 * 60, 22 * 60, 21.0),
        ];
        let saturday_evening = fixed_time(10, 19, 0);

        let last = active_schedule(&schedules, saturday_evening, ScheduleTieBreak::LastDefined);
        let first = active_schedule(&schedules, saturday_evening, ScheduleTieBreak::FirstDefined);

        assert_eq!(last.map(|s| s.name.as_str()), Some("Movie"));
        assert_eq!(first.map(|s| s.name.as_str()), Some("Day"));
    }

    #[test]
    fn inert_schedules_never_match() {
        let now = fixed_time(5, 12, 0);
        let no_days = schedule("Nothing", Vec::new(), 0, 23 * 60, 21.0);
        let empty_window = schedule("Empty", vec![DaySelector::All], 600, 600, 21.0);
        let mut disabled = schedule("Off", vec![DaySelector::All], 0, 23 * 60, 21.0);
        disabled.enabled = false;

        assert!(!no_days.is_active_at(now));
        assert!(!empty_window.is_active_at(now));
        assert!(!disabled.is_active_at(now));
    }

    #[test]
    fn day_selectors_expand_groups() {
        assert!(DaySelector::Weekdays.matches(DayOfWeek::Fri));
        assert!(!DaySelector::Weekdays.matches(DayOfWeek::Sun));
        assert!(DaySelector::Weekends.matches(DayOfWeek::Sat));
        assert!(DaySelector::Tue.matches(DayOfWeek::Tue));
        assert!(!DaySelector::Tue.matches(DayOfWeek::Wed));
    }
}
