use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, TimeZone};

/// Daily reminder timing: fire `lead` before `reminder_hour` local time on
/// the event's date, give or take `tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    pub reminder_hour: u32,
    pub lead: TimeDelta,
    pub tolerance: TimeDelta,
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self {
            reminder_hour: 9,
            lead: TimeDelta::hours(3),
            tolerance: TimeDelta::minutes(10),
        }
    }
}

/// Lead and tolerance are clamped to one day.
const MAX_WINDOW_MINUTES: i64 = 24 * 60;

impl ReminderWindow {
    pub fn new(reminder_hour: u32, lead_minutes: i64, tolerance_minutes: i64) -> Self {
        let bounded = |minutes: i64| TimeDelta::minutes(minutes.clamp(0, MAX_WINDOW_MINUTES));
        Self {
            reminder_hour,
            lead: bounded(lead_minutes),
            tolerance: bounded(tolerance_minutes),
        }
    }

    /// Instant the reminder for an event on `date` should go out.
    pub fn fire_at(&self, date: NaiveDate, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        let local = date.and_hms_opt(self.reminder_hour, 0, 0)?;
        let reminder = offset.from_local_datetime(&local).single()?;
        Some(reminder - self.lead)
    }

    pub fn is_due(&self, date: NaiveDate, now: DateTime<FixedOffset>) -> bool {
        match self.fire_at(date, *now.offset()) {
            Some(fire_at) => (now - fire_at).abs() <= self.tolerance,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::local_offset;

    fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<FixedOffset> {
        local_offset(420)
            .from_local_datetime(&date.and_hms_opt(h, m, 0).unwrap())
            .single()
            .unwrap()
    }

    #[test]
    fn fires_three_hours_before_nine() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let window = ReminderWindow::default();
        assert_eq!(window.fire_at(date, local_offset(420)), Some(at(date, 6, 0)));
    }

    #[test]
    fn due_only_inside_tolerance() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let window = ReminderWindow::default();
        assert!(window.is_due(date, at(date, 6, 0)));
        assert!(window.is_due(date, at(date, 5, 50)));
        assert!(window.is_due(date, at(date, 6, 10)));
        assert!(!window.is_due(date, at(date, 6, 11)));
        assert!(!window.is_due(date, at(date, 9, 0)));
    }

    #[test]
    fn future_dates_are_not_due_today() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let tomorrow = today.succ_opt().unwrap();
        let window = ReminderWindow::default();
        assert!(!window.is_due(tomorrow, at(today, 6, 0)));
    }

    #[test]
    fn extreme_minutes_are_clamped_to_a_day() {
        let window = ReminderWindow::new(9, i64::MAX, i64::MIN);
        assert_eq!(window.lead, TimeDelta::days(1));
        assert_eq!(window.tolerance, TimeDelta::zero());
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(window.is_due(date, at(date - TimeDelta::days(1), 9, 0)));
    }

    #[test]
    fn invalid_hour_never_fires() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let window = ReminderWindow::new(25, 0, 10);
        assert_eq!(window.fire_at(date, local_offset(420)), None);
        assert!(!window.is_due(date, at(date, 1, 0)));
    }
}
