//! After-hours access policy.
//!
//! Outside business hours only cards flagged `after_hours_allowed` open a
//! door. The window covers Saturday and Sunday entirely, and on weekdays the
//! configured `[start, end)` range. A range whose start is later than its end
//! wraps past midnight: `2200..0600` covers 22:00 through 05:59.

use chrono::{Datelike, Timelike, Weekday};
use proxgate_core::{AuthorizedCard, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A wall-clock time with minute resolution, written as `HHMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Parse an `HHMM` integer such as `2200` or `600`.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimeOfDay` if the hour is above 23 or the
    /// minute above 59.
    pub fn from_hhmm(hhmm: u16) -> Result<Self> {
        let hour = hhmm / 100;
        let minute = hhmm % 100;
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTimeOfDay(hhmm));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    /// The time of day of `at`, truncated to the minute.
    pub fn of<T: Timelike>(at: &T) -> Self {
        Self {
            hour: at.hour() as u8,
            minute: at.minute() as u8,
        }
    }

    #[must_use]
    pub fn as_hhmm(self) -> u16 {
        u16::from(self.hour) * 100 + u16::from(self.minute)
    }
}

impl TryFrom<u16> for TimeOfDay {
    type Error = Error;

    fn try_from(hhmm: u16) -> Result<Self> {
        Self::from_hhmm(hhmm)
    }
}

impl From<TimeOfDay> for u16 {
    fn from(time: TimeOfDay) -> Self {
        time.as_hhmm()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// When only after-hours cards may enter.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use proxgate_door::policy::{AfterHoursPolicy, TimeOfDay};
///
/// let policy = AfterHoursPolicy::new(
///     TimeOfDay::from_hhmm(2200).unwrap(),
///     TimeOfDay::from_hhmm(600).unwrap(),
/// );
///
/// // Monday 23:00 falls in the wrapped window
/// let late = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap().and_hms_opt(23, 0, 0).unwrap();
/// assert!(policy.is_after_hours(&late));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterHoursPolicy {
    pub start: TimeOfDay,
    pub end: TimeOfDay,

    /// Magic cards keep working inside the window even without the
    /// after-hours flag.
    #[serde(default = "default_magic_exempt")]
    pub magic_cards_exempt: bool,
}

fn default_magic_exempt() -> bool {
    true
}

impl AfterHoursPolicy {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            start,
            end,
            magic_cards_exempt: default_magic_exempt(),
        }
    }

    #[must_use]
    pub fn with_magic_cards_exempt(mut self, exempt: bool) -> Self {
        self.magic_cards_exempt = exempt;
        self
    }

    /// Whether `at` falls inside the after-hours window.
    pub fn is_after_hours<T: Datelike + Timelike>(&self, at: &T) -> bool {
        if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return true;
        }

        let now = TimeOfDay::of(at);
        if self.start <= self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }

    /// Whether `card` may open the door at `at`.
    pub fn permits<T: Datelike + Timelike>(&self, card: &AuthorizedCard, at: &T) -> bool {
        if card.after_hours_allowed || (card.magic && self.magic_cards_exempt) {
            return true;
        }
        !self.is_after_hours(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use rstest::rstest;

    // 2025-01-06 is a Monday, 2025-01-04 a Saturday, 2025-01-05 a Sunday.
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn policy(start: u16, end: u16) -> AfterHoursPolicy {
        AfterHoursPolicy::new(
            TimeOfDay::from_hhmm(start).unwrap(),
            TimeOfDay::from_hhmm(end).unwrap(),
        )
    }

    #[rstest]
    #[case(at(6, 23, 0), true)]
    #[case(at(6, 5, 0), true)]
    #[case(at(6, 12, 0), false)]
    #[case(at(6, 22, 0), true)]
    #[case(at(6, 6, 0), false)]
    #[case(at(6, 5, 59), true)]
    #[case(at(4, 12, 0), true)]
    #[case(at(5, 12, 0), true)]
    fn test_wrapping_window(#[case] when: NaiveDateTime, #[case] after_hours: bool) {
        assert_eq!(policy(2200, 600).is_after_hours(&when), after_hours);
    }

    #[rstest]
    #[case(at(7, 8, 59), false)]
    #[case(at(7, 9, 0), true)]
    #[case(at(7, 16, 59), true)]
    #[case(at(7, 17, 0), false)]
    fn test_same_day_window(#[case] when: NaiveDateTime, #[case] after_hours: bool) {
        assert_eq!(policy(900, 1700).is_after_hours(&when), after_hours);
    }

    #[test]
    fn test_empty_weekday_window_still_covers_weekend() {
        let policy = policy(1200, 1200);
        assert!(!policy.is_after_hours(&at(6, 12, 0)));
        assert!(policy.is_after_hours(&at(4, 12, 0)));
    }

    #[test]
    fn test_permits_respects_card_flags() {
        let policy = policy(2200, 600);
        let night = at(6, 23, 0);
        let noon = at(6, 12, 0);

        let regular = AuthorizedCard::new("Regular", "reg");
        assert!(!policy.permits(&regular, &night));
        assert!(policy.permits(&regular, &noon));

        let night_owl = AuthorizedCard::new("Owl", "owl").with_after_hours(true);
        assert!(policy.permits(&night_owl, &night));

        let magic = AuthorizedCard::new("Admin", "root").with_magic(true);
        assert!(policy.permits(&magic, &night));
        assert!(!policy.with_magic_cards_exempt(false).permits(&magic, &night));
    }

    #[rstest]
    #[case(2400)]
    #[case(1260)]
    #[case(9999)]
    fn test_time_of_day_rejects_invalid(#[case] hhmm: u16) {
        assert!(matches!(
            TimeOfDay::from_hhmm(hhmm),
            Err(Error::InvalidTimeOfDay(_))
        ));
    }

    #[test]
    fn test_time_of_day_round_trips_hhmm() {
        let time = TimeOfDay::from_hhmm(605).unwrap();
        assert_eq!(time.as_hhmm(), 605);
        assert_eq!(time.to_string(), "06:05");
    }

    #[test]
    fn test_policy_deserializes_hhmm_integers() {
        let policy: AfterHoursPolicy =
            serde_json::from_str(r#"{"start": 2200, "end": 600}"#).unwrap();
        assert_eq!(policy.start.as_hhmm(), 2200);
        assert_eq!(policy.end.as_hhmm(), 600);
        assert!(policy.magic_cards_exempt);

        assert!(serde_json::from_str::<AfterHoursPolicy>(r#"{"start": 2500, "end": 600}"#).is_err());
    }
}
