use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid week key '{0}', expected YYYY-Www")]
pub struct WeekKeyError(pub String);

/// ISO 8601 week (Monday start, week 1 contains the first Thursday).
/// Written `2026-W42`. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    year: i32,
    week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        let iso = at.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this week.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }

    /// Sunday of this week.
    pub fn last_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Sun)
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = WeekKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || WeekKeyError(s.to_string());
        let (year, week) = s.split_once("-W").ok_or_else(err)?;
        if year.len() != 4 || week.len() != 2 {
            return Err(err());
        }
        let year: i32 = year.parse().map_err(|_| err())?;
        let week: u32 = week.parse().map_err(|_| err())?;
        Self::new(year, week).ok_or_else(err)
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_week_of_year_boundary() {
        // 2026-01-01 is a Thursday, so it belongs to 2026-W01.
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(WeekKey::of(at).to_string(), "2026-W01");

        // 2027-01-01 is a Friday, still in ISO week 53 of 2026.
        let at = Utc.with_ymd_and_hms(2027, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(WeekKey::of(at).to_string(), "2026-W53");
    }

    #[test]
    fn test_parse_roundtrip_and_bounds() {
        let key: WeekKey = "2026-W42".parse().unwrap();
        assert_eq!(key.year(), 2026);
        assert_eq!(key.week(), 42);
        assert_eq!(key.first_day(), NaiveDate::from_ymd_opt(2026, 10, 12));
        assert_eq!(key.last_day(), NaiveDate::from_ymd_opt(2026, 10, 18));
    }

    #[test]
    fn test_rejects_invalid_keys() {
        for raw in ["2026-42", "2026-W00", "2025-W53", "26-W01", "2026-W1", "abcd-W01"] {
            assert!(raw.parse::<WeekKey>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a: WeekKey = "2025-W52".parse().unwrap();
        let b: WeekKey = "2026-W01".parse().unwrap();
        let c: WeekKey = "2026-W10".parse().unwrap();
        assert!(a < b && b < c);
    }
}
