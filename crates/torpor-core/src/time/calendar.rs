//! UTC calendar time, backed by `chrono`'s naive date-time

use core::fmt::{self, Write};
use core::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Text form of a timestamp, `YYYY-MM-DD HH:MM:SS`
pub type TimestampText = heapless::String<24>;

/// Rendered in place of a timestamp when no clock source could be trusted
pub const TIME_NOT_SET: &str = "Time Not Set";

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepted by [`DateTime::from_str`], seconds optional
const PARSE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime(NaiveDateTime);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDateTime;

impl DateTime {
    /// Unix epoch, the value a never-set clock reports
    pub const EPOCH: Self = Self(NaiveDateTime::UNIX_EPOCH);

    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, InvalidDateTime> {
        NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|date| {
                date.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
            })
            .map(Self)
            .ok_or(InvalidDateTime)
    }

    /// Out-of-range inputs saturate to chrono's latest representable instant.
    pub fn from_unix_secs(secs: u64) -> Self {
        let value = i64::try_from(secs)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map_or(NaiveDateTime::MAX, |utc| utc.naive_utc());
        Self(value)
    }

    pub fn to_unix_secs(&self) -> u64 {
        u64::try_from(self.0.and_utc().timestamp()).unwrap_or(0)
    }

    pub fn year(&self) -> u16 {
        u16::try_from(self.0.year()).unwrap_or(0)
    }

    pub fn month(&self) -> u8 {
        self.0.month() as u8
    }

    pub fn day(&self) -> u8 {
        self.0.day() as u8
    }

    pub fn hour(&self) -> u8 {
        self.0.hour() as u8
    }

    pub fn minute(&self) -> u8 {
        self.0.minute() as u8
    }

    pub fn second(&self) -> u8 {
        self.0.second() as u8
    }

    /// Day of the week, 0 for Sunday
    pub fn weekday(&self) -> u8 {
        self.0.weekday().num_days_from_sunday() as u8
    }

    /// A clock is believed only when its year is strictly after `min_valid_year`.
    pub fn is_plausible(&self, min_valid_year: u16) -> bool {
        self.0.year() > i32::from(min_valid_year)
    }

    pub fn to_text(&self) -> TimestampText {
        let mut text = TimestampText::new();
        // 19 bytes always fit in 24 for four-digit years
        let _ = write!(text, "{self}");
        text
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DISPLAY_FORMAT))
    }
}

/// Parses `YYYY-MM-DD HH:MM[:SS]`, also accepting a `T` separator.
impl FromStr for DateTime {
    type Err = InvalidDateTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        PARSE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(Self)
            .ok_or(InvalidDateTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_zero() {
        assert_eq!(DateTime::EPOCH.to_unix_secs(), 0);
        assert_eq!(DateTime::from_unix_secs(0), DateTime::EPOCH);
        assert_eq!(DateTime::EPOCH.year(), 1970);
    }

    #[test]
    fn known_instants_convert_both_ways() {
        // 2024-02-29 12:34:56 UTC
        let leap_day = DateTime::new(2024, 2, 29, 12, 34, 56).unwrap();
        assert_eq!(leap_day.to_unix_secs(), 1_709_210_096);
        assert_eq!(DateTime::from_unix_secs(1_709_210_096), leap_day);

        // 2000-03-01 00:00:00 UTC
        let after_century_leap = DateTime::from_unix_secs(951_868_800);
        assert_eq!(
            after_century_leap,
            DateTime::new(2000, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(after_century_leap.month(), 3);
        assert_eq!(after_century_leap.day(), 1);
    }

    #[test]
    fn weekday_counts_from_sunday() {
        assert_eq!(DateTime::EPOCH.weekday(), 4);
        assert_eq!(DateTime::new(2000, 1, 1, 0, 0, 0).unwrap().weekday(), 6);
        assert_eq!(DateTime::new(2024, 2, 29, 23, 0, 0).unwrap().weekday(), 4);
        assert_eq!(DateTime::new(2025, 6, 1, 12, 0, 0).unwrap().weekday(), 0);
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(DateTime::new(2023, 2, 29, 0, 0, 0).is_err());
        assert!(DateTime::new(2024, 13, 1, 0, 0, 0).is_err());
        assert!(DateTime::new(2024, 4, 31, 0, 0, 0).is_err());
        assert!(DateTime::new(2024, 1, 1, 24, 0, 0).is_err());
        assert!(DateTime::new(2100, 2, 29, 0, 0, 0).is_err());
        assert!(DateTime::new(2000, 2, 29, 0, 0, 0).is_ok());
    }

    #[test]
    fn plausibility_is_strictly_after_threshold() {
        let at_threshold = DateTime::new(2023, 12, 31, 23, 59, 59).unwrap();
        let after = DateTime::new(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!at_threshold.is_plausible(2023));
        assert!(after.is_plausible(2023));
        assert!(!DateTime::EPOCH.is_plausible(2023));
    }

    #[test]
    fn formats_and_parses_log_timestamps() {
        let value = DateTime::new(2025, 7, 4, 9, 5, 0).unwrap();
        assert_eq!(value.to_text().as_str(), "2025-07-04 09:05:00");

        assert_eq!("2025-07-04 09:05:00".parse::<DateTime>(), Ok(value));
        assert_eq!(" 2025-07-04T09:05 ".parse::<DateTime>(), Ok(value));
        assert!("2025-07-04".parse::<DateTime>().is_err());
        assert!("2025-07-04 09:05:00:01".parse::<DateTime>().is_err());
        assert!("2025-02-30 09:05".parse::<DateTime>().is_err());
    }
}
