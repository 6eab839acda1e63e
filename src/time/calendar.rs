//! CF calendars and calendar-date arithmetic
//!
//! Model output uses the CF `calendar` attribute to say how long its years and
//! months are. Day counts are computed with a per-calendar "days before year"
//! formula so that every calendar shares one date <-> day-number conversion.

use crate::errors::{OceanReduceError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

const NOLEAP_MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const LEAP_MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Supported CF calendars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    /// `standard`, `gregorian`, `proleptic_gregorian`
    Standard,
    /// `noleap`, `365_day`
    NoLeap,
    /// `all_leap`, `366_day`
    AllLeap,
    /// `360_day`
    Day360,
    /// `julian`
    Julian,
}

impl Calendar {
    /// Resolve a CF `calendar` attribute value
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] for unknown calendar names.
    pub fn from_cf_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Standard),
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            "360_day" => Ok(Self::Day360),
            "julian" => Ok(Self::Julian),
            other => Err(OceanReduceError::Calendar(format!(
                "unsupported calendar '{other}'"
            ))),
        }
    }

    /// CF name written back to output files
    #[must_use]
    pub const fn cf_name(self) -> &'static str {
        match self {
            Self::Standard => "proleptic_gregorian",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
            Self::Julian => "julian",
        }
    }

    #[must_use]
    pub const fn is_leap_year(self, year: i32) -> bool {
        match self {
            Self::Standard => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
            Self::Julian => year % 4 == 0,
            Self::AllLeap => true,
            Self::NoLeap | Self::Day360 => false,
        }
    }

    /// Number of days in `month` (1-based) of `year`
    #[must_use]
    pub const fn days_in_month(self, year: i32, month: u32) -> u32 {
        if let Self::Day360 = self {
            return 30;
        }
        let idx = (month as usize).saturating_sub(1) % 12;
        if self.is_leap_year(year) {
            LEAP_MONTH_DAYS[idx]
        } else {
            NOLEAP_MONTH_DAYS[idx]
        }
    }

    #[must_use]
    pub const fn days_in_year(self, year: i32) -> u32 {
        match self {
            Self::Day360 => 360,
            _ if self.is_leap_year(year) => 366,
            _ => 365,
        }
    }

    /// Days between 0000-01-01 and `year`-01-01
    fn days_before_year(self, year: i32) -> i64 {
        let y = i64::from(year);
        match self {
            Self::NoLeap => 365 * y,
            Self::AllLeap => 366 * y,
            Self::Day360 => 360 * y,
            // leap years in [0, y): multiples of 4
            Self::Julian => 365 * y + (y + 3).div_euclid(4),
            Self::Standard => {
                365 * y + (y + 3).div_euclid(4) - (y + 99).div_euclid(100)
                    + (y + 399).div_euclid(400)
            }
        }
    }

    fn mean_year_length(self) -> f64 {
        match self {
            Self::NoLeap => 365.0,
            Self::AllLeap => 366.0,
            Self::Day360 => 360.0,
            Self::Julian => 365.25,
            Self::Standard => 365.2425,
        }
    }

    /// Day number of `date` counted from 0000-01-01 in this calendar
    #[must_use]
    pub fn day_number(self, date: &CalendarDate) -> i64 {
        let mut days = self.days_before_year(date.year);
        for m in 1..date.month {
            days += i64::from(self.days_in_month(date.year, m));
        }
        days + i64::from(date.day) - 1
    }

    /// Inverse of [`Calendar::day_number`]
    #[must_use]
    pub fn date_from_day_number(self, day_number: i64) -> CalendarDate {
        #[allow(clippy::cast_possible_truncation)]
        let mut year = (day_number as f64 / self.mean_year_length()).floor() as i32;
        while self.days_before_year(year + 1) <= day_number {
            year += 1;
        }
        while self.days_before_year(year) > day_number {
            year -= 1;
        }

        let mut remaining = day_number - self.days_before_year(year);
        let mut month = 1;
        while month < 12 {
            let len = i64::from(self.days_in_month(year, month));
            if remaining < len {
                break;
            }
            remaining -= len;
            month += 1;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        CalendarDate::new(year, month, remaining as u32 + 1)
    }

    /// Check that `date` exists in this calendar
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] for impossible dates such as
    /// February 29 in a `noleap` calendar.
    pub fn validate(self, date: &CalendarDate) -> Result<()> {
        if !(1..=12).contains(&date.month)
            || date.day == 0
            || date.day > self.days_in_month(date.year, date.month)
        {
            return Err(OceanReduceError::Calendar(format!(
                "date {date} does not exist in the {} calendar",
                self.cf_name()
            )));
        }
        if self == Self::Standard
            && NaiveDate::from_ymd_opt(date.year, date.month, date.day).is_none()
        {
            return Err(OceanReduceError::Calendar(format!(
                "date {date} is out of range for the proleptic Gregorian calendar"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cf_name())
    }
}

/// A date-time in an arbitrary CF calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Seconds into the day
    pub seconds: u32,
}

impl CalendarDate {
    #[must_use]
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            seconds: 0,
        }
    }

    #[must_use]
    pub const fn with_seconds(mut self, seconds: u32) -> Self {
        self.seconds = seconds;
        self
    }

    /// Fractional days since 0000-01-01 in `calendar`
    #[must_use]
    pub fn fractional_day_number(&self, calendar: Calendar) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let whole = calendar.day_number(self) as f64;
        whole + f64::from(self.seconds) / SECONDS_PER_DAY
    }

    /// Date reached by adding (possibly fractional, possibly negative) days
    #[must_use]
    pub fn add_days(&self, calendar: Calendar, days: f64) -> Self {
        let target = self.fractional_day_number(calendar) + days;
        let whole = target.floor();
        // round to the second so that 15.5 days lands on 12:00:00 exactly
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut seconds = ((target - whole) * SECONDS_PER_DAY).round() as u32;
        #[allow(clippy::cast_possible_truncation)]
        let mut day_number = whole as i64;
        if seconds >= 86_400 {
            seconds -= 86_400;
            day_number += 1;
        }
        calendar.date_from_day_number(day_number).with_seconds(seconds)
    }

    /// Convert to a chrono date-time; only meaningful in the standard calendar
    #[must_use]
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.seconds / 3600,
            (self.seconds % 3600) / 60,
            self.seconds % 60,
        )
    }

    /// Parse `YYYY-MM-DD[ HH:MM:SS[.fff]]` (also accepts a `T` separator and
    /// single-digit fields, as found in CF `units` strings)
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] if the text is not a date.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = || OceanReduceError::Calendar(format!("cannot parse reference date '{text}'"));
        let text = text.trim().trim_end_matches('Z');
        let (date_part, time_part) = match text.split_once(['T', ' ']) {
            Some((d, t)) => (d, Some(t.trim())),
            None => (text, None),
        };

        // a leading '-' belongs to the year
        let (sign, unsigned) = match date_part.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, date_part),
        };
        let mut fields = unsigned.split('-');
        let year: i32 = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let month: u32 = fields.next().map_or(Ok(1), |s| s.parse()).map_err(|_| bad())?;
        let day: u32 = fields.next().map_or(Ok(1), |s| s.parse()).map_err(|_| bad())?;

        let mut seconds = 0_u32;
        if let Some(time) = time_part.filter(|t| !t.is_empty()) {
            // drop a trailing timezone offset such as "+00:00" or " UTC"
            let time = time.split([' ', '+']).next().unwrap_or(time);
            let mut hms = time.split(':');
            let h: u32 = hms.next().map_or(Ok(0), |s| s.parse()).map_err(|_| bad())?;
            let m: u32 = hms.next().map_or(Ok(0), |s| s.parse()).map_err(|_| bad())?;
            let s: f64 = hms.next().map_or(Ok(0.0), |s| s.parse()).map_err(|_| bad())?;
            if h > 23 || m > 59 || !(0.0..61.0).contains(&s) {
                return Err(bad());
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                seconds = h * 3600 + m * 60 + s.floor() as u32;
            }
        }

        Ok(Self::new(sign * year, month, day).with_seconds(seconds))
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            self.seconds / 3600,
            (self.seconds % 3600) / 60,
            self.seconds % 60
        )
    }
}
