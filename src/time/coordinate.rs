//! Time coordinates: CF-encoded offsets decoded against a calendar

use super::calendar::{Calendar, CalendarDate};
use crate::errors::{OceanReduceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a CF time offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
        }
    }

    #[must_use]
    pub const fn days_per_unit(self) -> f64 {
        match self {
            Self::Days => 1.0,
            Self::Hours => 1.0 / 24.0,
            Self::Minutes => 1.0 / 1440.0,
            Self::Seconds => 1.0 / 86_400.0,
        }
    }
}

/// Parsed `"<unit> since <epoch>"` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: CalendarDate,
}

impl TimeUnits {
    #[must_use]
    pub const fn days_since(epoch: CalendarDate) -> Self {
        Self {
            unit: TimeUnit::Days,
            epoch,
        }
    }

    /// Parse a CF `units` attribute such as `days since 1850-01-01`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] when the string is not a
    /// recognised time unit.
    pub fn parse(units: &str) -> Result<Self> {
        let (unit, epoch) = units.split_once(" since ").ok_or_else(|| {
            OceanReduceError::Calendar(format!("'{units}' is not a CF time unit"))
        })?;
        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "hr" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "sec" | "s" => TimeUnit::Seconds,
            other => {
                return Err(OceanReduceError::Calendar(format!(
                    "unsupported time unit '{other}'"
                )))
            }
        };
        Ok(Self {
            unit,
            epoch: CalendarDate::parse(epoch)?,
        })
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} since {}", self.unit.as_str(), self.epoch)
    }
}

/// Ordered timestamps with their calendar metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoordinate {
    calendar: Calendar,
    units: TimeUnits,
    offsets: Vec<f64>,
    dates: Vec<CalendarDate>,
    bounds: Option<Vec<(f64, f64)>>,
}

impl TimeCoordinate {
    /// Decode raw offsets against `units` in `calendar`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] if the epoch does not exist in
    /// the calendar, an offset is not finite, or the offsets decrease.
    pub fn decode(offsets: Vec<f64>, units: TimeUnits, calendar: Calendar) -> Result<Self> {
        calendar.validate(&units.epoch)?;
        if let Some(bad) = offsets.iter().find(|v| !v.is_finite()) {
            return Err(OceanReduceError::Calendar(format!(
                "time offset {bad} is not finite"
            )));
        }
        if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
            return Err(OceanReduceError::Calendar(format!(
                "time coordinate decreases at index {} ({} -> {})",
                i + 1,
                offsets[i],
                offsets[i + 1]
            )));
        }

        let scale = units.unit.days_per_unit();
        let dates = offsets
            .iter()
            .map(|&v| units.epoch.add_days(calendar, v * scale))
            .collect();

        Ok(Self {
            calendar,
            units,
            offsets,
            dates,
            bounds: None,
        })
    }

    /// Decode from the raw `units` / `calendar` attribute strings of a file
    ///
    /// A missing `calendar` falls back to `standard`, as CF prescribes; a
    /// missing `units` cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] when units are absent or invalid.
    pub fn from_cf_attributes(
        offsets: Vec<f64>,
        units: Option<&str>,
        calendar: Option<&str>,
    ) -> Result<Self> {
        let units = units.ok_or_else(|| {
            OceanReduceError::Calendar("time coordinate has no 'units' attribute".to_string())
        })?;
        let calendar = calendar.map_or(Ok(Calendar::Standard), Calendar::from_cf_name)?;
        Self::decode(offsets, TimeUnits::parse(units)?, calendar)
    }

    /// Mid-month timestamps for `n_months` consecutive months starting in
    /// January of `start_year`, encoded as days since `start_year`-01-01
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] if the start year is outside
    /// the calendar's range.
    pub fn monthly(calendar: Calendar, start_year: i32, n_months: usize) -> Result<Self> {
        let epoch = CalendarDate::new(start_year, 1, 1);
        calendar.validate(&epoch)?;
        let epoch_day = calendar.day_number(&epoch);

        let mut offsets = Vec::with_capacity(n_months);
        let mut bounds = Vec::with_capacity(n_months);
        for i in 0..n_months {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let year = start_year + (i / 12) as i32;
            #[allow(clippy::cast_possible_truncation)]
            let month = (i % 12) as u32 + 1;
            let first = calendar.day_number(&CalendarDate::new(year, month, 1)) - epoch_day;
            let len = f64::from(calendar.days_in_month(year, month));
            #[allow(clippy::cast_precision_loss)]
            let start = first as f64;
            offsets.push(start + len / 2.0);
            bounds.push((start, start + len));
        }

        Self::decode(offsets, TimeUnits::days_since(epoch), calendar)?.with_bounds(bounds)
    }

    /// Attach cell bounds (same units as the offsets)
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] if the number of bounds differs
    /// from the number of timesteps.
    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Result<Self> {
        if bounds.len() != self.offsets.len() {
            return Err(OceanReduceError::Calendar(format!(
                "{} time bounds for {} timesteps",
                bounds.len(),
                self.offsets.len()
            )));
        }
        self.bounds = Some(bounds);
        Ok(self)
    }

    #[must_use]
    pub const fn calendar(&self) -> Calendar {
        self.calendar
    }

    #[must_use]
    pub const fn units(&self) -> &TimeUnits {
        &self.units
    }

    #[must_use]
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    #[must_use]
    pub fn dates(&self) -> &[CalendarDate] {
        &self.dates
    }

    #[must_use]
    pub fn bounds(&self) -> Option<&[(f64, f64)]> {
        self.bounds.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Keep only the timesteps at `indices` (which must be increasing)
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            calendar: self.calendar,
            units: self.units,
            offsets: indices.iter().map(|&i| self.offsets[i]).collect(),
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
            bounds: self
                .bounds
                .as_ref()
                .map(|b| indices.iter().map(|&i| b[i]).collect()),
        }
    }

    /// Indices of timesteps whose year lies in `[first_year, last_year]`
    #[must_use]
    pub fn indices_in_years(&self, first_year: i32, last_year: i32) -> Vec<usize> {
        self.dates
            .iter()
            .enumerate()
            .filter(|(_, d)| (first_year..=last_year).contains(&d.year))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        let units = TimeUnits::parse("hours since 2000-01-01 00:00:00").unwrap();
        assert_eq!(units.unit, TimeUnit::Hours);
        assert_eq!(units.epoch, CalendarDate::new(2000, 1, 1));
        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_err());
        assert!(TimeUnits::parse("days").is_err());
    }

    #[test]
    fn test_decode_noleap_offsets() {
        let units = TimeUnits::parse("days since 0001-01-01").unwrap();
        let time = TimeCoordinate::decode(vec![0.0, 59.0, 365.0], units, Calendar::NoLeap).unwrap();
        assert_eq!(time.dates()[0], CalendarDate::new(1, 1, 1));
        assert_eq!(time.dates()[1], CalendarDate::new(1, 3, 1));
        assert_eq!(time.dates()[2], CalendarDate::new(2, 1, 1));
    }

    #[test]
    fn test_decreasing_time_is_rejected() {
        let units = TimeUnits::parse("days since 2000-01-01").unwrap();
        let result = TimeCoordinate::decode(vec![1.0, 0.0], units, Calendar::Standard);
        assert!(matches!(result, Err(OceanReduceError::Calendar(_))));
    }

    #[test]
    fn test_missing_units_is_calendar_error() {
        let result = TimeCoordinate::from_cf_attributes(vec![0.0], None, Some("noleap"));
        assert!(matches!(result, Err(OceanReduceError::Calendar(_))));
    }

    #[test]
    fn test_monthly_builder_lands_mid_month() {
        let time = TimeCoordinate::monthly(Calendar::Standard, 2000, 14).unwrap();
        assert_eq!(time.len(), 14);
        assert_eq!(time.dates()[1].month, 2);
        assert_eq!(time.dates()[1].day, 15);
        assert_eq!(time.dates()[12].year, 2001);
        assert_eq!(time.dates()[12].month, 1);
        assert_eq!(time.indices_in_years(2001, 2001), vec![12, 13]);
    }
}
