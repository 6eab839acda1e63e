//! Per-timestep weights derived from a time coordinate

use super::coordinate::TimeCoordinate;
use crate::errors::{OceanReduceError, Result};

/// One weight per timestep
///
/// Entries are strictly positive or explicitly missing (NaN). Reductions that
/// need every weight reject missing entries; the rolling averager treats them
/// as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSeries {
    values: Vec<f64>,
}

impl WeightSeries {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::InvalidWeights`] for zero, negative or
    /// infinite entries.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if let Some((i, w)) = values
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_nan() && (!w.is_finite() || **w <= 0.0))
        {
            return Err(OceanReduceError::InvalidWeights(format!(
                "weight {w} at index {i} is not strictly positive"
            )));
        }
        Ok(Self { values })
    }

    /// Equal unit weights
    #[must_use]
    pub fn uniform(len: usize) -> Self {
        Self {
            values: vec![1.0; len],
        }
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|w| w.is_nan())
    }

    /// Multiply every weight by `factor`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::InvalidWeights`] unless `factor` is
    /// positive and finite.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(OceanReduceError::InvalidWeights(format!(
                "scale factor {factor} is not strictly positive"
            )));
        }
        Self::new(self.values.iter().map(|w| w * factor).collect())
    }

    pub(crate) fn require_complete(&self) -> Result<()> {
        match self.values.iter().position(|w| w.is_nan()) {
            Some(i) => Err(OceanReduceError::InvalidWeights(format!(
                "weight at index {i} is missing"
            ))),
            None => Ok(()),
        }
    }

    /// Weights of `indices`, rescaled to sum to one
    ///
    /// The sum of the result is checked against 1.0 with a tolerance that
    /// grows with the group size (rounding accumulates once per element).
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::InvalidWeights`] for an empty group, an
    /// index past the end of the series, missing weights, or a sum that
    /// fails the check.
    pub fn normalized(&self, indices: &[usize]) -> Result<Vec<f64>> {
        if indices.is_empty() {
            return Err(OceanReduceError::InvalidWeights(
                "cannot normalise an empty group".to_string(),
            ));
        }
        let group = indices
            .iter()
            .map(|&i| {
                self.values.get(i).copied().ok_or_else(|| {
                    OceanReduceError::InvalidWeights(format!(
                        "index {i} is outside a series of {} weights",
                        self.values.len()
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let total: f64 = group.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(OceanReduceError::InvalidWeights(format!(
                "group weights sum to {total}"
            )));
        }
        let normalized: Vec<f64> = group.iter().map(|w| w / total).collect();

        let check: f64 = normalized.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let tolerance = 4.0 * f64::EPSILON * normalized.len() as f64;
        if (check - 1.0).abs() > tolerance {
            return Err(OceanReduceError::InvalidWeights(format!(
                "normalised weights sum to {check}, expected 1 within {tolerance:e}"
            )));
        }
        Ok(normalized)
    }
}

/// Strategy for turning a time coordinate into weights
pub trait WeightProvider {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Calendar`] when the coordinate lacks the
    /// metadata the strategy needs.
    fn weights(&self, time: &TimeCoordinate) -> Result<WeightSeries>;
}

/// Days in the calendar month of each timestamp (monthly-mean output)
#[derive(Debug, Clone, Copy, Default)]
pub struct DaysInMonth;

impl WeightProvider for DaysInMonth {
    fn weights(&self, time: &TimeCoordinate) -> Result<WeightSeries> {
        let calendar = time.calendar();
        let values = time
            .dates()
            .iter()
            .map(|d| f64::from(calendar.days_in_month(d.year, d.month)))
            .collect();
        WeightSeries::new(values)
    }
}

/// Length of each time cell in days, from the coordinate's bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct CellBounds;

impl WeightProvider for CellBounds {
    fn weights(&self, time: &TimeCoordinate) -> Result<WeightSeries> {
        let bounds = time.bounds().ok_or_else(|| {
            OceanReduceError::Calendar("time coordinate has no cell bounds".to_string())
        })?;
        let scale = time.units().unit.days_per_unit();
        let values: Vec<f64> = bounds.iter().map(|(lo, hi)| (hi - lo) * scale).collect();
        if let Some(i) = values.iter().position(|&d| !(d > 0.0)) {
            return Err(OceanReduceError::Calendar(format!(
                "time cell {i} has non-positive length {}",
                values[i]
            )));
        }
        WeightSeries::new(values)
    }
}

/// Days covered by each timestep: days in the month of each timestamp
///
/// # Errors
///
/// Propagates [`WeightProvider::weights`] errors.
pub fn calendar_weights(time: &TimeCoordinate) -> Result<WeightSeries> {
    DaysInMonth.weights(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Calendar;

    #[test]
    fn test_days_in_month_weights() {
        let time = TimeCoordinate::monthly(Calendar::Standard, 2000, 3).unwrap();
        let w = calendar_weights(&time).unwrap();
        assert_eq!(w.values(), &[31.0, 29.0, 31.0]);
    }

    #[test]
    fn test_cell_bounds_agree_with_days_in_month() {
        let time = TimeCoordinate::monthly(Calendar::NoLeap, 1990, 24).unwrap();
        let from_bounds = CellBounds.weights(&time).unwrap();
        let from_calendar = DaysInMonth.weights(&time).unwrap();
        assert_eq!(from_bounds, from_calendar);
    }

    #[test]
    fn test_rejects_non_positive_weights() {
        assert!(WeightSeries::new(vec![1.0, 0.0]).is_err());
        assert!(WeightSeries::new(vec![1.0, -2.0]).is_err());
        assert!(WeightSeries::new(vec![1.0, f64::NAN]).unwrap().has_missing());
    }

    #[test]
    fn test_normalized_rejects_out_of_range_index() {
        let w = WeightSeries::new(vec![31.0, 28.0]).unwrap();
        assert!(matches!(
            w.normalized(&[0, 2]),
            Err(OceanReduceError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_normalized_group_sums_to_one() {
        let w = WeightSeries::new(vec![31.0, 28.0, 31.0, 30.0]).unwrap();
        let n = w.normalized(&[0, 1, 3]).unwrap();
        assert!((n.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(w.normalized(&[]).is_err());
    }
}
