//! Core statistical operations
//!
//! This module defines the reductions the engine knows about and how each one
//! treats missing (NaN) values.

use serde::{Deserialize, Serialize};

/// What a reduction does with missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Ignore missing values; the result is missing only if every input is
    Skip,
    /// Any missing input makes the result missing
    Propagate,
}

impl MissingPolicy {
    #[must_use]
    pub const fn skips(self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// Supported statistical operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Sum of values (an all-missing sum is zero, i.e. no transport)
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Population standard deviation (ddof = 0)
    Std,
}

impl StatOperation {
    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
        }
    }

    /// Reduce a lane of values to a single number
    ///
    /// The standard deviation uses Welford's running update so that lanes are
    /// traversed once.
    pub fn reduce<I>(self, values: I, policy: MissingPolicy) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let mut count = 0_u64;
        let mut sum = 0.0_f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut mean = 0.0_f64;
        let mut m2 = 0.0_f64;

        for x in values {
            if x.is_nan() {
                if !policy.skips() {
                    return f64::NAN;
                }
                continue;
            }
            count += 1;
            sum += x;
            min = min.min(x);
            max = max.max(x);
            #[allow(clippy::cast_precision_loss)]
            let n = count as f64;
            let delta = x - mean;
            mean += delta / n;
            m2 += delta * (x - mean);
        }

        if count == 0 {
            // an all-missing (or empty) sum is zero transport; everything
            // else has no defined value
            return match self {
                Self::Sum => 0.0,
                _ => f64::NAN,
            };
        }

        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        match self {
            Self::Mean => sum / n,
            Self::Sum => sum,
            Self::Min => min,
            Self::Max => max,
            Self::Std => (m2 / n).sqrt(),
        }
    }
}

/// `sum(x * w) / sum(w)` over a lane, honouring `policy`
///
/// Under [`MissingPolicy::Skip`] a missing value removes its weight from the
/// denominator too. A missing weight counts as zero. A zero denominator gives
/// a missing result.
#[must_use]
pub fn weighted_mean_lane<I>(pairs: I, policy: MissingPolicy) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (x, w) in pairs {
        let w = if w.is_nan() { 0.0 } else { w };
        if x.is_nan() {
            if policy.skips() {
                continue;
            }
            return f64::NAN;
        }
        numerator += x * w;
        denominator += w;
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_operation() {
        let values = [5.0, f64::NAN, 7.0];
        assert_eq!(StatOperation::Mean.reduce(values, MissingPolicy::Skip), 6.0);
        assert_eq!(StatOperation::Std.reduce(values, MissingPolicy::Skip), 1.0);
        assert_eq!(StatOperation::Min.reduce(values, MissingPolicy::Skip), 5.0);
        assert!(StatOperation::Max.reduce(values, MissingPolicy::Propagate).is_nan());
        assert_eq!(StatOperation::Sum.as_str(), "sum");
    }

    #[test]
    fn test_all_missing() {
        let values = [f64::NAN, f64::NAN];
        assert_eq!(StatOperation::Sum.reduce(values, MissingPolicy::Skip), 0.0);
        assert!(StatOperation::Mean.reduce(values, MissingPolicy::Skip).is_nan());
        assert!(weighted_mean_lane([(f64::NAN, 1.0)], MissingPolicy::Skip).is_nan());
    }

    #[test]
    fn test_weighted_mean_lane() {
        let pairs = [(1.0, 3.0), (5.0, 1.0), (f64::NAN, 2.0)];
        assert_eq!(weighted_mean_lane(pairs, MissingPolicy::Skip), 2.0);
        assert!(weighted_mean_lane(pairs, MissingPolicy::Propagate).is_nan());
        // a missing weight counts as zero
        assert_eq!(weighted_mean_lane([(1.0, f64::NAN), (4.0, 1.0)], MissingPolicy::Skip), 4.0);
    }
}
