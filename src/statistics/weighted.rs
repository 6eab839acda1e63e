//! Weighted temporal reduction
//!
//! Reduces a field along one axis as `sum(f * w) / sum(w)`.

use super::operations::MissingPolicy;
use crate::errors::{OceanReduceError, Result};
use crate::field::graph::{ReduceKernel, Reducer};
use crate::field::GridField;
use crate::time::{calendar_weights, WeightSeries};
use std::sync::Arc;
use tracing::debug;

/// Weighted mean of `field` along `axis`
///
/// Under [`MissingPolicy::Skip`] a missing value drops out of both the
/// numerator and the denominator, so each output element is the weighted mean
/// of whatever was present. Under [`MissingPolicy::Propagate`] any missing
/// value along the axis makes the output element missing. A lane with no
/// values at all is missing either way.
///
/// # Errors
///
/// Returns [`OceanReduceError::AxisNotFound`] for an unknown axis,
/// [`OceanReduceError::ShapeMismatch`] if the weights do not match the axis
/// length and [`OceanReduceError::InvalidWeights`] if any weight is missing.
pub fn weighted_mean(
    field: &GridField,
    weights: &WeightSeries,
    axis: &str,
    policy: MissingPolicy,
) -> Result<GridField> {
    let index = field.axis_index(axis)?;
    let len = field.axes()[index].len();
    if weights.len() != len {
        return Err(OceanReduceError::ShapeMismatch(format!(
            "{} weights for axis '{axis}' of length {len} on '{}'",
            weights.len(),
            field.name()
        )));
    }
    weights.require_complete()?;

    debug!(field = field.name(), axis, len, ?policy, "weighted mean");
    let node = ReduceKernel::node(
        field.node().clone(),
        vec![index],
        Reducer::WeightedMean(Arc::new(weights.values().to_vec()), policy),
    )?;
    let mut axes = field.axes().to_vec();
    axes.remove(index);
    Ok(field
        .derive(axes, node)?
        .with_attribute("cell_methods", format!("{axis}: mean (weighted)")))
}

/// Average over the whole time axis, weighted by days per timestep
///
/// # Errors
///
/// Returns [`OceanReduceError::AxisNotFound`] if the field has no time axis,
/// plus any error of [`weighted_mean`].
pub fn time_mean(field: &GridField, policy: MissingPolicy) -> Result<GridField> {
    let (index, time) = field.time_axis()?;
    let weights = calendar_weights(time)?;
    let name = field.axes()[index].name().to_string();
    weighted_mean(field, &weights, &name, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Axis;
    use crate::parallel::SequentialExecutor;
    use crate::time::{Calendar, TimeCoordinate};
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_time_mean_weights_by_days() {
        // January (31 days) = 0, February 2001 (28 days) = 59
        let time = TimeCoordinate::monthly(Calendar::Standard, 2001, 2).unwrap();
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![0.0, 59.0]).unwrap();
        let field =
            GridField::from_array("tos", vec![Axis::time(time), Axis::index("x", 1)], data)
                .unwrap();
        let mean = time_mean(&field, MissingPolicy::Skip).unwrap();
        assert!(!mean.has_axis("time"));
        let out = mean.compute(&SequentialExecutor).unwrap();
        assert!((out[[0]] - 28.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_wrong_length_and_missing_weights() {
        let data = ArrayD::zeros(IxDyn(&[3]));
        let field = GridField::from_array("v", vec![Axis::index("t", 3)], data).unwrap();
        let short = WeightSeries::uniform(2);
        assert!(matches!(
            weighted_mean(&field, &short, "t", MissingPolicy::Skip),
            Err(OceanReduceError::ShapeMismatch(_))
        ));
        let gappy = WeightSeries::new(vec![1.0, f64::NAN, 1.0]).unwrap();
        assert!(matches!(
            weighted_mean(&field, &gappy, "t", MissingPolicy::Skip),
            Err(OceanReduceError::InvalidWeights(_))
        ));
        assert!(matches!(
            weighted_mean(&field, &WeightSeries::uniform(3), "z", MissingPolicy::Skip),
            Err(OceanReduceError::AxisNotFound { .. })
        ));
    }
}
