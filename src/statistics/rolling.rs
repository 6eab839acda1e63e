//! Trailing-window weighted averages along the time axis

use super::operations::MissingPolicy;
use crate::errors::{OceanReduceError, Result};
use crate::field::graph::RollingKernel;
use crate::field::GridField;
use crate::time::WeightSeries;
use tracing::debug;

/// Twelve monthly steps: annual running mean
pub const ANNUAL_WINDOW: usize = 12;

/// 120 monthly steps: decadal running mean
pub const DECADAL_WINDOW: usize = 120;

/// Weighted running mean over the last `window` timesteps
///
/// Output index `i` holds the weighted mean of `[i - window + 1, i]` with the
/// weights renormalised inside the window; missing weights count as zero.
/// The first `window - 1` outputs are missing. The time axis is kept.
///
/// # Errors
///
/// - [`OceanReduceError::AxisNotFound`] if the field has no time axis
/// - [`OceanReduceError::InvalidWindow`] for a zero window
/// - [`OceanReduceError::ShapeMismatch`] if the weights do not match the
///   time axis
pub fn rolling_weighted_mean(
    field: &GridField,
    weights: &WeightSeries,
    window: usize,
    policy: MissingPolicy,
) -> Result<GridField> {
    let (t_index, time) = field.time_axis()?;
    if window == 0 {
        return Err(OceanReduceError::InvalidWindow {
            window,
            len: time.len(),
        });
    }
    debug!(field = field.name(), window, ?policy, "rolling weighted mean");

    let node = RollingKernel::node(
        field.node().clone(),
        t_index,
        window,
        weights.values().to_vec(),
        policy,
    )?;
    Ok(field.derive(field.axes().to_vec(), node)?.with_attribute(
        "cell_methods",
        format!("time: mean over {window} steps (rolling, weighted)"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Axis, ChunkSizes};
    use crate::parallel::SequentialExecutor;
    use crate::time::{calendar_weights, Calendar, TimeCoordinate};
    use ndarray::{ArrayD, IxDyn};

    fn series(values: Vec<f64>) -> GridField {
        let time = TimeCoordinate::monthly(Calendar::Standard, 2000, values.len()).unwrap();
        let data = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap();
        GridField::from_array("v", vec![Axis::time(time)], data).unwrap()
    }

    #[test]
    fn test_window_of_three() {
        let field = series(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = rolling_weighted_mean(
            &field,
            &WeightSeries::uniform(5),
            3,
            MissingPolicy::Propagate,
        )
        .unwrap()
        .with_chunks(ChunkSizes::new().with("time", 2))
        .compute(&SequentialExecutor)
        .unwrap();
        assert!(out[[0]].is_nan() && out[[1]].is_nan());
        assert!((out[[2]] - 2.0).abs() < 1e-12);
        assert!((out[[4]] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_value_policies() {
        let field = series(vec![1.0, f64::NAN, 3.0, 5.0]);
        let weights = calendar_weights(field.time_axis().unwrap().1).unwrap();
        let strict = rolling_weighted_mean(&field, &weights, 2, MissingPolicy::Propagate)
            .unwrap()
            .compute(&SequentialExecutor)
            .unwrap();
        assert!(strict[[1]].is_nan() && strict[[2]].is_nan());
        let lenient = rolling_weighted_mean(&field, &weights, 2, MissingPolicy::Skip)
            .unwrap()
            .compute(&SequentialExecutor)
            .unwrap();
        assert!((lenient[[2]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_window() {
        let field = series(vec![1.0; 4]);
        assert!(matches!(
            rolling_weighted_mean(&field, &WeightSeries::uniform(4), 0, MissingPolicy::Skip),
            Err(OceanReduceError::InvalidWindow { .. })
        ));
        assert!(matches!(
            rolling_weighted_mean(&field, &WeightSeries::uniform(3), 2, MissingPolicy::Skip),
            Err(OceanReduceError::ShapeMismatch(_))
        ));
    }
}
