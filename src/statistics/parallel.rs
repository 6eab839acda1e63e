//! Parallel computation implementations for statistical operations
//!
//! These work on one materialised block at a time. The reduced axes are moved
//! to the back and flattened so that every output element owns one contiguous
//! lane, and lanes are reduced in parallel.

use super::operations::{weighted_mean_lane, MissingPolicy, StatOperation};
use crate::errors::{OceanReduceError, Result};
use ndarray::{Array2, ArrayD, Axis, IxDyn};
use rayon::prelude::*;

/// Reorder `data` as a `(kept elements, reduced elements)` matrix
///
/// Returns the matrix and the shape of the kept axes.
fn lanes_matrix(data: &ArrayD<f64>, axes: &[usize]) -> Result<(Array2<f64>, Vec<usize>)> {
    let ndim = data.ndim();
    if let Some(bad) = axes.iter().find(|&&a| a >= ndim) {
        return Err(OceanReduceError::Statistics(format!(
            "Axis {bad} is out of bounds for array with {ndim} dimensions"
        )));
    }

    let kept: Vec<usize> = (0..ndim).filter(|d| !axes.contains(d)).collect();
    let kept_shape: Vec<usize> = kept.iter().map(|&d| data.shape()[d]).collect();
    let lane_len: usize = axes.iter().map(|&d| data.shape()[d]).product();
    let n_lanes: usize = kept_shape.iter().product();

    let mut order = kept;
    order.extend_from_slice(axes);
    let permuted = data.view().permuted_axes(IxDyn(&order));
    let contiguous = permuted.as_standard_layout().into_owned();
    let matrix = contiguous.into_shape((n_lanes, lane_len))?;
    Ok((matrix, kept_shape))
}

/// Reduces `data` over every axis in `axes` at once using parallel processing
///
/// # Errors
///
/// Returns an error if an axis is out of bounds or reshaping fails.
pub fn parallel_reduce_axes(
    data: &ArrayD<f64>,
    axes: &[usize],
    operation: StatOperation,
    policy: MissingPolicy,
) -> Result<ArrayD<f64>> {
    let (lanes, kept_shape) = lanes_matrix(data, axes)?;

    let result: Vec<f64> = lanes
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|lane| operation.reduce(lane.iter().copied(), policy))
        .collect();

    Ok(ArrayD::from_shape_vec(kept_shape, result)?)
}

/// Computes a weighted mean along one axis using parallel processing
///
/// `weights[k]` applies to index `k` of `axis`.
///
/// # Errors
///
/// Returns an error if the axis is invalid or the weights do not match its
/// length.
pub fn parallel_weighted_mean_axis(
    data: &ArrayD<f64>,
    axis: usize,
    weights: &[f64],
    policy: MissingPolicy,
) -> Result<ArrayD<f64>> {
    let (lanes, kept_shape) = lanes_matrix(data, &[axis])?;
    if lanes.ncols() != weights.len() {
        return Err(OceanReduceError::ShapeMismatch(format!(
            "{} weights for an axis of length {}",
            weights.len(),
            lanes.ncols()
        )));
    }

    let result: Vec<f64> = lanes
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|lane| weighted_mean_lane(lane.iter().copied().zip(weights.iter().copied()), policy))
        .collect();

    Ok(ArrayD::from_shape_vec(kept_shape, result)?)
}
