//! Overturning streamfunctions from transport fields
//!
//! The meridional overturning streamfunction in density space is built from a
//! mass transport `T(..., class, lat, lon)`: sum over longitude, then integrate
//! cumulatively over the density class axis and subtract the column total so
//! that the streamfunction vanishes at the last class.

use super::operations::{MissingPolicy, StatOperation};
use crate::errors::Result;
use crate::field::graph::{CumsumKernel, ReduceKernel, Reducer};
use crate::field::GridField;
use tracing::debug;

/// Sum of `field` over `axis`, missing transport counted as zero
///
/// # Errors
///
/// Returns [`crate::errors::OceanReduceError::AxisNotFound`] for an unknown
/// axis.
pub fn sum_over(field: &GridField, axis: &str) -> Result<GridField> {
    let index = field.axis_index(axis)?;
    let node = ReduceKernel::node(
        field.node().clone(),
        vec![index],
        Reducer::Stat(StatOperation::Sum, MissingPolicy::Skip),
    )?;
    let mut axes = field.axes().to_vec();
    axes.remove(index);
    Ok(field
        .derive(axes, node)?
        .with_attribute("cell_methods", format!("{axis}: sum")))
}

/// `psi = cumsum(S, integrate_axis) - total(S)` with `S = sum(transport, sum_axis)`
///
/// The total is the last running sum, so `psi` is exactly zero at the
/// terminal index of `integrate_axis`.
///
/// # Errors
///
/// Returns [`crate::errors::OceanReduceError::AxisNotFound`] if either axis
/// is missing.
pub fn build_streamfunction(
    transport: &GridField,
    sum_axis: &str,
    integrate_axis: &str,
) -> Result<GridField> {
    let summed = sum_over(transport, sum_axis)?;
    let along = summed.axis_index(integrate_axis)?;
    debug!(
        field = transport.name(),
        sum_axis, integrate_axis, "building streamfunction"
    );

    let node = CumsumKernel::node(summed.node().clone(), along, true);
    Ok(summed.derive(summed.axes().to_vec(), node)?.with_attribute(
        "cell_methods",
        format!("{sum_axis}: sum {integrate_axis}: cumulative sum minus total"),
    ))
}

/// Total streamfunction from two components on identical axes
///
/// # Errors
///
/// Returns [`crate::errors::OceanReduceError::ShapeMismatch`] if the axes
/// disagree.
pub fn add_component(psi: &GridField, other: &GridField) -> Result<GridField> {
    psi.add(other)
}
