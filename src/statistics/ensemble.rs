//! Statistics across ensemble members
//!
//! Members are stacked on a new leading `member` axis and reduced together
//! with any extra axes (typically the bin axis of a climatology) in a single
//! pass per statistic.

use super::operations::{MissingPolicy, StatOperation};
use crate::errors::{OceanReduceError, Result};
use crate::field::graph::{ReduceKernel, Reducer, StackKernel};
use crate::field::{Axis, GridField};
use std::collections::BTreeMap;
use tracing::info;

/// Name of the axis members are stacked along
pub const MEMBER_AXIS: &str = "member";

/// Mean, population standard deviation, maximum and minimum across members
#[derive(Debug, Clone)]
pub struct EnsembleStats {
    pub mean: GridField,
    pub std: GridField,
    pub max: GridField,
    pub min: GridField,
}

impl EnsembleStats {
    /// The four statistics with their operation names
    #[must_use]
    pub fn iter(&self) -> [(StatOperation, &GridField); 4] {
        [
            (StatOperation::Mean, &self.mean),
            (StatOperation::Std, &self.std),
            (StatOperation::Max, &self.max),
            (StatOperation::Min, &self.min),
        ]
    }
}

/// Sort key of a member id: the integers embedded in it, in order
///
/// `r10i1p1f1` sorts after `r2i1p1f1`.
#[must_use]
pub fn member_sort_key(id: &str) -> Vec<u64> {
    id.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Order member ids by their embedded integers, then lexically
pub fn sort_members(ids: &mut [String]) {
    ids.sort_by(|a, b| {
        member_sort_key(a)
            .cmp(&member_sort_key(b))
            .then_with(|| a.cmp(b))
    });
}

/// Stack members on a new leading [`MEMBER_AXIS`] labelled with their ids
///
/// Members are ordered with [`sort_members`].
///
/// # Errors
///
/// - [`OceanReduceError::EmptyEnsemble`] for an empty mapping
/// - [`OceanReduceError::ShapeMismatch`] if members are not conformable
pub fn stack_members(members: &BTreeMap<String, GridField>) -> Result<GridField> {
    let mut ids: Vec<String> = members.keys().cloned().collect();
    sort_members(&mut ids);
    let ordered: Vec<&GridField> = ids.iter().filter_map(|id| members.get(id)).collect();
    let first = *ordered.first().ok_or(OceanReduceError::EmptyEnsemble)?;
    for member in &ordered[1..] {
        first.ensure_conformable(member)?;
    }

    let node = StackKernel::node(ordered.iter().map(|f| f.node().clone()).collect())?;
    let mut axes = vec![Axis::labels(MEMBER_AXIS, ids)];
    axes.extend(first.axes().iter().cloned());
    first.derive(axes, node)
}

/// Ensemble statistics over `member` plus every axis named in `extra_axes`
///
/// Missing values are skipped.
///
/// # Errors
///
/// - [`OceanReduceError::EmptyEnsemble`] for an empty mapping
/// - [`OceanReduceError::ShapeMismatch`] if members are not conformable
/// - [`OceanReduceError::AxisNotFound`] for an unknown extra axis
pub fn ensemble_stats(
    members: &BTreeMap<String, GridField>,
    extra_axes: &[&str],
) -> Result<EnsembleStats> {
    let stacked = stack_members(members)?;

    let mut reduce = vec![0];
    for name in extra_axes {
        let index = stacked.axis_index(name)?;
        if !reduce.contains(&index) {
            reduce.push(index);
        }
    }

    info!(
        "🔄 Aggregating {} members of '{}' over {MEMBER_AXIS} {extra_axes:?}",
        members.len(),
        stacked.name()
    );

    let kept_axes: Vec<Axis> = stacked
        .axes()
        .iter()
        .enumerate()
        .filter(|(i, _)| !reduce.contains(i))
        .map(|(_, a)| a.clone())
        .collect();
    let reduced_names: Vec<&str> = reduce.iter().map(|&i| stacked.axes()[i].name()).collect();

    let statistic = |op: StatOperation| -> Result<GridField> {
        let node = ReduceKernel::node(
            stacked.node().clone(),
            reduce.clone(),
            Reducer::Stat(op, MissingPolicy::Skip),
        )?;
        Ok(stacked
            .derive(kept_axes.clone(), node)?
            .renamed(format!("{}_{}", stacked.name(), op.as_str()))
            .with_attribute(
                "cell_methods",
                format!("{}: {}", reduced_names.join(": "), op.as_str()),
            ))
    };

    Ok(EnsembleStats {
        mean: statistic(StatOperation::Mean)?,
        std: statistic(StatOperation::Std)?,
        max: statistic(StatOperation::Max)?,
        min: statistic(StatOperation::Min)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Coord;
    use crate::parallel::SequentialExecutor;
    use ndarray::{ArrayD, IxDyn};

    fn member(values: Vec<f64>) -> GridField {
        let n = values.len();
        let data = ArrayD::from_shape_vec(IxDyn(&[n]), values).unwrap();
        GridField::from_array("gamma", vec![Axis::values("month", vec![1.0; n])], data).unwrap()
    }

    #[test]
    fn test_member_ordering() {
        let mut ids = vec![
            "r10i1p1f1".to_string(),
            "r2i1p1f1".to_string(),
            "r1i1p1f1".to_string(),
        ];
        sort_members(&mut ids);
        assert_eq!(ids, vec!["r1i1p1f1", "r2i1p1f1", "r10i1p1f1"]);
    }

    #[test]
    fn test_stats_with_extra_axis() {
        let mut members = BTreeMap::new();
        members.insert("r1i1p1f1".to_string(), member(vec![1.0, 3.0]));
        members.insert("r2i1p1f1".to_string(), member(vec![5.0, f64::NAN]));
        let stats = ensemble_stats(&members, &["month"]).unwrap();
        assert_eq!(stats.mean.ndim(), 0);
        let mean = stats.mean.compute(&SequentialExecutor).unwrap();
        assert!((mean.sum() - 3.0).abs() < 1e-12);
        let max = stats.max.compute(&SequentialExecutor).unwrap();
        assert!((max.sum() - 5.0).abs() < 1e-12);
        assert_eq!(stats.std.name(), "gamma_std");
    }

    #[test]
    fn test_member_axis_labels_are_sorted() {
        let mut members = BTreeMap::new();
        members.insert("r10i1p1f1".to_string(), member(vec![0.0]));
        members.insert("r9i1p1f1".to_string(), member(vec![1.0]));
        let stacked = stack_members(&members).unwrap();
        assert_eq!(
            stacked.axis(MEMBER_AXIS).unwrap().coord(),
            &Coord::Labels(vec!["r9i1p1f1".into(), "r10i1p1f1".into()])
        );
        let data = stacked.compute(&SequentialExecutor).unwrap();
        assert_eq!(data[[0, 0]], 1.0);
    }

    #[test]
    fn test_empty_and_mismatched() {
        assert!(matches!(
            ensemble_stats(&BTreeMap::new(), &[]),
            Err(OceanReduceError::EmptyEnsemble)
        ));
        let mut members = BTreeMap::new();
        members.insert("a1".to_string(), member(vec![1.0]));
        members.insert("a2".to_string(), member(vec![1.0, 2.0]));
        assert!(matches!(
            ensemble_stats(&members, &[]),
            Err(OceanReduceError::ShapeMismatch(_))
        ));
        members.remove("a2");
        assert!(matches!(
            ensemble_stats(&members, &["season"]),
            Err(OceanReduceError::AxisNotFound { .. })
        ));
    }
}
