//! Deferred computation graph over chunk regions
//!
//! Every operation on a [`GridField`](super::GridField) produces a new node
//! that keeps its inputs alive through `Arc`s. A node can evaluate any
//! hyper-rectangular region of its output by pulling the regions it needs from
//! its inputs, so nothing is read or computed until a region is requested.
//! Nodes are immutable and shareable across threads.

use super::chunks::{plan_regions, region_shape};
use crate::errors::{OceanReduceError, Result};
use crate::parallel::Executor;
use crate::statistics::operations::{MissingPolicy, StatOperation};
use crate::statistics::parallel::{parallel_reduce_axes, parallel_weighted_mean_axis};
use ndarray::{stack, ArrayD, ArrayViewD, Axis, IxDyn, Slice, Zip};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to a graph node
pub type Node = Arc<dyn Kernel>;

/// A pure function from input regions to one output region
pub trait Kernel: Send + Sync + fmt::Debug {
    /// Full output shape
    fn shape(&self) -> &[usize];

    /// Short operation name for logs and graph descriptions
    fn label(&self) -> &'static str;

    /// Upstream nodes
    fn inputs(&self) -> Vec<&Node> {
        Vec::new()
    }

    /// Compute the block covering `region` (one range per output axis)
    ///
    /// # Errors
    ///
    /// Propagates read failures from sources and shape errors.
    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>>;
}

/// Something that can read a region of a stored variable
pub trait RegionReader: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns the storage backend's error.
    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>>;
}

fn slice_view<'a>(data: &'a ArrayD<f64>, region: &[Range<usize>]) -> ArrayViewD<'a, f64> {
    data.slice_each_axis(|ax| Slice::from(region[ax.axis.index()].clone()))
}

/// Replace the range of `axis` in `region`
fn with_axis_range(region: &[Range<usize>], axis: usize, range: Range<usize>) -> Vec<Range<usize>> {
    let mut out = region.to_vec();
    out[axis] = range;
    out
}

/// Number of nodes reachable from `node`, counting shared nodes once per path
#[must_use]
pub fn graph_size(node: &Node) -> usize {
    1 + node.inputs().iter().map(|n| graph_size(n)).sum::<usize>()
}

/// Evaluate `node` chunk by chunk on `executor` and assemble the result
///
/// # Errors
///
/// Returns the first chunk error.
pub fn materialize(node: &Node, chunks: &[usize], executor: &dyn Executor) -> Result<ArrayD<f64>> {
    let shape = node.shape().to_vec();
    let regions = plan_regions(&shape, chunks);
    debug!(
        op = node.label(),
        chunks = regions.len(),
        nodes = graph_size(node),
        workers = executor.workers(),
        "materializing"
    );

    let blocks = executor.execute(&regions, &|region| node.evaluate(region))?;

    let mut out = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    for (region, block) in regions.iter().zip(blocks) {
        if block.shape() != region_shape(region).as_slice() {
            return Err(OceanReduceError::Statistics(format!(
                "{} produced a block of shape {:?} for region {:?}",
                node.label(),
                block.shape(),
                region
            )));
        }
        out.slice_each_axis_mut(|ax| Slice::from(region[ax.axis.index()].clone()))
            .assign(&block);
    }
    Ok(out)
}

/// Fully materialised data held in memory
#[derive(Debug)]
pub struct MemoryKernel {
    data: Arc<ArrayD<f64>>,
}

impl MemoryKernel {
    #[must_use]
    pub fn node(data: ArrayD<f64>) -> Node {
        Arc::new(Self {
            data: Arc::new(data),
        })
    }
}

impl Kernel for MemoryKernel {
    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    fn label(&self) -> &'static str {
        "memory"
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        Ok(slice_view(&self.data, region).to_owned())
    }
}

/// Data read lazily from storage
#[derive(Debug)]
pub struct SourceKernel {
    shape: Vec<usize>,
    reader: Arc<dyn RegionReader>,
}

impl SourceKernel {
    #[must_use]
    pub fn node(shape: Vec<usize>, reader: Arc<dyn RegionReader>) -> Node {
        Arc::new(Self { shape, reader })
    }
}

impl Kernel for SourceKernel {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn label(&self) -> &'static str {
        "source"
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        self.reader.read_region(region)
    }
}

/// Element-wise arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
}

/// Element-wise combination of two same-shaped nodes
#[derive(Debug)]
pub struct BinaryKernel {
    lhs: Node,
    rhs: Node,
    op: BinaryOp,
}

impl BinaryKernel {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the shapes differ.
    pub fn node(lhs: Node, rhs: Node, op: BinaryOp) -> Result<Node> {
        if lhs.shape() != rhs.shape() {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "cannot combine shapes {:?} and {:?}",
                lhs.shape(),
                rhs.shape()
            )));
        }
        Ok(Arc::new(Self { lhs, rhs, op }))
    }
}

impl Kernel for BinaryKernel {
    fn shape(&self) -> &[usize] {
        self.lhs.shape()
    }

    fn label(&self) -> &'static str {
        match self.op {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
        }
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.lhs, &self.rhs]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let mut left = self.lhs.evaluate(region)?;
        let right = self.rhs.evaluate(region)?;
        let op = self.op;
        Zip::from(&mut left).and(&right).for_each(|l, &r| {
            *l = match op {
                BinaryOp::Add => *l + r,
                BinaryOp::Subtract => *l - r,
                BinaryOp::Multiply => *l * r,
            };
        });
        Ok(left)
    }
}

/// Picks a subset of indices along one axis
#[derive(Debug)]
pub struct SelectKernel {
    input: Node,
    axis: usize,
    indices: Arc<Vec<usize>>,
    shape: Vec<usize>,
}

impl SelectKernel {
    /// `indices` must be increasing and in bounds
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Statistics`] for out-of-range or
    /// unordered indices.
    pub fn node(input: Node, axis: usize, indices: Vec<usize>) -> Result<Node> {
        let len = input.shape()[axis];
        if indices.windows(2).any(|w| w[1] <= w[0]) || indices.iter().any(|&i| i >= len) {
            return Err(OceanReduceError::Statistics(format!(
                "invalid selection along axis {axis} of length {len}"
            )));
        }
        let mut shape = input.shape().to_vec();
        shape[axis] = indices.len();
        Ok(Arc::new(Self {
            input,
            axis,
            indices: Arc::new(indices),
            shape,
        }))
    }
}

impl Kernel for SelectKernel {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn label(&self) -> &'static str {
        "select"
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.input]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let wanted = &self.indices[region[self.axis].clone()];
        let (Some(&lo), Some(&hi)) = (wanted.first(), wanted.last()) else {
            return Ok(ArrayD::zeros(IxDyn(&region_shape(region))));
        };
        let block = self
            .input
            .evaluate(&with_axis_range(region, self.axis, lo..hi + 1))?;
        let local: Vec<usize> = wanted.iter().map(|&i| i - lo).collect();
        Ok(block.select(Axis(self.axis), &local))
    }
}

/// How a [`ReduceKernel`] collapses its lanes
#[derive(Debug, Clone)]
pub enum Reducer {
    /// Plain statistic over every reduced axis
    Stat(StatOperation, MissingPolicy),
    /// Weighted mean along a single axis, one weight per index
    WeightedMean(Arc<Vec<f64>>, MissingPolicy),
}

/// Removes one or more axes by reduction
#[derive(Debug)]
pub struct ReduceKernel {
    input: Node,
    axes: Vec<usize>,
    reducer: Reducer,
    shape: Vec<usize>,
}

impl ReduceKernel {
    /// # Errors
    ///
    /// Returns an error for out-of-range axes, or a weighted reducer that is
    /// not applied to exactly one axis of matching length.
    pub fn node(input: Node, mut axes: Vec<usize>, reducer: Reducer) -> Result<Node> {
        axes.sort_unstable();
        axes.dedup();
        let ndim = input.shape().len();
        if axes.iter().any(|&a| a >= ndim) {
            return Err(OceanReduceError::Statistics(format!(
                "reduction axes {axes:?} out of bounds for {ndim} dimensions"
            )));
        }
        if let Reducer::WeightedMean(weights, _) = &reducer {
            if axes.len() != 1 || weights.len() != input.shape()[axes[0]] {
                return Err(OceanReduceError::ShapeMismatch(format!(
                    "{} weights for reduction over axes {axes:?} of shape {:?}",
                    weights.len(),
                    input.shape()
                )));
            }
        }
        let shape = input
            .shape()
            .iter()
            .enumerate()
            .filter(|(d, _)| !axes.contains(d))
            .map(|(_, &n)| n)
            .collect();
        Ok(Arc::new(Self {
            input,
            axes,
            reducer,
            shape,
        }))
    }
}

impl Kernel for ReduceKernel {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn label(&self) -> &'static str {
        match &self.reducer {
            Reducer::Stat(op, _) => op.as_str(),
            Reducer::WeightedMean(..) => "weighted_mean",
        }
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.input]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        // reduced axes are read whole, kept axes follow the requested region
        let mut kept = region.iter();
        let input_region: Vec<Range<usize>> = self
            .input
            .shape()
            .iter()
            .enumerate()
            .map(|(d, &n)| {
                if self.axes.contains(&d) {
                    Ok(0..n)
                } else {
                    kept.next().cloned().ok_or_else(|| {
                        OceanReduceError::Statistics("region rank mismatch".to_string())
                    })
                }
            })
            .collect::<Result<_>>()?;
        let block = self.input.evaluate(&input_region)?;

        match &self.reducer {
            Reducer::Stat(op, policy) => parallel_reduce_axes(&block, &self.axes, *op, *policy),
            Reducer::WeightedMean(weights, policy) => {
                parallel_weighted_mean_axis(&block, self.axes[0], weights, *policy)
            }
        }
    }
}

/// One output bin of a [`GroupKernel`]: input indices and their weights
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub indices: Vec<usize>,
    pub weights: Vec<f64>,
}

/// How a [`GroupKernel`] combines the members of a bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupReducer {
    /// Weighted mean with the group's weights
    WeightedMean(MissingPolicy),
    /// Maximum, missing values skipped
    Max,
}

/// Running `sum(x * w)` and `sum(w)` over slabs of equal shape
///
/// Element-wise version of [`crate::statistics::weighted_mean_lane`]: a
/// missing weight counts as zero, a missing value is dropped under
/// [`MissingPolicy::Skip`] and poisons its element otherwise.
struct WeightedSum {
    numerator: ArrayD<f64>,
    denominator: ArrayD<f64>,
    poisoned: ArrayD<bool>,
}

impl WeightedSum {
    fn new(shape: &[usize]) -> Self {
        Self {
            numerator: ArrayD::zeros(IxDyn(shape)),
            denominator: ArrayD::zeros(IxDyn(shape)),
            poisoned: ArrayD::from_elem(IxDyn(shape), false),
        }
    }

    fn add(&mut self, slab: ArrayViewD<'_, f64>, weight: f64, policy: MissingPolicy) {
        let w = if weight.is_nan() { 0.0 } else { weight };
        let skips = policy.skips();
        Zip::from(&mut self.numerator)
            .and(&mut self.denominator)
            .and(&mut self.poisoned)
            .and(&slab)
            .for_each(|n, d, p, &x| {
                if x.is_nan() {
                    *p |= !skips;
                } else {
                    *n += w * x;
                    *d += w;
                }
            });
    }

    fn finish(mut self) -> ArrayD<f64> {
        Zip::from(&mut self.numerator)
            .and(&self.denominator)
            .and(&self.poisoned)
            .for_each(|n, &d, &p| *n = if p || d <= 0.0 { f64::NAN } else { *n / d });
        self.numerator
    }
}

/// Replaces one axis by one entry per group of its indices
#[derive(Debug)]
pub struct GroupKernel {
    input: Node,
    axis: usize,
    groups: Arc<Vec<Group>>,
    reducer: GroupReducer,
    shape: Vec<usize>,
}

impl GroupKernel {
    /// # Errors
    ///
    /// Returns an error for empty groups, out-of-range indices or weight
    /// vectors that do not match their indices.
    pub fn node(input: Node, axis: usize, groups: Vec<Group>, reducer: GroupReducer) -> Result<Node> {
        let len = input.shape()[axis];
        for (b, g) in groups.iter().enumerate() {
            if g.indices.is_empty()
                || g.indices.len() != g.weights.len()
                || g.indices.iter().any(|&i| i >= len)
            {
                return Err(OceanReduceError::Statistics(format!(
                    "group {b} is empty or inconsistent with an axis of length {len}"
                )));
            }
        }
        let mut shape = input.shape().to_vec();
        shape[axis] = groups.len();
        Ok(Arc::new(Self {
            input,
            axis,
            groups: Arc::new(groups),
            reducer,
            shape,
        }))
    }
}

impl Kernel for GroupKernel {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn label(&self) -> &'static str {
        match self.reducer {
            GroupReducer::WeightedMean(_) => "group_weighted_mean",
            GroupReducer::Max => "group_max",
        }
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.input]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let groups = &self.groups[region[self.axis].clone()];
        let lo = groups
            .iter()
            .flat_map(|g| g.indices.iter())
            .min()
            .copied()
            .unwrap_or(0);
        let hi = groups
            .iter()
            .flat_map(|g| g.indices.iter())
            .max()
            .map_or(0, |&i| i + 1);
        if groups.is_empty() {
            return Ok(ArrayD::zeros(IxDyn(&region_shape(region))));
        }
        let block = self
            .input
            .evaluate(&with_axis_range(region, self.axis, lo..hi))?;

        let mut lane_shape = block.shape().to_vec();
        lane_shape.remove(self.axis);

        let mut bins = Vec::with_capacity(groups.len());
        for group in groups {
            let bin = match self.reducer {
                GroupReducer::WeightedMean(policy) => {
                    let mut acc = WeightedSum::new(&lane_shape);
                    for (&i, &w) in group.indices.iter().zip(&group.weights) {
                        acc.add(block.index_axis(Axis(self.axis), i - lo), w, policy);
                    }
                    acc.finish()
                }
                GroupReducer::Max => {
                    let mut acc = ArrayD::from_elem(IxDyn(&lane_shape), f64::NAN);
                    for &i in &group.indices {
                        let slab = block.index_axis(Axis(self.axis), i - lo);
                        Zip::from(&mut acc).and(&slab).for_each(|a, &x| {
                            if !x.is_nan() && (a.is_nan() || x > *a) {
                                *a = x;
                            }
                        });
                    }
                    acc
                }
            };
            bins.push(bin);
        }

        let views: Vec<ArrayViewD<'_, f64>> = bins.iter().map(ArrayD::view).collect();
        Ok(stack(Axis(self.axis), &views)?)
    }
}

/// Trailing-window weighted mean along one axis
#[derive(Debug)]
pub struct RollingKernel {
    input: Node,
    axis: usize,
    window: usize,
    weights: Arc<Vec<f64>>,
    policy: MissingPolicy,
}

impl RollingKernel {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::InvalidWindow`] for a zero window and
    /// [`OceanReduceError::ShapeMismatch`] if the weights do not match the
    /// axis length.
    pub fn node(
        input: Node,
        axis: usize,
        window: usize,
        weights: Vec<f64>,
        policy: MissingPolicy,
    ) -> Result<Node> {
        let len = input.shape()[axis];
        if window == 0 {
            return Err(OceanReduceError::InvalidWindow { window, len });
        }
        if weights.len() != len {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "{} weights for a time axis of length {len}",
                weights.len()
            )));
        }
        Ok(Arc::new(Self {
            input,
            axis,
            window,
            weights: Arc::new(weights),
            policy,
        }))
    }
}

impl Kernel for RollingKernel {
    fn shape(&self) -> &[usize] {
        self.input.shape()
    }

    fn label(&self) -> &'static str {
        "rolling_weighted_mean"
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.input]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let wanted = region[self.axis].clone();
        let mut lane_shape = region_shape(region);
        lane_shape.remove(self.axis);
        if wanted.is_empty() {
            return Ok(ArrayD::zeros(IxDyn(&region_shape(region))));
        }

        let lo = wanted.start.saturating_sub(self.window - 1);
        let block = self
            .input
            .evaluate(&with_axis_range(region, self.axis, lo..wanted.end))?;

        let mut steps = Vec::with_capacity(wanted.len());
        for i in wanted {
            if i + 1 < self.window {
                steps.push(ArrayD::from_elem(IxDyn(&lane_shape), f64::NAN));
                continue;
            }
            let first = i + 1 - self.window;
            let mut acc = WeightedSum::new(&lane_shape);
            for k in first..=i {
                acc.add(block.index_axis(Axis(self.axis), k - lo), self.weights[k], self.policy);
            }
            steps.push(acc.finish());
        }

        let views: Vec<ArrayViewD<'_, f64>> = steps.iter().map(ArrayD::view).collect();
        Ok(stack(Axis(self.axis), &views)?)
    }
}

/// Cumulative sum along one axis, optionally anchored so the last index is zero
#[derive(Debug)]
pub struct CumsumKernel {
    input: Node,
    axis: usize,
    anchored: bool,
}

impl CumsumKernel {
    #[must_use]
    pub fn node(input: Node, axis: usize, anchored: bool) -> Node {
        Arc::new(Self {
            input,
            axis,
            anchored,
        })
    }
}

impl Kernel for CumsumKernel {
    fn shape(&self) -> &[usize] {
        self.input.shape()
    }

    fn label(&self) -> &'static str {
        if self.anchored {
            "anchored_cumsum"
        } else {
            "cumsum"
        }
    }

    fn inputs(&self) -> Vec<&Node> {
        vec![&self.input]
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let len = self.input.shape()[self.axis];
        let mut block = self
            .input
            .evaluate(&with_axis_range(region, self.axis, 0..len))?;
        if len == 0 {
            return Ok(block);
        }

        // missing transport contributes nothing to the running total
        block.mapv_inplace(|x| if x.is_nan() { 0.0 } else { x });
        block.accumulate_axis_inplace(Axis(self.axis), |&prev, curr| *curr += prev);

        if self.anchored {
            // the total is the last running sum itself, so the terminal index
            // cancels to exactly zero
            let total = block.index_axis(Axis(self.axis), len - 1).to_owned();
            let total = total.insert_axis(Axis(self.axis));
            block -= &total;
        }

        let range = region[self.axis].clone();
        Ok(block
            .slice_axis(Axis(self.axis), Slice::from(range))
            .to_owned())
    }
}

/// Stacks same-shaped nodes along a new leading axis
#[derive(Debug)]
pub struct StackKernel {
    members: Vec<Node>,
    shape: Vec<usize>,
}

impl StackKernel {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if member shapes differ and
    /// [`OceanReduceError::EmptyEnsemble`] if there are no members.
    pub fn node(members: Vec<Node>) -> Result<Node> {
        let first = members.first().ok_or(OceanReduceError::EmptyEnsemble)?;
        let inner = first.shape().to_vec();
        if let Some(bad) = members.iter().find(|m| m.shape() != inner.as_slice()) {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "cannot stack shape {:?} with {:?}",
                bad.shape(),
                inner
            )));
        }
        let mut shape = vec![members.len()];
        shape.extend(inner);
        Ok(Arc::new(Self { members, shape }))
    }
}

impl Kernel for StackKernel {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn label(&self) -> &'static str {
        "stack"
    }

    fn inputs(&self) -> Vec<&Node> {
        self.members.iter().collect()
    }

    fn evaluate(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let (members, inner) = region.split_first().ok_or_else(|| {
            OceanReduceError::Statistics("stack region has no member axis".to_string())
        })?;
        if members.is_empty() {
            return Ok(ArrayD::zeros(IxDyn(&region_shape(region))));
        }
        let blocks = self.members[members.clone()]
            .iter()
            .map(|m| m.evaluate(inner))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayViewD<'_, f64>> = blocks.iter().map(ArrayD::view).collect();
        Ok(stack(Axis(0), &views)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SequentialExecutor;

    fn ramp(shape: &[usize]) -> ArrayD<f64> {
        let n: usize = shape.iter().product();
        #[allow(clippy::cast_precision_loss)]
        let values = (0..n).map(|i| i as f64).collect();
        ArrayD::from_shape_vec(shape.to_vec(), values).unwrap()
    }

    #[test]
    fn test_chunked_materialize_matches_whole() {
        let node = MemoryKernel::node(ramp(&[6, 4]));
        let reduced = ReduceKernel::node(
            node,
            vec![0],
            Reducer::Stat(StatOperation::Sum, MissingPolicy::Skip),
        )
        .unwrap();
        let whole = materialize(&reduced, &[4], &SequentialExecutor).unwrap();
        let chunked = materialize(&reduced, &[1], &SequentialExecutor).unwrap();
        assert_eq!(whole, chunked);
        // column 0: 0 + 4 + 8 + 12 + 16 + 20
        assert!((whole[[0]] - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_select_kernel() {
        let node = MemoryKernel::node(ramp(&[5, 2]));
        let sel = SelectKernel::node(node, 0, vec![1, 3, 4]).unwrap();
        let out = materialize(&sel, &[2, 2], &SequentialExecutor).unwrap();
        assert_eq!(out.shape(), &[3, 2]);
        assert!((out[[1, 0]] - 6.0).abs() < 1e-12);
        assert!((out[[2, 1]] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_anchored_cumsum_chunked_along_axis() {
        let node = MemoryKernel::node(ramp(&[4, 3]));
        let psi = CumsumKernel::node(node, 0, true);
        let out = materialize(&psi, &[1, 3], &SequentialExecutor).unwrap();
        for j in 0..3 {
            assert_eq!(out[[3, j]], 0.0);
        }
    }

    #[test]
    fn test_rolling_kernel_weights_and_missing_values() {
        // (time, x): column 0 is 0, 10, 20, 30; column 1 has a gap at t = 1
        let mut data = ramp(&[4, 2]) * 5.0;
        data[[1, 1]] = f64::NAN;
        let weights = vec![1.0, 3.0, 1.0, 1.0];

        let propagate = RollingKernel::node(
            MemoryKernel::node(data.clone()),
            0,
            2,
            weights.clone(),
            MissingPolicy::Propagate,
        )
        .unwrap();
        let whole = materialize(&propagate, &[4, 2], &SequentialExecutor).unwrap();
        let chunked = materialize(&propagate, &[1, 1], &SequentialExecutor).unwrap();
        assert!(whole[[0, 0]].is_nan());
        // (0 * 1 + 10 * 3) / 4
        assert!((whole[[1, 0]] - 7.5).abs() < 1e-12);
        assert!((whole[[2, 0]] - 12.5).abs() < 1e-12);
        assert!(whole[[1, 1]].is_nan() && whole[[2, 1]].is_nan());
        assert!((whole[[3, 1]] - 30.0).abs() < 1e-12);
        for (a, b) in whole.iter().zip(chunked.iter()) {
            assert!((a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-12);
        }

        let skip = RollingKernel::node(MemoryKernel::node(data), 0, 2, weights, MissingPolicy::Skip)
            .unwrap();
        let out = materialize(&skip, &[2, 2], &SequentialExecutor).unwrap();
        // the gap drops out with its weight
        assert!((out[[1, 1]] - 5.0).abs() < 1e-12);
        assert!((out[[2, 1]] - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_stack_rejects_mismatched_members() {
        let a = MemoryKernel::node(ramp(&[2]));
        let b = MemoryKernel::node(ramp(&[3]));
        assert!(matches!(
            StackKernel::node(vec![a, b]),
            Err(OceanReduceError::ShapeMismatch(_))
        ));
        assert!(matches!(
            StackKernel::node(Vec::new()),
            Err(OceanReduceError::EmptyEnsemble)
        ));
    }
}
