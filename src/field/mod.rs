//! Lazily evaluated gridded fields
//!
//! A [`GridField`] is a named array over labelled axes. It does not own data:
//! it owns a node of the computation graph (see [`graph`]) plus the metadata
//! describing its axes. Operations build new fields on top of existing ones,
//! and [`GridField::compute`] materialises a field chunk by chunk on an
//! injected [`Executor`].

pub mod axis;
pub mod chunks;
pub mod graph;

pub use axis::{AuxCoord, Axis, Coord};
pub use chunks::{plan_regions, region_shape, ChunkSizes, Region};
pub use graph::{materialize, Kernel, Node, RegionReader};

use crate::errors::{OceanReduceError, Result};
use crate::parallel::Executor;
use crate::time::TimeCoordinate;
use graph::{BinaryKernel, BinaryOp, MemoryKernel, SelectKernel};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

/// A named, lazily evaluated array over labelled axes
#[derive(Debug, Clone)]
pub struct GridField {
    name: String,
    axes: Vec<Axis>,
    aux: Vec<AuxCoord>,
    attributes: BTreeMap<String, String>,
    chunks: ChunkSizes,
    node: Node,
}

impl GridField {
    /// Wrap in-memory data
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the data shape does not
    /// match the axis lengths.
    pub fn from_array(name: impl Into<String>, axes: Vec<Axis>, data: ArrayD<f64>) -> Result<Self> {
        Self::from_node(name, axes, MemoryKernel::node(data))
    }

    /// Wrap an arbitrary graph node
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the node shape does not
    /// match the axis lengths.
    pub fn from_node(name: impl Into<String>, axes: Vec<Axis>, node: Node) -> Result<Self> {
        let name = name.into();
        let expected: Vec<usize> = axes.iter().map(Axis::len).collect();
        if node.shape() != expected.as_slice() {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "field '{name}' has axes of shape {expected:?} but data of shape {:?}",
                node.shape()
            )));
        }
        if let Some(dup) = axes
            .iter()
            .enumerate()
            .find(|(i, a)| axes[..*i].iter().any(|b| b.name() == a.name()))
        {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "field '{name}' repeats axis '{}'",
                dup.1.name()
            )));
        }
        Ok(Self {
            name,
            axes,
            aux: Vec::new(),
            attributes: BTreeMap::new(),
            chunks: ChunkSizes::new(),
            node,
        })
    }

    /// A new field computed from this one
    ///
    /// Attributes and chunk hints carry over; auxiliary coordinates survive
    /// only while their axis is unchanged.
    pub(crate) fn derive(&self, axes: Vec<Axis>, node: Node) -> Result<Self> {
        let mut out = Self::from_node(self.name.clone(), axes, node)?;
        out.attributes = self.attributes.clone();
        out.chunks = self.chunks.clone();
        out.aux = self
            .aux
            .iter()
            .filter(|c| {
                let before = self.axes.iter().find(|a| a.name() == c.axis);
                let after = out.axes.iter().find(|a| a.name() == c.axis);
                matches!((before, after), (Some(b), Some(a)) if a.conforms_to(b))
            })
            .cloned()
            .collect();
        Ok(out)
    }

    /// Set the chunk-shape hint used by [`Self::compute`] and by sinks
    #[must_use]
    pub fn with_chunks(mut self, chunks: ChunkSizes) -> Self {
        self.chunks = chunks;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach an auxiliary coordinate, replacing one of the same name
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::AxisNotFound`] for an unknown axis and
    /// [`OceanReduceError::ShapeMismatch`] if the values do not match its
    /// length.
    pub fn with_aux_coord(mut self, coord: AuxCoord) -> Result<Self> {
        let len = self.axis(&coord.axis)?.len();
        if coord.values.len() != len {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "auxiliary coordinate '{}' has {} values for axis '{}' of length {len}",
                coord.name,
                coord.values.len(),
                coord.axis
            )));
        }
        self.aux.retain(|c| c.name != coord.name);
        self.aux.push(coord);
        Ok(self)
    }

    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    #[must_use]
    pub fn aux_coords(&self) -> &[AuxCoord] {
        &self.aux
    }

    #[must_use]
    pub fn aux_coord(&self, name: &str) -> Option<&AuxCoord> {
        self.aux.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    #[must_use]
    pub const fn chunk_sizes(&self) -> &ChunkSizes {
        &self.chunks
    }

    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    #[must_use]
    pub fn has_axis(&self, name: &str) -> bool {
        self.axes.iter().any(|a| a.name() == name)
    }

    /// Position of the axis called `name`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::AxisNotFound`] if there is no such axis.
    pub fn axis_index(&self, name: &str) -> Result<usize> {
        self.axes
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| OceanReduceError::axis_not_found(&self.name, name))
    }

    /// # Errors
    ///
    /// Returns [`OceanReduceError::AxisNotFound`] if there is no such axis.
    pub fn axis(&self, name: &str) -> Result<&Axis> {
        Ok(&self.axes[self.axis_index(name)?])
    }

    /// Position and coordinate of the calendar time axis
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::AxisNotFound`] if the field has no axis
    /// carrying a time coordinate.
    pub fn time_axis(&self) -> Result<(usize, &TimeCoordinate)> {
        self.axes
            .iter()
            .enumerate()
            .find_map(|(i, a)| a.time_coordinate().map(|t| (i, t)))
            .ok_or_else(|| OceanReduceError::axis_not_found(&self.name, "time"))
    }

    /// Check that `other` has the same axes, in the same order, with the same
    /// coordinates
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] describing the first
    /// difference.
    pub fn ensure_conformable(&self, other: &Self) -> Result<()> {
        if self.axes.len() != other.axes.len() {
            return Err(OceanReduceError::ShapeMismatch(format!(
                "'{}' has {} axes, '{}' has {}",
                self.name,
                self.axes.len(),
                other.name,
                other.axes.len()
            )));
        }
        for (a, b) in self.axes.iter().zip(&other.axes) {
            if !a.conforms_to(b) {
                return Err(OceanReduceError::ShapeMismatch(format!(
                    "axis {} of '{}' does not match axis {} of '{}'",
                    a.describe(),
                    self.name,
                    b.describe(),
                    other.name
                )));
            }
        }
        Ok(())
    }

    fn combine(&self, other: &Self, op: BinaryOp) -> Result<Self> {
        self.ensure_conformable(other)?;
        let node = BinaryKernel::node(self.node.clone(), other.node.clone(), op)?;
        self.derive(self.axes.clone(), node)
    }

    /// Element-wise sum
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the fields are not
    /// conformable.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.combine(other, BinaryOp::Add)
    }

    /// Element-wise difference
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the fields are not
    /// conformable.
    pub fn subtract(&self, other: &Self) -> Result<Self> {
        self.combine(other, BinaryOp::Subtract)
    }

    /// Element-wise product
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ShapeMismatch`] if the fields are not
    /// conformable.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        self.combine(other, BinaryOp::Multiply)
    }

    /// Keep the increasing `indices` of axis `name`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::AxisNotFound`] for an unknown axis and
    /// [`OceanReduceError::Statistics`] for invalid indices.
    pub fn select_axis(&self, name: &str, indices: &[usize]) -> Result<Self> {
        let axis = self.axis_index(name)?;
        let node = SelectKernel::node(self.node.clone(), axis, indices.to_vec())?;
        let mut axes = self.axes.clone();
        axes[axis] = axes[axis].select(indices);
        self.derive(axes, node)
    }

    /// Materialise the whole field on `executor`
    ///
    /// # Errors
    ///
    /// Returns the first error raised while reading or computing a chunk.
    pub fn compute(&self, executor: &dyn Executor) -> Result<ArrayD<f64>> {
        let chunks = self.chunks.resolve(&self.axes)?;
        debug!(field = %self.name, ?chunks, "computing field");
        materialize(&self.node, &chunks, executor)
    }

    /// Human-readable summary of the field's axes, coordinates and graph
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!(
            "{} {:?} ({} graph nodes)\n",
            self.name,
            self.shape(),
            graph::graph_size(&self.node)
        );
        for axis in &self.axes {
            let _ = writeln!(out, "  {}", axis.describe());
        }
        for coord in &self.aux {
            let _ = writeln!(out, "  aux {}({})", coord.name, coord.axis);
        }
        for (key, value) in &self.attributes {
            let _ = writeln!(out, "  :{key} = {value}");
        }
        out
    }
}
