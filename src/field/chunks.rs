//! Chunk-size hints and chunk planning

use super::axis::Axis;
use crate::errors::{OceanReduceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// A hyper-rectangular block of a field, one index range per axis
pub type Region = Vec<Range<usize>>;

/// Chunk length per axis name; `-1` means "whole axis"
///
/// Axes without an entry are kept whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSizes(BTreeMap<String, i64>);

impl ChunkSizes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    #[must_use]
    pub fn with(mut self, axis: impl Into<String>, len: i64) -> Self {
        self.0.insert(axis.into(), len);
        self
    }

    #[must_use]
    pub fn get(&self, axis: &str) -> Option<i64> {
        self.0.get(axis).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }

    /// Concrete chunk shape for `axes`
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Config`] for chunk lengths of zero or
    /// below `-1`.
    pub fn resolve(&self, axes: &[Axis]) -> Result<Vec<usize>> {
        axes.iter()
            .map(|axis| {
                let len = axis.len().max(1);
                match self.get(axis.name()) {
                    None | Some(-1) => Ok(len),
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    Some(n) if n > 0 => Ok((n as usize).min(len)),
                    Some(n) => Err(OceanReduceError::Config(format!(
                        "chunk size {n} for axis '{}' must be positive or -1",
                        axis.name()
                    ))),
                }
            })
            .collect()
    }
}

impl FromIterator<(String, i64)> for ChunkSizes {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Split `shape` into blocks of at most `chunks` along each axis
///
/// A zero-dimensional shape yields a single empty region; an axis of length
/// zero yields no regions.
#[must_use]
pub fn plan_regions(shape: &[usize], chunks: &[usize]) -> Vec<Region> {
    let mut regions: Vec<Region> = vec![Vec::with_capacity(shape.len())];
    for (dim, &len) in shape.iter().enumerate() {
        let step = chunks.get(dim).copied().unwrap_or(len).max(1);
        let ranges: Vec<Range<usize>> = (0..len)
            .step_by(step)
            .map(|start| start..(start + step).min(len))
            .collect();
        regions = regions
            .into_iter()
            .flat_map(|prefix| {
                ranges.iter().map(move |r| {
                    let mut region = prefix.clone();
                    region.push(r.clone());
                    region
                })
            })
            .collect();
    }
    regions
}

/// Shape of a region
#[must_use]
pub fn region_shape(region: &[Range<usize>]) -> Vec<usize> {
    region.iter().map(|r| r.end - r.start).collect()
}
