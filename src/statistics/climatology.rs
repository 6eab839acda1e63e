//! Climatological binning of monthly time series
//!
//! Timesteps are grouped by calendar month, season or year, and each group is
//! reduced with its days-per-month weights normalised to one within the group.
//! The result replaces the time axis with a bin axis and carries the mean
//! number of days of each bin as the auxiliary coordinate
//! [`MEAN_DAYS_COORD`].

use super::operations::{MissingPolicy, StatOperation};
use crate::errors::{OceanReduceError, Result};
use crate::field::graph::{Group, GroupKernel, GroupReducer, ReduceKernel, Reducer};
use crate::field::{AuxCoord, Axis, GridField};
use crate::time::{calendar_weights, CalendarDate, TimeCoordinate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Name of the per-bin mean-days auxiliary coordinate
pub const MEAN_DAYS_COORD: &str = "mean_days_in_month";

/// How timesteps are grouped into climatological bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LumpBy {
    Month,
    Season,
    Year,
}

impl LumpBy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Season => "season",
            Self::Year => "year",
        }
    }

    /// Bin a single date
    #[must_use]
    pub const fn key(self, date: &CalendarDate) -> BinKey {
        match self {
            Self::Month => BinKey::Month(date.month),
            Self::Season => BinKey::Season(Season::of_month(date.month)),
            Self::Year => BinKey::Year(date.year),
        }
    }

    /// Bins that must all be present, if the set is fixed
    fn fixed_bins(self) -> Option<Vec<BinKey>> {
        match self {
            Self::Month => Some((1..=12).map(BinKey::Month).collect()),
            Self::Season => Some(Season::ALL.iter().copied().map(BinKey::Season).collect()),
            Self::Year => None,
        }
    }
}

impl fmt::Display for LumpBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LumpBy {
    type Err = OceanReduceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "season" => Ok(Self::Season),
            "year" => Ok(Self::Year),
            other => Err(OceanReduceError::Config(format!(
                "unknown lumpby '{other}', expected month, season or year"
            ))),
        }
    }
}

/// Meteorological seasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Season {
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    /// Calendar order, starting with the season that contains January
    pub const ALL: [Self; 4] = [Self::Djf, Self::Mam, Self::Jja, Self::Son];

    #[must_use]
    pub const fn of_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Mam,
            6..=8 => Self::Jja,
            9..=11 => Self::Son,
            _ => Self::Djf,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Djf => "DJF",
            Self::Mam => "MAM",
            Self::Jja => "JJA",
            Self::Son => "SON",
        }
    }
}

/// Identity of one climatological bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinKey {
    Month(u32),
    Season(Season),
    Year(i32),
}

impl fmt::Display for BinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month(m) => write!(f, "month {m}"),
            Self::Season(s) => f.write_str(s.as_str()),
            Self::Year(y) => write!(f, "year {y}"),
        }
    }
}

/// The ordered bins of `time` and the timesteps falling in each
fn partition(time: &TimeCoordinate, lumpby: LumpBy) -> Result<Vec<(BinKey, Vec<usize>)>> {
    if time.is_empty() {
        return Err(OceanReduceError::InsufficientData {
            bin: "time".to_string(),
        });
    }
    let keys: Vec<BinKey> = time.dates().iter().map(|d| lumpby.key(d)).collect();
    let bins = lumpby.fixed_bins().unwrap_or_else(|| {
        let mut present = keys.clone();
        present.sort_unstable();
        present.dedup();
        present
    });

    bins.into_iter()
        .map(|bin| {
            let members: Vec<usize> = keys
                .iter()
                .enumerate()
                .filter(|(_, k)| **k == bin)
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                Err(OceanReduceError::InsufficientData {
                    bin: bin.to_string(),
                })
            } else {
                Ok((bin, members))
            }
        })
        .collect()
}

fn bin_axis(lumpby: LumpBy, bins: &[BinKey]) -> Axis {
    match lumpby {
        LumpBy::Season => Axis::labels(
            "season",
            bins.iter()
                .map(|b| match b {
                    BinKey::Season(s) => s.as_str().to_string(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        LumpBy::Month | LumpBy::Year => Axis::values(
            lumpby.as_str(),
            bins.iter()
                .map(|b| match b {
                    BinKey::Month(m) => f64::from(*m),
                    BinKey::Year(y) => f64::from(*y),
                    BinKey::Season(_) => f64::NAN,
                })
                .collect(),
        ),
    }
}

/// Weighted climatology of `field` binned by `lumpby`
///
/// # Errors
///
/// - [`OceanReduceError::AxisNotFound`] if the field has no time axis
/// - [`OceanReduceError::InsufficientData`] if the time axis is empty or a
///   month/season bin has no timesteps
/// - [`OceanReduceError::InvalidWeights`] if a bin's normalised weights fail
///   the sum check
pub fn climatology(field: &GridField, lumpby: LumpBy, policy: MissingPolicy) -> Result<GridField> {
    let (t_index, time) = field.time_axis()?;
    let weights = calendar_weights(time)?;
    let bins = partition(time, lumpby)?;

    let mut groups = Vec::with_capacity(bins.len());
    let mut mean_days = Vec::with_capacity(bins.len());
    for (bin, indices) in &bins {
        let normalized = weights.normalized(indices)?;
        #[allow(clippy::cast_precision_loss)]
        let days = indices.iter().map(|&i| weights.values()[i]).sum::<f64>() / indices.len() as f64;
        debug!(bin = %bin, steps = indices.len(), days, "climatology bin");
        mean_days.push(days);
        groups.push(Group {
            indices: indices.clone(),
            weights: normalized,
        });
    }

    let keys: Vec<BinKey> = bins.iter().map(|(k, _)| *k).collect();
    let axis = bin_axis(lumpby, &keys);
    let axis_name = axis.name().to_string();
    info!(
        "📊 Binning '{}' by {lumpby}: {} timesteps into {} bins",
        field.name(),
        time.len(),
        keys.len()
    );

    let node = GroupKernel::node(
        field.node().clone(),
        t_index,
        groups,
        GroupReducer::WeightedMean(policy),
    )?;
    let mut axes = field.axes().to_vec();
    axes[t_index] = axis;
    field
        .derive(axes, node)?
        .with_attribute("cell_methods", format!("time: mean within {lumpby}s (weighted)"))
        .with_aux_coord(AuxCoord::new(MEAN_DAYS_COORD, axis_name, mean_days))
}

/// Maximum within each calendar year, then the plain mean over years
///
/// Missing values are skipped in both steps.
///
/// # Errors
///
/// Returns [`OceanReduceError::AxisNotFound`] if the field has no time axis
/// and [`OceanReduceError::InsufficientData`] if it is empty.
pub fn mean_of_yearly_max(field: &GridField) -> Result<GridField> {
    let (t_index, time) = field.time_axis()?;
    let groups: Vec<Group> = partition(time, LumpBy::Year)?
        .into_iter()
        .map(|(_, indices)| Group {
            weights: vec![1.0; indices.len()],
            indices,
        })
        .collect();
    let n_years = groups.len();

    let yearly = GroupKernel::node(field.node().clone(), t_index, groups, GroupReducer::Max)?;
    let node = ReduceKernel::node(
        yearly,
        vec![t_index],
        Reducer::Stat(StatOperation::Mean, MissingPolicy::Skip),
    )?;
    debug!(field = field.name(), n_years, "mean of yearly maxima");

    let mut axes = field.axes().to_vec();
    axes.remove(t_index);
    Ok(field
        .derive(axes, node)?
        .with_attribute("cell_methods", "time: maximum within years time: mean over years"))
}

/// Maximum over the whole time axis, missing values skipped
///
/// # Errors
///
/// Returns [`OceanReduceError::AxisNotFound`] if the field has no time axis.
pub fn time_max(field: &GridField) -> Result<GridField> {
    let (t_index, _) = field.time_axis()?;
    let node = ReduceKernel::node(
        field.node().clone(),
        vec![t_index],
        Reducer::Stat(StatOperation::Max, MissingPolicy::Skip),
    )?;
    let mut axes = field.axes().to_vec();
    axes.remove(t_index);
    Ok(field
        .derive(axes, node)?
        .with_attribute("cell_methods", "time: maximum"))
}

/// Last year of `num_years` whole years starting with `start_year`
///
/// # Errors
///
/// Returns [`OceanReduceError::Statistics`] if the year does not fit in an
/// `i32`.
pub fn window_end_year(start_year: i32, num_years: u32) -> Result<i32> {
    i32::try_from(num_years)
        .ok()
        .and_then(|n| start_year.checked_add(n))
        .and_then(|end| end.checked_sub(1))
        .ok_or_else(|| {
            OceanReduceError::Statistics(format!(
                "a window of {num_years} years from {start_year} overflows the year range"
            ))
        })
}

/// Restrict the time axis to the years `start_year ..= start_year + num_years - 1`
///
/// # Errors
///
/// Returns [`OceanReduceError::AxisNotFound`] if the field has no time axis,
/// [`OceanReduceError::Statistics`] if the window overflows the year range
/// and [`OceanReduceError::InsufficientData`] if no timestep falls in the
/// window.
pub fn select_years(field: &GridField, start_year: i32, num_years: u32) -> Result<GridField> {
    let (t_index, time) = field.time_axis()?;
    let last_year = window_end_year(start_year, num_years)?;
    let indices = time.indices_in_years(start_year, last_year);
    if indices.is_empty() {
        return Err(OceanReduceError::InsufficientData {
            bin: format!("{start_year}-{last_year}"),
        });
    }
    let name = field.axes()[t_index].name().to_string();
    field.select_axis(&name, &indices)
}
