//! Labelled axes and auxiliary coordinates of a grid field

use crate::time::TimeCoordinate;

/// Coordinate values carried by an axis
#[derive(Debug, Clone, PartialEq)]
pub enum Coord {
    /// Unlabelled axis of the given length
    Index(usize),
    /// Numeric coordinate (latitude, depth, density class, year, ...)
    Values(Vec<f64>),
    /// Calendar-aware time coordinate
    Time(TimeCoordinate),
    /// Categorical labels (season names, member ids)
    Labels(Vec<String>),
}

impl Coord {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Index(n) => *n,
            Self::Values(v) => v.len(),
            Self::Time(t) => t.len(),
            Self::Labels(l) => l.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Self::Index(_) => Self::Index(indices.len()),
            Self::Values(v) => Self::Values(indices.iter().map(|&i| v[i]).collect()),
            Self::Time(t) => Self::Time(t.select(indices)),
            Self::Labels(l) => Self::Labels(indices.iter().map(|&i| l[i].clone()).collect()),
        }
    }
}

/// A named axis of a grid field
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    name: String,
    coord: Coord,
}

impl Axis {
    pub fn new(name: impl Into<String>, coord: Coord) -> Self {
        Self {
            name: name.into(),
            coord,
        }
    }

    pub fn index(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, Coord::Index(len))
    }

    pub fn values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, Coord::Values(values))
    }

    pub fn labels(name: impl Into<String>, labels: Vec<String>) -> Self {
        Self::new(name, Coord::Labels(labels))
    }

    /// Time axis, always named `time`
    #[must_use]
    pub fn time(time: TimeCoordinate) -> Self {
        Self::new("time", Coord::Time(time))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn coord(&self) -> &Coord {
        &self.coord
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coord.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }

    #[must_use]
    pub fn time_coordinate(&self) -> Option<&TimeCoordinate> {
        match &self.coord {
            Coord::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Same name, same length and same coordinate values
    #[must_use]
    pub fn conforms_to(&self, other: &Self) -> bool {
        self.name == other.name && self.coord == other.coord
    }

    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            coord: self.coord.select(indices),
        }
    }

    pub(crate) fn describe(&self) -> String {
        let kind = match &self.coord {
            Coord::Index(_) => "index".to_string(),
            Coord::Values(v) => match (v.first(), v.last()) {
                (Some(a), Some(b)) => format!("{a} .. {b}"),
                _ => "empty".to_string(),
            },
            Coord::Time(t) => match (t.dates().first(), t.dates().last()) {
                (Some(a), Some(b)) => format!("{a} .. {b} ({})", t.calendar()),
                _ => format!("empty ({})", t.calendar()),
            },
            Coord::Labels(l) => l.join(", "),
        };
        format!("{}[{}]: {kind}", self.name, self.len())
    }
}

/// Extra per-axis values carried alongside a field (e.g. mean days per bin)
#[derive(Debug, Clone, PartialEq)]
pub struct AuxCoord {
    pub name: String,
    pub axis: String,
    pub values: Vec<f64>,
}

impl AuxCoord {
    pub fn new(name: impl Into<String>, axis: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            axis: axis.into(),
            values,
        }
    }
}
