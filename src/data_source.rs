//! Data source abstraction
//!
//! The engine only ever asks a source for one thing: a lazily backed field for
//! a variable at an output frequency, optionally restricted to a window of
//! years. Where the data lives (in memory, a directory of NetCDF files) is the
//! implementation's business.

use crate::config::TimeWindow;
use crate::errors::{OceanReduceError, Result};
use crate::field::{ChunkSizes, GridField};
use crate::netcdf_io::read_field;
use crate::statistics::select_years;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to fetch from a [`DataSource`]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldQuery {
    pub variable: String,
    /// Output frequency tag, e.g. `mon` or `yr`
    pub frequency: String,
    pub time_range: Option<TimeWindow>,
    pub chunks: ChunkSizes,
}

impl FieldQuery {
    pub fn new(variable: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            frequency: frequency.into(),
            time_range: None,
            chunks: ChunkSizes::new(),
        }
    }

    #[must_use]
    pub fn with_time_range(mut self, window: TimeWindow) -> Self {
        self.time_range = Some(window);
        self
    }

    #[must_use]
    pub fn with_chunks(mut self, chunks: ChunkSizes) -> Self {
        self.chunks = chunks;
        self
    }

    fn no_data(&self) -> OceanReduceError {
        OceanReduceError::NoData {
            variable: self.variable.clone(),
            frequency: self.frequency.clone(),
        }
    }

    /// Apply the time window and chunk hint to a located field
    fn finish(&self, field: GridField) -> Result<GridField> {
        let field = match self.time_range {
            Some(window) if field.time_axis().is_ok() => {
                select_years(&field, window.start_year, window.num_years).map_err(|e| match e {
                    OceanReduceError::InsufficientData { .. } => self.no_data(),
                    other => other,
                })?
            }
            _ => field,
        };
        Ok(field.with_chunks(self.chunks.clone()))
    }
}

/// Anything that can answer a [`FieldQuery`]
pub trait DataSource: Send + Sync {
    /// Locate `query.variable` and return it as a lazily evaluated field
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::NoData`] when nothing matches.
    fn query(&self, query: &FieldQuery) -> Result<GridField>;
}

/// Fields held in memory, keyed by variable and frequency
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    fields: HashMap<(String, String), GridField>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frequency: impl Into<String>, field: GridField) {
        self.fields
            .insert((field.name().to_string(), frequency.into()), field);
    }

    #[must_use]
    pub fn with_field(mut self, frequency: impl Into<String>, field: GridField) -> Self {
        self.insert(frequency, field);
        self
    }
}

impl DataSource for MemorySource {
    fn query(&self, query: &FieldQuery) -> Result<GridField> {
        let key = (query.variable.clone(), query.frequency.clone());
        let field = self.fields.get(&key).ok_or_else(|| query.no_data())?;
        query.finish(field.clone())
    }
}

/// A directory of NetCDF files
///
/// A variable is looked up in `<variable>_<frequency>.nc`, then in
/// `<variable>.nc`, then in any other `.nc` file of the directory that
/// defines it.
#[derive(Debug, Clone)]
pub struct NetcdfSource {
    root: PathBuf,
}

impl NetcdfSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn defines(path: &Path, variable: &str) -> bool {
        netcdf::open(path).is_ok_and(|file| file.variable(variable).is_some())
    }

    /// File that holds `variable`, if any
    fn locate(&self, query: &FieldQuery) -> Result<Option<PathBuf>> {
        let preferred = [
            self.root
                .join(format!("{}_{}.nc", query.variable, query.frequency)),
            self.root.join(format!("{}.nc", query.variable)),
        ];
        if let Some(found) = preferred
            .iter()
            .find(|p| p.is_file() && Self::defines(p, &query.variable))
        {
            return Ok(Some(found.clone()));
        }
        if !self.root.is_dir() {
            return Ok(None);
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "nc"))
            .filter(|p| !preferred.contains(p))
            .collect();
        candidates.sort();
        Ok(candidates
            .into_iter()
            .find(|p| Self::defines(p, &query.variable)))
    }
}

impl DataSource for NetcdfSource {
    fn query(&self, query: &FieldQuery) -> Result<GridField> {
        let Some(path) = self.locate(query)? else {
            debug!(
                root = %self.root.display(),
                variable = %query.variable,
                "no file defines variable"
            );
            return Err(query.no_data());
        };
        info!("📂 Reading '{}' from {}", query.variable, path.display());
        let field = read_field(&path, &query.variable, query.chunks.clone())?;
        query.finish(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Axis;
    use crate::time::{Calendar, TimeCoordinate};
    use ndarray::{ArrayD, IxDyn};

    fn monthly(name: &str, years: usize) -> GridField {
        let n = years * 12;
        let time = TimeCoordinate::monthly(Calendar::NoLeap, 1990, n).unwrap();
        let data = ArrayD::zeros(IxDyn(&[n]));
        GridField::from_array(name, vec![Axis::time(time)], data).unwrap()
    }

    #[test]
    fn test_memory_source_lookup() {
        let source = MemorySource::new().with_field("mon", monthly("tos", 3));
        let field = source
            .query(&FieldQuery::new("tos", "mon").with_time_range(TimeWindow::new(1991, 2)))
            .unwrap();
        assert_eq!(field.shape(), vec![24]);

        let err = source.query(&FieldQuery::new("tos", "yr")).unwrap_err();
        assert!(err.is_no_data());
        let err = source
            .query(&FieldQuery::new("tos", "mon").with_time_range(TimeWindow::new(2100, 1)))
            .unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_netcdf_source_missing_directory() {
        let source = NetcdfSource::new("/nonexistent/ocean_reduce");
        let err = source.query(&FieldQuery::new("tos", "mon")).unwrap_err();
        assert!(err.is_no_data());
    }
}
