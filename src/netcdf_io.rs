//! NetCDF I/O: persisting fields and reading them back lazily
//!
//! [`NetcdfSink`] writes one field per NetCDF-4 file together with its
//! coordinate variables, auxiliary coordinates and attributes. Data is
//! computed and written chunk by chunk, into a temporary sibling that is
//! renamed over the target only once the write has succeeded.
//!
//! [`read_field`] is the inverse: it rebuilds the axes from the coordinate
//! variables and returns a field whose data is read region by region on
//! demand.

use crate::errors::{OceanReduceError, Result};
use crate::field::graph::SourceKernel;
use crate::field::{
    plan_regions, region_shape, AuxCoord, Axis, ChunkSizes, Coord, GridField, RegionReader,
};
use crate::parallel::Executor;
use crate::time::TimeCoordinate;
use chrono::Utc;
use ndarray::{ArrayD, IxDyn};
use netcdf::{AttributeValue, Extent, FileMut, Variable};
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attribute carrying the labels of a categorical axis, space separated
const LABELS_ATTRIBUTE: &str = "flag_meanings";

/// Dimension of cell-bounds variables
const BOUNDS_DIM: &str = "nv";

/// Persists fields
pub trait DatasetSink: Send + Sync {
    /// Write `field` to `path` with per-axis chunk sizes
    ///
    /// # Errors
    ///
    /// Returns the first error raised while computing or writing; the target
    /// path is left untouched in that case.
    fn persist(&self, field: &GridField, path: &Path, chunks: &ChunkSizes) -> Result<()>;
}

/// Writes NetCDF-4 files, computing chunks on an injected executor
pub struct NetcdfSink {
    executor: Arc<dyn Executor>,
}

impl NetcdfSink {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    fn write_file(&self, field: &GridField, path: &Path, chunks: &ChunkSizes) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        let mut file = netcdf::create(path)?;

        for axis in field.axes() {
            file.add_dimension(axis.name(), axis.len())?;
        }
        let has_bounds = field
            .axes()
            .iter()
            .any(|a| a.time_coordinate().is_some_and(|t| t.bounds().is_some()));
        if has_bounds {
            file.add_dimension(BOUNDS_DIM, 2)?;
        }
        for axis in field.axes() {
            write_coordinate(&mut file, axis)?;
        }
        for aux in field.aux_coords() {
            let mut var = file.add_variable::<f64>(&aux.name, &[aux.axis.as_str()])?;
            var.put_values(&aux.values, ..)?;
        }

        let shape = field.shape();
        let chunk_shape = chunks.resolve(field.axes())?;
        let dims: Vec<&str> = field.axes().iter().map(Axis::name).collect();
        let mut var = file.add_variable::<f64>(field.name(), &dims)?;
        if !dims.is_empty() && shape.iter().all(|&n| n > 0) {
            var.set_chunking(&chunk_shape)?;
        }
        var.put_attribute("_FillValue", f64::NAN)?;
        for (key, value) in field.attributes() {
            var.put_attribute(key, value.as_str())?;
        }
        if !field.aux_coords().is_empty() {
            let names: Vec<&str> = field.aux_coords().iter().map(|c| c.name.as_str()).collect();
            var.put_attribute("coordinates", names.join(" "))?;
        }

        // bounded memory: at most one block per worker is held at a time
        let regions = plan_regions(&shape, &chunk_shape);
        let batch = self.executor.workers().max(1);
        debug!(
            field = field.name(),
            chunks = regions.len(),
            batch,
            "writing chunks"
        );
        let node = field.node();
        for group in regions.chunks(batch) {
            let blocks = self.executor.execute(group, &|region| node.evaluate(region))?;
            for (region, block) in group.iter().zip(blocks) {
                let values: Vec<f64> = block.iter().copied().collect();
                if region.is_empty() {
                    var.put_values(&values, ..)?;
                } else {
                    var.put_values(&values, extents(region))?;
                }
            }
        }

        file.add_attribute(
            "history",
            format!("Created by ocean-reduce on {}", Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }
}

impl fmt::Debug for NetcdfSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcdfSink")
            .field("workers", &self.executor.workers())
            .finish()
    }
}

impl DatasetSink for NetcdfSink {
    fn persist(&self, field: &GridField, path: &Path, chunks: &ChunkSizes) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temporary_sibling(path);
        if let Err(e) = self.write_file(field, &tmp, chunks) {
            if tmp.exists() {
                if let Err(cleanup) = fs::remove_file(&tmp) {
                    warn!("⚠ Could not remove {}: {cleanup}", tmp.display());
                }
            }
            return Err(e);
        }
        fs::rename(&tmp, path)?;
        info!("💾 Saved '{}' to {}", field.name(), path.display());
        Ok(())
    }
}

/// `dir/.name.tmp` for `dir/name`
fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "output".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}

fn extents(region: &[Range<usize>]) -> Vec<Extent> {
    region.iter().cloned().map(Extent::from).collect()
}

fn write_coordinate(file: &mut FileMut, axis: &Axis) -> Result<()> {
    let name = axis.name();
    match axis.coord() {
        Coord::Index(_) => {}
        Coord::Values(values) => {
            let mut var = file.add_variable::<f64>(name, &[name])?;
            var.put_values(values, ..)?;
        }
        Coord::Time(time) => {
            let bounds_name = format!("{name}_bnds");
            {
                let mut var = file.add_variable::<f64>(name, &[name])?;
                var.put_values(time.offsets(), ..)?;
                var.put_attribute("units", time.units().to_string())?;
                var.put_attribute("calendar", time.calendar().cf_name())?;
                var.put_attribute("standard_name", "time")?;
                var.put_attribute("axis", "T")?;
                if time.bounds().is_some() {
                    var.put_attribute("bounds", bounds_name.as_str())?;
                }
            }
            if let Some(bounds) = time.bounds() {
                let flat: Vec<f64> = bounds.iter().flat_map(|&(lo, hi)| [lo, hi]).collect();
                let mut var = file.add_variable::<f64>(&bounds_name, &[name, BOUNDS_DIM])?;
                var.put_values(&flat, ..)?;
            }
        }
        Coord::Labels(labels) => {
            if let Some(bad) = labels.iter().find(|l| l.is_empty() || l.contains(char::is_whitespace)) {
                return Err(OceanReduceError::Config(format!(
                    "label '{bad}' of axis '{name}' cannot be stored in {LABELS_ATTRIBUTE}"
                )));
            }
            #[allow(clippy::cast_precision_loss)]
            let index: Vec<f64> = (0..labels.len()).map(|i| i as f64).collect();
            let mut var = file.add_variable::<f64>(name, &[name])?;
            var.put_values(&index, ..)?;
            var.put_attribute(LABELS_ATTRIBUTE, labels.join(" "))?;
        }
    }
    Ok(())
}

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn numeric_attribute(var: &Variable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        _ => None,
    }
}

/// Whether the coordinate variable of dimension `name` is declared as time,
/// by name or by its `axis` / `standard_name` attributes
fn is_time_coordinate(var: &Variable, name: &str) -> bool {
    name == "time"
        || string_attribute(var, "axis").is_some_and(|a| a.trim().eq_ignore_ascii_case("T"))
        || string_attribute(var, "standard_name").is_some_and(|s| s.trim() == "time")
}

/// Rebuild the axis of dimension `name` from its coordinate variable, if any
///
/// A time coordinate without CF time `units` is a calendar error rather than
/// a plain value axis.
fn read_axis(file: &netcdf::File, name: &str, len: usize) -> Result<Axis> {
    let Some(var) = file.variable(name) else {
        return Ok(Axis::index(name, len));
    };
    if var.dimensions().len() != 1 {
        return Ok(Axis::index(name, len));
    }
    let values: Vec<f64> = var.get_values::<f64, _>(..)?;

    if let Some(meanings) = string_attribute(&var, LABELS_ATTRIBUTE) {
        let labels: Vec<String> = meanings.split_whitespace().map(str::to_string).collect();
        if labels.len() == len {
            return Ok(Axis::labels(name, labels));
        }
        warn!("⚠ Ignoring {LABELS_ATTRIBUTE} of '{name}': {} labels for {len} entries", labels.len());
    }

    let units = string_attribute(&var, "units");
    let cf_time = units.as_deref().is_some_and(|u| u.contains(" since "));
    if cf_time || is_time_coordinate(&var, name) {
        let calendar = string_attribute(&var, "calendar");
        let mut time = TimeCoordinate::from_cf_attributes(values, units.as_deref(), calendar.as_deref())
            .map_err(|e| match e {
                OceanReduceError::Calendar(msg) => {
                    OceanReduceError::Calendar(format!("time coordinate '{name}': {msg}"))
                }
                other => other,
            })?;
        if let Some(bounds_var) = string_attribute(&var, "bounds").and_then(|b| file.variable(&b)) {
            let flat: Vec<f64> = bounds_var.get_values::<f64, _>(..)?;
            if flat.len() == 2 * len {
                time = time.with_bounds(flat.chunks(2).map(|p| (p[0], p[1])).collect())?;
            }
        }
        return Ok(Axis::new(name, Coord::Time(time)));
    }

    Ok(Axis::values(name, values))
}

/// Reads regions of one variable, opening the file per read
#[derive(Debug, Clone)]
pub struct NetcdfRegionReader {
    path: PathBuf,
    variable: String,
    fill_value: Option<f64>,
}

impl RegionReader for NetcdfRegionReader {
    fn read_region(&self, region: &[Range<usize>]) -> Result<ArrayD<f64>> {
        let file = netcdf::open(&self.path)?;
        let var = file
            .variable(&self.variable)
            .ok_or_else(|| OceanReduceError::NoData {
                variable: self.variable.clone(),
                frequency: self.path.display().to_string(),
            })?;

        let shape = region_shape(region);
        let values: Vec<f64> = if region.is_empty() {
            var.get_values::<f64, _>(..)?
        } else if shape.contains(&0) {
            Vec::new()
        } else {
            var.get_values::<f64, _>(extents(region))?
        };

        let mut data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        if let Some(fill) = self.fill_value {
            data.mapv_inplace(|x| if x == fill { f64::NAN } else { x });
        }
        Ok(data)
    }
}

/// Open `variable` of the file at `path` as a lazily read field
///
/// Coordinate variables become axis coordinates (time with its calendar and
/// bounds, labels from `flag_meanings`), variables listed in the
/// `coordinates` attribute become auxiliary coordinates and the remaining
/// string attributes are carried over. `_FillValue` / `missing_value` entries
/// read as missing.
///
/// # Errors
///
/// Returns [`OceanReduceError::NoData`] if the file lacks the variable and
/// [`OceanReduceError::Calendar`] if its time coordinate cannot be decoded.
pub fn read_field(path: &Path, variable: &str, chunks: ChunkSizes) -> Result<GridField> {
    let file = netcdf::open(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| OceanReduceError::NoData {
            variable: variable.to_string(),
            frequency: path.display().to_string(),
        })?;

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name().to_string(), d.len()))
        .collect();
    let axes = dims
        .iter()
        .map(|(name, len)| read_axis(&file, name, *len))
        .collect::<Result<Vec<_>>>()?;
    let shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();

    let reader = NetcdfRegionReader {
        path: path.to_path_buf(),
        variable: variable.to_string(),
        fill_value: numeric_attribute(&var, "_FillValue")
            .or_else(|| numeric_attribute(&var, "missing_value")),
    };
    let mut field = GridField::from_node(variable, axes, SourceKernel::node(shape, Arc::new(reader)))?
        .with_chunks(chunks);

    for attr in var.attributes() {
        let key = attr.name().to_string();
        if key == "coordinates" {
            continue;
        }
        if let Ok(AttributeValue::Str(value)) = attr.value() {
            field = field.with_attribute(key, value);
        }
    }

    for name in string_attribute(&var, "coordinates")
        .unwrap_or_default()
        .split_whitespace()
    {
        let Some(aux) = file.variable(name) else {
            warn!("⚠ Auxiliary coordinate '{name}' of '{variable}' not found");
            continue;
        };
        let [dim] = aux.dimensions() else {
            continue;
        };
        let axis = dim.name().to_string();
        let values: Vec<f64> = aux.get_values::<f64, _>(..)?;
        field = field.with_aux_coord(AuxCoord::new(name, axis, values))?;
    }

    debug!(path = %path.display(), variable, shape = ?field.shape(), "opened field");
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_sibling() {
        let tmp = temporary_sibling(Path::new("/out/psi.nc"));
        assert_eq!(tmp, PathBuf::from("/out/.psi.nc.tmp"));
    }
}
