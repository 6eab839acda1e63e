//! Writing fields with the NetCDF sink and reading them back

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};
use ocean_reduce::data_source::{DataSource, FieldQuery, NetcdfSource};
use ocean_reduce::errors::{OceanReduceError, Result};
use ocean_reduce::field::{Axis, ChunkSizes, Coord, GridField};
use ocean_reduce::metadata::{list_variables, summarize_field};
use ocean_reduce::netcdf_io::{read_field, DatasetSink, NetcdfSink};
use ocean_reduce::parallel::{Executor, ParallelConfig, SequentialExecutor};
use ocean_reduce::statistics::{
    climatology, select_years, LumpBy, MissingPolicy, MEAN_DAYS_COORD,
};
use ocean_reduce::time::{Calendar, TimeCoordinate};
use std::sync::Arc;
use tempfile::tempdir;

fn sink() -> NetcdfSink {
    NetcdfSink::new(Arc::new(SequentialExecutor))
}

/// (time, lat) field of 24 noleap months, value = 100 * t + lat index
fn sample_field() -> Result<GridField> {
    let time = TimeCoordinate::monthly(Calendar::NoLeap, 1990, 24)?;
    let values: Vec<f64> = (0..24_i32)
        .flat_map(|t| (0..3_i32).map(move |j| f64::from(100 * t + j)))
        .collect();
    let data = ArrayD::from_shape_vec(IxDyn(&[24, 3]), values)?;
    Ok(GridField::from_array(
        "thetao",
        vec![Axis::time(time), Axis::values("lat", vec![-30.0, 0.0, 30.0])],
        data,
    )?
    .with_attribute("units", "degC"))
}

#[test]
fn test_roundtrip_preserves_axes_and_data() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("out").join("thetao.nc");
    let field = sample_field()?;
    let chunks = ChunkSizes::new().with("time", 5).with("lat", -1);
    sink().persist(&field, &path, &chunks)?;
    assert!(path.is_file());
    assert!(!dir.path().join("out").join(".thetao.nc.tmp").exists());

    let back = read_field(&path, "thetao", ChunkSizes::new().with("time", 7))?;
    assert_eq!(back.shape(), vec![24, 3]);
    assert_eq!(back.attributes().get("units").map(String::as_str), Some("degC"));

    let (_, time) = back.time_axis()?;
    let (_, original) = field.time_axis()?;
    assert_eq!(time.calendar(), Calendar::NoLeap);
    assert_eq!(time.offsets(), original.offsets());
    assert_eq!(time.dates(), original.dates());
    assert_eq!(time.bounds(), original.bounds());
    assert_eq!(back.axis("lat")?.coord(), &Coord::Values(vec![-30.0, 0.0, 30.0]));

    let written = back.compute(&SequentialExecutor)?;
    let expected = field.compute(&SequentialExecutor)?;
    assert_eq!(written, expected);
    Ok(())
}

#[test]
fn test_roundtrip_of_climatology_keeps_aux_coordinate() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("thetao.nc");
    let clim = climatology(&sample_field()?, LumpBy::Month, MissingPolicy::Skip)?;
    let executor: Arc<dyn Executor> = Arc::new(ParallelConfig::with_threads(2).build_executor()?);
    NetcdfSink::new(executor).persist(&clim, &path, &ChunkSizes::new().with("month", 4))?;

    let back = read_field(&path, "thetao", ChunkSizes::new())?;
    assert_eq!(back.shape(), vec![12, 3]);
    let days = back
        .aux_coord(MEAN_DAYS_COORD)
        .ok_or_else(|| OceanReduceError::Statistics("aux coordinate lost".into()))?;
    assert_eq!(days.axis, "month");
    assert_eq!(days.values[1], 28.0);

    let out = back.compute(&SequentialExecutor)?;
    // January: mean of t = 0 and t = 12 at lat index 2
    assert_abs_diff_eq!(out[[0, 2]], 602.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_roundtrip_of_labels_and_missing_values() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("v.nc");
    let data = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, f64::NAN, 3.0, 4.0])?;
    let field = GridField::from_array(
        "v",
        vec![
            Axis::labels("member", vec!["r1i1p1f1".into(), "r2i1p1f1".into()]),
            Axis::index("x", 2),
        ],
        data,
    )?;
    sink().persist(&field, &path, &ChunkSizes::new())?;

    let back = read_field(&path, "v", ChunkSizes::new())?;
    assert_eq!(
        back.axis("member")?.coord(),
        &Coord::Labels(vec!["r1i1p1f1".into(), "r2i1p1f1".into()])
    );
    assert_eq!(back.axis("x")?.coord(), &Coord::Index(2));
    let out = back.compute(&SequentialExecutor)?;
    assert!(out[[0, 1]].is_nan());
    assert_eq!(out[[1, 1]], 4.0);

    let summary = summarize_field(&back, &SequentialExecutor)?;
    assert_eq!(summary.valid, 3);
    assert_eq!(summary.min, 1.0);
    Ok(())
}

#[test]
fn test_labels_with_spaces_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.nc");
    let field = GridField::from_array(
        "v",
        vec![Axis::labels("member", vec!["r1 i1".into()])],
        ArrayD::zeros(IxDyn(&[1])),
    )?;
    assert!(sink().persist(&field, &path, &ChunkSizes::new()).is_err());
    assert!(!path.exists());
    assert!(!dir.path().join(".bad.nc.tmp").exists());
    Ok(())
}

#[test]
fn test_unknown_variable_is_no_data() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("thetao.nc");
    sink().persist(&sample_field()?, &path, &ChunkSizes::new())?;

    let err = read_field(&path, "so", ChunkSizes::new()).unwrap_err();
    assert!(err.is_no_data());

    let source = NetcdfSource::new(dir.path());
    let err = source.query(&FieldQuery::new("so", "mon")).unwrap_err();
    assert!(err.is_no_data());
    Ok(())
}

#[test]
fn test_netcdf_source_prefers_frequency_file() -> Result<()> {
    let dir = tempdir()?;
    let field = sample_field()?;
    sink().persist(&field, &dir.path().join("thetao.nc"), &ChunkSizes::new())?;

    // a second file with a different time span under the frequency-tagged name
    let short = select_years(&field, 1991, 1)?;
    sink().persist(&short, &dir.path().join("thetao_mon.nc"), &ChunkSizes::new())?;

    let source = NetcdfSource::new(dir.path());
    let found = source.query(&FieldQuery::new("thetao", "mon"))?;
    assert_eq!(found.shape(), vec![12, 3]);
    let fallback = source.query(&FieldQuery::new("thetao", "yr"))?;
    assert_eq!(fallback.shape(), vec![24, 3]);
    Ok(())
}

#[test]
fn test_list_variables() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("thetao.nc");
    sink().persist(&sample_field()?, &path, &ChunkSizes::new())?;

    let variables = list_variables(&path)?;
    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["lat", "thetao", "time", "time_bnds"]);
    let thetao = &variables[1];
    assert_eq!(thetao.units.as_deref(), Some("degC"));
    assert_eq!(thetao.total_elements(), 72);
    Ok(())
}

/// Write `tos(time)` with a `time` coordinate carrying only `attributes`
fn write_raw_time_file(path: &std::path::Path, attributes: &[(&str, &str)]) -> Result<()> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", 3)?;
    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_values(&[15.5, 45.0, 74.5], ..)?;
        for (key, value) in attributes {
            time.put_attribute(key, *value)?;
        }
    }
    let mut tos = file.add_variable::<f64>("tos", &["time"])?;
    tos.put_values(&[1.0, 2.0, 3.0], ..)?;
    Ok(())
}

#[test]
fn test_time_coordinate_without_cf_units_is_calendar_error() -> Result<()> {
    let dir = tempdir()?;

    let no_units = dir.path().join("no_units.nc");
    write_raw_time_file(&no_units, &[])?;
    let err = read_field(&no_units, "tos", ChunkSizes::new())
        .and_then(|f| climatology(&f, LumpBy::Month, MissingPolicy::Skip))
        .unwrap_err();
    assert!(matches!(err, OceanReduceError::Calendar(_)), "{err:?}");

    let bad_units = dir.path().join("bad_units.nc");
    write_raw_time_file(&bad_units, &[("units", "days")])?;
    let err = read_field(&bad_units, "tos", ChunkSizes::new()).unwrap_err();
    assert!(matches!(err, OceanReduceError::Calendar(_)), "{err:?}");

    let source = NetcdfSource::new(dir.path());
    let err = source.query(&FieldQuery::new("tos", "mon")).unwrap_err();
    assert!(!err.is_no_data());
    Ok(())
}

#[test]
fn test_time_declared_by_axis_attribute() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tos.nc");
    let mut file = netcdf::create(&path)?;
    file.add_dimension("t", 2)?;
    {
        let mut t = file.add_variable::<f64>("t", &["t"])?;
        t.put_values(&[0.0, 1.0], ..)?;
        t.put_attribute("axis", "T")?;
    }
    let mut tos = file.add_variable::<f64>("tos", &["t"])?;
    tos.put_values(&[1.0, 2.0], ..)?;
    drop(file);

    let err = read_field(&path, "tos", ChunkSizes::new()).unwrap_err();
    assert!(matches!(err, OceanReduceError::Calendar(_)), "{err:?}");
    Ok(())
}
