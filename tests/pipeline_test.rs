//! End-to-end runs: in-memory sources, NetCDF outputs in a temporary directory

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};
use ocean_reduce::config::JobConfig;
use ocean_reduce::data_source::MemorySource;
use ocean_reduce::errors::Result;
use ocean_reduce::field::{Axis, ChunkSizes, GridField};
use ocean_reduce::netcdf_io::{read_field, NetcdfSink};
use ocean_reduce::parallel::SequentialExecutor;
use ocean_reduce::pipeline::{Pipeline, VariableOutcome};
use ocean_reduce::time::{Calendar, TimeCoordinate};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn job(output_root: &Path) -> Result<JobConfig> {
    let config: JobConfig = serde_json::from_value(json!({
        "model": "ACCESS-OM2",
        "experiment": "historical",
        "members": ["r2i1p1f1", "r1i1p1f1"],
        "window": {"start_year": 1990, "num_years": 2},
        "variables": ["thetao"],
        "yearly_max_variables": ["mlotst"],
        "input_root": "/unused",
        "output_root": output_root,
        "chunks": {"time": -1, "lat": 2}
    }))?;
    config.validate()?;
    Ok(config)
}

fn sink() -> NetcdfSink {
    NetcdfSink::new(Arc::new(SequentialExecutor))
}

/// Three years of noleap months over two latitudes, every value `offset + year index`
fn monthly_field(name: &str, offset: f64) -> Result<GridField> {
    let time = TimeCoordinate::monthly(Calendar::NoLeap, 1989, 36)?;
    let values: Vec<f64> = (0..36_i32)
        .flat_map(|t| [offset + f64::from(t / 12); 2])
        .collect();
    let data = ArrayD::from_shape_vec(IxDyn(&[36, 2]), values)?;
    GridField::from_array(
        name,
        vec![Axis::time(time), Axis::values("lat", vec![-10.0, 10.0])],
        data,
    )
}

/// Transport in density classes: (time, potrho, grid_yu_ocean, grid_xt_ocean)
fn transport(name: &str, value: f64) -> Result<GridField> {
    let time = TimeCoordinate::monthly(Calendar::NoLeap, 1990, 24)?;
    let data = ArrayD::from_elem(IxDyn(&[24, 3, 2, 4]), value);
    GridField::from_array(
        name,
        vec![
            Axis::time(time),
            Axis::values("potrho", vec![1030.0, 1032.0, 1034.0]),
            Axis::values("grid_yu_ocean", vec![-45.0, 45.0]),
            Axis::index("grid_xt_ocean", 4),
        ],
        data,
    )
}

#[test]
fn test_climatology_then_ensemble() -> Result<()> {
    let dir = tempdir()?;
    let config = job(dir.path())?;
    let sink = sink();
    let pipeline = Pipeline::new(&config, &sink);

    for (member, offset) in [("r1i1p1f1", 0.0), ("r2i1p1f1", 10.0)] {
        let source = MemorySource::new()
            .with_field("mon", monthly_field("thetao", offset)?)
            .with_field("mon", monthly_field("mlotst", offset)?);
        let report = pipeline.climatology_member(member, &source);
        assert_eq!(report.written(), 3, "{report:?}");
        assert!(report.is_success());
    }

    let r1 = config.member_output_dir("r1i1p1f1");
    assert!(r1.ends_with("r1i1p1f1/Jan1990-Dec1991/cyclomonth"));
    let thetao = read_field(&r1.join("thetao.nc"), "thetao", ChunkSizes::new())?;
    assert_eq!(thetao.shape(), vec![12, 2]);
    // years 1990 and 1991 hold 1 and 2
    let values = thetao.compute(&SequentialExecutor)?;
    assert!(values.iter().all(|v| (v - 1.5).abs() < 1e-12));
    assert!(r1.join("mlotst.nc").is_file());
    assert!(r1.join("mlotst_max.nc").is_file());

    let report = pipeline.ensemble();
    assert!(report.is_success(), "{report:?}");
    let ensemble_dir = config.ensemble_output_dir();
    assert!(ensemble_dir.ends_with("all_members/Jan1990-Dec1991/cyclomonth"));
    let mean = read_field(&ensemble_dir.join("thetao_mean.nc"), "thetao_mean", ChunkSizes::new())?;
    let std = read_field(&ensemble_dir.join("thetao_std.nc"), "thetao_std", ChunkSizes::new())?;
    for (m, s) in mean
        .compute(&SequentialExecutor)?
        .iter()
        .zip(std.compute(&SequentialExecutor)?.iter())
    {
        assert_abs_diff_eq!(*m, 6.5, epsilon = 1e-12);
        assert_abs_diff_eq!(*s, 5.0, epsilon = 1e-12);
    }
    assert!(ensemble_dir.join("mlotst_max.nc").is_file());
    Ok(())
}

#[test]
fn test_missing_variable_is_skipped_not_failed() -> Result<()> {
    let dir = tempdir()?;
    let config = job(dir.path())?;
    let sink = sink();
    let pipeline = Pipeline::new(&config, &sink);

    let source = MemorySource::new().with_field("mon", monthly_field("thetao", 0.0)?);
    let report = pipeline.climatology_member("r1i1p1f1", &source);
    assert!(matches!(report.outcome("thetao"), Some(VariableOutcome::Written(_))));
    assert!(matches!(report.outcome("mlotst"), Some(VariableOutcome::Skipped(_))));
    assert!(report.is_success());

    // only r1 has outputs; r2 is left out of the ensemble
    let report = pipeline.ensemble();
    assert!(matches!(report.outcome("thetao_mean"), Some(VariableOutcome::Written(_))));
    assert!(matches!(report.outcome("mlotst"), Some(VariableOutcome::Skipped(_))));
    Ok(())
}

#[test]
fn test_overturning_products() -> Result<()> {
    let dir = tempdir()?;
    let config = job(dir.path())?;
    let sink = sink();
    let pipeline = Pipeline::new(&config, &sink);

    let source = MemorySource::new()
        .with_field("mon", transport("ty_trans_rho", 1.0)?)
        .with_field("mon", transport("ty_trans_rho_gm", 0.5)?);
    let report = pipeline.overturning_member("r1i1p1f1", &source);
    let products = [
        "psi",
        "psi_gm",
        "psi_tot",
        "psi_tot_year",
        "psi_tot_avg",
        "psi_tot_rollingyear",
        "psi_tot_rollingdecade",
    ];
    for product in products {
        assert!(
            matches!(report.outcome(product), Some(VariableOutcome::Written(_))),
            "{product}: {report:?}"
        );
    }

    let out = config.overturning_output_dir("r1i1p1f1");
    let avg = read_field(&out.join("psi_tot_avg.nc"), "psi_tot_avg", ChunkSizes::new())?;
    assert_eq!(avg.shape(), vec![3, 2]);
    let avg = avg.compute(&SequentialExecutor)?;
    // psi: 4 per class, cumulative 4, 8, 12 minus 12; psi_gm: 0.5 * 4 = 2
    assert_abs_diff_eq!(avg[[0, 0]], -6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(avg[[1, 1]], -2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(avg[[2, 0]], 2.0, epsilon = 1e-9);

    let year = read_field(&out.join("psi_tot_year.nc"), "psi_tot_year", ChunkSizes::new())?;
    assert_eq!(year.shape(), vec![2, 3, 2]);

    let rolling = read_field(
        &out.join("psi_tot_rollingyear.nc"),
        "psi_tot_rollingyear",
        ChunkSizes::new(),
    )?
    .compute(&SequentialExecutor)?;
    assert!(rolling[[10, 0, 0]].is_nan());
    assert_abs_diff_eq!(rolling[[11, 0, 0]], -6.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_overturning_without_gm_transport() -> Result<()> {
    let dir = tempdir()?;
    let config = job(dir.path())?;
    let sink = sink();
    let pipeline = Pipeline::new(&config, &sink);

    let source = MemorySource::new().with_field("mon", transport("ty_trans_rho", 1.0)?);
    let report = pipeline.overturning_member("r1i1p1f1", &source);
    assert!(matches!(report.outcome("psi"), Some(VariableOutcome::Written(_))));
    assert!(matches!(report.outcome("psi_gm"), Some(VariableOutcome::Skipped(_))));
    for product in ["psi_tot", "psi_tot_year", "psi_tot_avg", "psi_tot_rollingyear"] {
        assert!(
            matches!(report.outcome(product), Some(VariableOutcome::Skipped(_))),
            "{product}"
        );
    }
    assert!(report.is_success());
    Ok(())
}

#[test]
fn test_bad_axis_is_reported_as_failure() -> Result<()> {
    let dir = tempdir()?;
    let mut config = job(dir.path())?;
    config.overturning.sum_axis = "xt_ocean".to_string();
    config.overturning.gm_transport = None;
    let sink = sink();
    let pipeline = Pipeline::new(&config, &sink);

    let source = MemorySource::new().with_field("mon", transport("ty_trans_rho", 1.0)?);
    let report = pipeline.overturning_member("r1i1p1f1", &source);
    assert!(matches!(report.outcome("psi"), Some(VariableOutcome::Failed(_))));
    assert!(report.outcome("psi_gm").is_none());
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());
    Ok(())
}
