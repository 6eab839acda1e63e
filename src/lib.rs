//! ocean_reduce: climatological reduction of chunked ocean-model output
//!
//! A Rust library for turning large, time-indexed gridded model output into the
//! reduced products used to build offline transport models: calendar-aware
//! weighted time means, monthly/seasonal/yearly climatologies, weighted rolling
//! means, overturning streamfunctions and statistics across ensemble members.
//!
//! ## Key Features
//!
//! - **Lazy Evaluation**: every operation returns a new [`GridField`] backed by
//!   a graph of pure chunk kernels; nothing is read or computed until the field
//!   is materialised
//! - **Parallel Processing**: chunks are evaluated on a bounded Rayon pool
//!   injected through the [`parallel::Executor`] trait
//! - **Calendar Awareness**: CF calendars (`noleap`, `360_day`, `julian`, ...)
//!   drive the days-per-timestep weights
//! - **NetCDF I/O**: fields are read lazily by region and written atomically
//!   with chunking, coordinates and attributes
//!
//! ## Module Organization
//!
//! - [`time`]: calendars, time coordinates and calendar weights
//! - [`field`]: grid fields, axes, chunk planning and the kernel graph
//! - [`statistics`]: temporal, climatological, rolling, streamfunction and
//!   ensemble reductions
//! - [`data_source`]: where input fields come from
//! - [`netcdf_io`]: NetCDF reading and the dataset sink
//! - [`metadata`]: file inspection for the `describe` subcommand
//! - [`config`]: the immutable job configuration
//! - [`pipeline`]: per-member and ensemble runs with per-product reports
//! - [`parallel`]: executors and thread-pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use ocean_reduce::prelude::*;
//!
//! let source = NetcdfSource::new("/data/ACCESS-OM2/historical/r1i1p1f1");
//! let query = FieldQuery::new("thetao", "mon").with_time_range(TimeWindow::new(1990, 10));
//! let thetao = source.query(&query).unwrap();
//!
//! let clim = climatology(&thetao, LumpBy::Month, MissingPolicy::Skip).unwrap();
//! let executor = ParallelConfig::all_cores().build_executor().unwrap();
//! let monthly = clim.compute(&executor).unwrap();
//! println!("{:?}", monthly.shape());
//! ```

// Core modules
pub mod config;
pub mod data_source;
pub mod errors;
pub mod field;
pub mod metadata;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod statistics;
pub mod time;

// Command-line front end
pub mod cli;

// Direct re-exports for the public API
pub use errors::{OceanReduceError, Result};
pub use field::GridField;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::config::{JobConfig, TimeWindow};
    pub use crate::data_source::{DataSource, FieldQuery, MemorySource, NetcdfSource};
    pub use crate::errors::{OceanReduceError, Result};
    pub use crate::field::{Axis, ChunkSizes, Coord, GridField};
    pub use crate::netcdf_io::{read_field, DatasetSink, NetcdfSink};
    pub use crate::parallel::{Executor, ParallelConfig, SequentialExecutor};
    pub use crate::pipeline::{Pipeline, RunReport, VariableOutcome};
    pub use crate::statistics::{
        build_streamfunction, climatology, ensemble_stats, rolling_weighted_mean, time_mean,
        weighted_mean, LumpBy, MissingPolicy, StatOperation,
    };
    pub use crate::time::{calendar_weights, Calendar, TimeCoordinate, WeightSeries};
}
