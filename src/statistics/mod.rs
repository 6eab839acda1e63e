//! Statistical reductions over grid fields
//!
//! # Organization
//!
//! - [`operations`]: Core statistical operations, missing-value policy and traits
//! - [`parallel`]: Parallel lane reductions over materialised blocks
//! - [`weighted`]: Weighted temporal reduction
//! - [`climatology`]: Monthly, seasonal and yearly climatologies
//! - [`rolling`]: Trailing-window weighted averages
//! - [`streamfunction`]: Overturning streamfunctions from transports
//! - [`ensemble`]: Statistics across ensemble members
//!
//! Every function here is lazy: it returns a new [`crate::field::GridField`]
//! and nothing is computed until the result is materialised.

pub mod climatology;
pub mod ensemble;
pub mod operations;
pub mod parallel;
pub mod rolling;
pub mod streamfunction;
pub mod weighted;

// Re-export the main types and functions for convenience
pub use climatology::{
    climatology, mean_of_yearly_max, select_years, time_max, window_end_year, BinKey, LumpBy,
    Season, MEAN_DAYS_COORD,
};
pub use ensemble::{
    ensemble_stats, member_sort_key, sort_members, stack_members, EnsembleStats, MEMBER_AXIS,
};
pub use operations::{weighted_mean_lane, MissingPolicy, StatOperation};
pub use parallel::{parallel_reduce_axes, parallel_weighted_mean_axis};
pub use rolling::{rolling_weighted_mean, ANNUAL_WINDOW, DECADAL_WINDOW};
pub use streamfunction::{add_component, build_streamfunction, sum_over};
pub use weighted::{time_mean, weighted_mean};
