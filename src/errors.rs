//! Centralized error handling for ocean_reduce
//!
//! Every core operation returns a typed [`OceanReduceError`]. Fault isolation
//! (skip this variable, carry on with the next run) is the caller's job and is
//! done explicitly in [`crate::pipeline`].

use thiserror::Error;

/// Main error type for ocean_reduce operations
#[derive(Debug, Error)]
pub enum OceanReduceError {
    /// The data source has nothing matching the query
    #[error("No data found for variable '{variable}' at frequency '{frequency}'")]
    NoData { variable: String, frequency: String },

    /// Time coordinate lacks resolvable calendar metadata
    #[error("Calendar error: {0}")]
    Calendar(String),

    /// A climatology bin has no contributing timesteps
    #[error("Insufficient data: bin '{bin}' has no contributing timesteps")]
    InsufficientData { bin: String },

    /// Two fields (or a field and a weight series) are not conformable
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Ensemble aggregation called with no members
    #[error("Ensemble aggregation requires at least one member")]
    EmptyEnsemble,

    /// Axis not found on a field
    #[error("Axis '{axis}' not found on field '{field}'")]
    AxisNotFound { field: String, axis: String },

    /// Weight series violates positivity or normalisation
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    /// Rolling window size is unusable
    #[error("Invalid window size {window} for axis of length {len}")]
    InvalidWindow { window: usize, len: usize },

    /// Statistics computation errors
    #[error("Statistics computation error: {0}")]
    Statistics(String),

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Configuration file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Invalid job configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OceanReduceError {
    /// `true` for errors that mean "nothing to process" rather than a failure
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    pub(crate) fn axis_not_found(field: &str, axis: &str) -> Self {
        Self::AxisNotFound {
            field: field.to_string(),
            axis: axis.to_string(),
        }
    }
}

/// Result type alias for ocean_reduce operations
pub type Result<T> = std::result::Result<T, OceanReduceError>;
