//! Job configuration
//!
//! A [`JobConfig`] is built once (from the command line or a JSON file) and
//! then passed by reference to every stage. Nothing reads configuration from
//! global state.

use crate::errors::{OceanReduceError, Result};
use crate::field::ChunkSizes;
use crate::parallel::ParallelConfig;
use crate::statistics::{
    window_end_year, LumpBy, MissingPolicy, ANNUAL_WINDOW, DECADAL_WINDOW,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Whole calendar years `start_year ..= start_year + num_years - 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_year: i32,
    pub num_years: u32,
}

impl TimeWindow {
    #[must_use]
    pub const fn new(start_year: i32, num_years: u32) -> Self {
        Self {
            start_year,
            num_years,
        }
    }

    /// Last year included in the window, saturating at `i32::MAX`
    ///
    /// [`JobConfig::validate`] rejects windows that do not fit.
    #[must_use]
    pub fn end_year(&self) -> i32 {
        window_end_year(self.start_year, self.num_years).unwrap_or(i32::MAX)
    }

    /// Directory label, e.g. `Jan1990-Dec1999`
    #[must_use]
    pub fn label(&self) -> String {
        format!("Jan{}-Dec{}", self.start_year, self.end_year())
    }
}

/// Variables and axes of the overturning product chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverturningConfig {
    /// Resolved (mean-flow) transport in density classes
    pub transport: String,
    /// Parameterised eddy transport, summed only along `sum_axis`
    pub gm_transport: Option<String>,
    pub sum_axis: String,
    pub integrate_axis: String,
    /// Rolling-mean window lengths in timesteps
    pub rolling_windows: Vec<usize>,
}

impl Default for OverturningConfig {
    fn default() -> Self {
        Self {
            transport: "ty_trans_rho".to_string(),
            gm_transport: Some("ty_trans_rho_gm".to_string()),
            sum_axis: "grid_xt_ocean".to_string(),
            integrate_axis: "potrho".to_string(),
            rolling_windows: vec![ANNUAL_WINDOW, DECADAL_WINDOW],
        }
    }
}

/// Missing-value handling per kind of reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingPolicies {
    /// Climatologies and whole-window means
    pub climatology: MissingPolicy,
    /// Rolling means
    pub rolling: MissingPolicy,
}

impl Default for MissingPolicies {
    fn default() -> Self {
        Self {
            climatology: MissingPolicy::Skip,
            rolling: MissingPolicy::Propagate,
        }
    }
}

fn default_frequency() -> String {
    "mon".to_string()
}

const fn default_lumpby() -> LumpBy {
    LumpBy::Month
}

/// Everything one run of the tool needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub model: String,
    pub experiment: String,
    pub members: Vec<String>,
    pub window: TimeWindow,
    #[serde(default = "default_lumpby")]
    pub lumpby: LumpBy,
    /// Output frequency tag of the input files
    #[serde(default = "default_frequency")]
    pub frequency: String,
    /// Variables reduced to a climatology
    #[serde(default)]
    pub variables: Vec<String>,
    /// Variables reduced to the mean of their yearly maxima
    #[serde(default)]
    pub yearly_max_variables: Vec<String>,
    #[serde(default)]
    pub overturning: OverturningConfig,
    /// Axes reduced together with `member` in ensemble statistics
    #[serde(default)]
    pub ensemble_axes: Vec<String>,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    #[serde(default)]
    pub chunks: ChunkSizes,
    #[serde(default)]
    pub missing: MissingPolicies,
    #[serde(default)]
    pub parallel: ParallelConfig,
}

impl JobConfig {
    /// Load and validate a JSON job description
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Io`] or [`OceanReduceError::Json`] if the
    /// file cannot be read or parsed, and [`OceanReduceError::Config`] if it
    /// fails validation.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`OceanReduceError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() || self.experiment.trim().is_empty() {
            return Err(OceanReduceError::Config(
                "model and experiment must be set".to_string(),
            ));
        }
        if self.window.num_years == 0 {
            return Err(OceanReduceError::Config(
                "the time window must cover at least one year".to_string(),
            ));
        }
        window_end_year(self.window.start_year, self.window.num_years)
            .map_err(|e| OceanReduceError::Config(e.to_string()))?;
        if let Some(bad) = self.members.iter().find(|m| m.trim().is_empty()) {
            return Err(OceanReduceError::Config(format!("invalid member id '{bad}'")));
        }
        if self.overturning.rolling_windows.contains(&0) {
            return Err(OceanReduceError::Config(
                "rolling windows must be at least one timestep".to_string(),
            ));
        }
        if let Some((axis, n)) = self.chunks.iter().find(|&(_, &n)| n == 0 || n < -1) {
            return Err(OceanReduceError::Config(format!(
                "chunk size {n} for axis '{axis}' must be positive or -1"
            )));
        }
        Ok(())
    }

    fn experiment_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.model).join(&self.experiment)
    }

    /// Where the raw output of `member` lives
    #[must_use]
    pub fn member_input_dir(&self, member: &str) -> PathBuf {
        self.experiment_dir(&self.input_root).join(member)
    }

    /// `{output_root}/{model}/{experiment}/{member}/Jan{start}-Dec{end}/cyclo{lumpby}`
    #[must_use]
    pub fn member_output_dir(&self, member: &str) -> PathBuf {
        self.experiment_dir(&self.output_root)
            .join(member)
            .join(self.window.label())
            .join(format!("cyclo{}", self.lumpby))
    }

    /// Overturning products of `member`, next to its climatologies
    #[must_use]
    pub fn overturning_output_dir(&self, member: &str) -> PathBuf {
        self.experiment_dir(&self.output_root)
            .join(member)
            .join(self.window.label())
            .join("overturning")
    }

    /// Ensemble statistics across every member
    #[must_use]
    pub fn ensemble_output_dir(&self) -> PathBuf {
        self.member_output_dir("all_members")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "model": "ACCESS-ESM1-5",
            "experiment": "historical",
            "members": ["r1i1p1f1"],
            "window": {"start_year": 1990, "num_years": 10},
            "input_root": "/data/in",
            "output_root": "/data/out"
        }"#
    }

    #[test]
    fn test_defaults() {
        let config: JobConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(config.lumpby, LumpBy::Month);
        assert_eq!(config.frequency, "mon");
        assert_eq!(config.missing.rolling, MissingPolicy::Propagate);
        assert_eq!(config.overturning.rolling_windows, vec![12, 120]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_window_past_year_range() {
        let mut config: JobConfig = serde_json::from_str(minimal_json()).unwrap();
        config.window = TimeWindow::new(1990, u32::MAX);
        assert!(matches!(config.validate(), Err(OceanReduceError::Config(_))));
        assert_eq!(config.window.end_year(), i32::MAX);
    }

    #[test]
    fn test_output_layout() {
        let config: JobConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(
            config.member_output_dir("r1i1p1f1"),
            PathBuf::from("/data/out/ACCESS-ESM1-5/historical/r1i1p1f1/Jan1990-Dec1999/cyclomonth")
        );
        assert_eq!(
            config.member_input_dir("r1i1p1f1"),
            PathBuf::from("/data/in/ACCESS-ESM1-5/historical/r1i1p1f1")
        );
    }

    #[test]
    fn test_validation() {
        let mut config: JobConfig = serde_json::from_str(minimal_json()).unwrap();
        config.window.num_years = 0;
        assert!(config.validate().is_err());
        config.window.num_years = 1;
        config.chunks = ChunkSizes::new().with("lat", 0);
        assert!(config.validate().is_err());
    }
}
