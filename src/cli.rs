//! Defines command-line interface options using `clap` for the ocean-reduce application.

use crate::config::{JobConfig, MissingPolicies, OverturningConfig, TimeWindow};
use crate::errors::{OceanReduceError, Result};
use crate::field::ChunkSizes;
use crate::parallel::ParallelConfig;
use crate::statistics::LumpBy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Climatologies, overturning streamfunctions and ensemble statistics of ocean-model output
#[derive(Parser, Debug)]
#[command(
    version,
    name = "ocean-reduce",
    about = "Reduce chunked ocean-model output to climatological products"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Per-member climatologies of every configured variable
    Climatology(JobArgs),
    /// Overturning streamfunction products of every member
    Overturning(JobArgs),
    /// Statistics across members of previously written climatologies
    Ensemble(JobArgs),
    /// List the variables of a NetCDF file, or summarise one of them
    Describe(DescribeArgs),
}

/// Job options. Flags override the values of `--config`.
#[derive(clap::Args, Debug, Default)]
pub struct JobArgs {
    /// JSON job description
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub experiment: Option<String>,

    /// Member ids, comma separated
    #[arg(long, value_delimiter = ',')]
    pub members: Vec<String>,

    #[arg(long)]
    pub start_year: Option<i32>,

    #[arg(long)]
    pub num_years: Option<u32>,

    /// Climatology bins: month, season or year
    #[arg(long, value_parser = parse_lumpby)]
    pub lumpby: Option<LumpBy>,

    /// Output frequency tag of the input files
    #[arg(long)]
    pub frequency: Option<String>,

    /// Variables to reduce, comma separated
    #[arg(long, value_delimiter = ',')]
    pub variables: Vec<String>,

    /// Variables reduced to the mean of their yearly maxima, comma separated
    #[arg(long, value_delimiter = ',')]
    pub yearly_max: Vec<String>,

    /// Axes reduced together with the member axis, comma separated
    #[arg(long, value_delimiter = ',')]
    pub ensemble_axes: Vec<String>,

    #[arg(long)]
    pub input_root: Option<PathBuf>,

    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Chunk size per axis, formatted as <axis>=<len> (-1 for the whole axis)
    #[arg(long, value_parser = parse_chunk_arg)]
    pub chunk: Vec<(String, i64)>,
}

impl JobArgs {
    /// Build the immutable job configuration
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::Config`] if a required option is missing
    /// from both the flags and the configuration file, plus any error of
    /// [`JobConfig::from_json_file`] or [`JobConfig::validate`].
    pub fn into_config(self, threads: Option<usize>) -> Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::from_json_file(path)?,
            None => {
                let window = match (self.start_year, self.num_years) {
                    (Some(start), Some(num)) => TimeWindow::new(start, num),
                    _ => return Err(missing("--start-year and --num-years")),
                };
                JobConfig {
                    model: self.model.clone().ok_or_else(|| missing("--model"))?,
                    experiment: self
                        .experiment
                        .clone()
                        .ok_or_else(|| missing("--experiment"))?,
                    members: Vec::new(),
                    window,
                    lumpby: LumpBy::Month,
                    frequency: "mon".to_string(),
                    variables: Vec::new(),
                    yearly_max_variables: Vec::new(),
                    overturning: OverturningConfig::default(),
                    ensemble_axes: Vec::new(),
                    input_root: self
                        .input_root
                        .clone()
                        .ok_or_else(|| missing("--input-root"))?,
                    output_root: self
                        .output_root
                        .clone()
                        .ok_or_else(|| missing("--output-root"))?,
                    chunks: ChunkSizes::new(),
                    missing: MissingPolicies::default(),
                    parallel: ParallelConfig::default(),
                }
            }
        };

        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(experiment) = self.experiment {
            config.experiment = experiment;
        }
        if !self.members.is_empty() {
            config.members = self.members;
        }
        if let Some(start) = self.start_year {
            config.window.start_year = start;
        }
        if let Some(num) = self.num_years {
            config.window.num_years = num;
        }
        if let Some(lumpby) = self.lumpby {
            config.lumpby = lumpby;
        }
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        if !self.variables.is_empty() {
            config.variables = self.variables;
        }
        if !self.yearly_max.is_empty() {
            config.yearly_max_variables = self.yearly_max;
        }
        if !self.ensemble_axes.is_empty() {
            config.ensemble_axes = self.ensemble_axes;
        }
        if let Some(root) = self.input_root {
            config.input_root = root;
        }
        if let Some(root) = self.output_root {
            config.output_root = root;
        }
        for (axis, len) in self.chunk {
            config.chunks = config.chunks.with(axis, len);
        }
        if threads.is_some() {
            config.parallel.num_threads = threads;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(clap::Args, Debug)]
pub struct DescribeArgs {
    /// Path to the NetCDF file
    pub file: PathBuf,

    /// Decode one variable as a field and compute quick statistics
    #[arg(long)]
    pub variable: Option<String>,
}

fn missing(option: &str) -> OceanReduceError {
    OceanReduceError::Config(format!("{option} is required without --config"))
}

fn parse_lumpby(s: &str) -> std::result::Result<LumpBy, String> {
    s.parse().map_err(|e: OceanReduceError| e.to_string())
}

fn parse_chunk_arg(s: &str) -> std::result::Result<(String, i64), String> {
    match s.split_once('=') {
        Some((axis, len)) if !axis.is_empty() => len
            .parse::<i64>()
            .map(|len| (axis.to_string(), len))
            .map_err(|_| format!("Invalid chunk length for axis '{axis}'")),
        _ => Err("Invalid format: Expected '<axis>=<len>'.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_arg() {
        assert_eq!(parse_chunk_arg("potrho=40"), Ok(("potrho".to_string(), 40)));
        assert_eq!(parse_chunk_arg("time=-1"), Ok(("time".to_string(), -1)));
        assert!(parse_chunk_arg("potrho").is_err());
        assert!(parse_chunk_arg("=4").is_err());
        assert!(parse_chunk_arg("lat=x").is_err());
    }

    #[test]
    fn test_flags_build_config() {
        let args = Args::parse_from([
            "ocean-reduce",
            "-t",
            "2",
            "climatology",
            "--model",
            "ACCESS-OM2",
            "--experiment",
            "historical",
            "--members",
            "r1i1p1f1,r2i1p1f1",
            "--start-year",
            "1990",
            "--num-years",
            "10",
            "--lumpby",
            "season",
            "--variables",
            "thetao,so",
            "--input-root",
            "/in",
            "--output-root",
            "/out",
            "--chunk",
            "time=-1",
        ]);
        let Command::Climatology(job) = args.command else {
            panic!("expected the climatology subcommand");
        };
        let config = job.into_config(args.threads).unwrap();
        assert_eq!(config.members, vec!["r1i1p1f1", "r2i1p1f1"]);
        assert_eq!(config.lumpby, LumpBy::Season);
        assert_eq!(config.variables, vec!["thetao", "so"]);
        assert_eq!(config.chunks.get("time"), Some(-1));
        assert_eq!(config.parallel.num_threads, Some(2));
    }

    #[test]
    fn test_missing_required_option() {
        let job = JobArgs {
            model: Some("m".into()),
            ..JobArgs::default()
        };
        assert!(matches!(
            job.into_config(None),
            Err(OceanReduceError::Config(_))
        ));
    }
}
