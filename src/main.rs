//! Entry point for the ocean-reduce application.
//! Handles CLI parsing, logging setup, and dispatches the processing runs.

use clap::Parser;
use ocean_reduce::cli::{Args, Command, DescribeArgs};
use ocean_reduce::field::ChunkSizes;
use ocean_reduce::metadata::{print_field_summary, print_file_summary, summarize_field};
use ocean_reduce::netcdf_io::{read_field, NetcdfSink};
use ocean_reduce::parallel::{get_parallel_info, Executor, ParallelConfig};
use ocean_reduce::pipeline::{Pipeline, RunReport};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn describe(args: &DescribeArgs, executor: &dyn Executor) -> ocean_reduce::Result<()> {
    print_file_summary(&args.file)?;
    if let Some(variable) = &args.variable {
        let field = read_field(&args.file, variable, ChunkSizes::new())?;
        let summary = summarize_field(&field, executor)?;
        print_field_summary(&field, &summary);
    }
    Ok(())
}

fn finish(reports: &[RunReport]) -> ExitCode {
    let failed: usize = reports.iter().map(RunReport::failed).sum();
    if failed == 0 {
        info!("✅ All runs finished");
        ExitCode::SUCCESS
    } else {
        error!("❌ {failed} product(s) failed");
        ExitCode::FAILURE
    }
}

fn run(args: Args) -> ocean_reduce::Result<ExitCode> {
    let reports = match args.command {
        Command::Describe(describe_args) => {
            let executor = ParallelConfig::new(args.threads).build_executor()?;
            describe(&describe_args, &executor)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Climatology(job) => {
            let config = job.into_config(args.threads)?;
            let executor: Arc<dyn Executor> = Arc::new(config.parallel.build_executor()?);
            let sink = NetcdfSink::new(executor);
            Pipeline::new(&config, &sink).climatology_all()
        }
        Command::Overturning(job) => {
            let config = job.into_config(args.threads)?;
            let executor: Arc<dyn Executor> = Arc::new(config.parallel.build_executor()?);
            let sink = NetcdfSink::new(executor);
            Pipeline::new(&config, &sink).overturning_all()
        }
        Command::Ensemble(job) => {
            let config = job.into_config(args.threads)?;
            let executor: Arc<dyn Executor> = Arc::new(config.parallel.build_executor()?);
            let sink = NetcdfSink::new(executor);
            vec![Pipeline::new(&config, &sink).ensemble()]
        }
    };
    Ok(finish(&reports))
}

fn main() -> ExitCode {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
                         ocean-reduce
        climatologies and overturning of ocean-model output
------------------------------------------------------------------
"#
    );
    if args.verbose {
        get_parallel_info().log();
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}
