//! Parallel processing configuration and chunk executors
//!
//! The engine never spawns threads itself. Materialisation hands one task per
//! chunk to an [`Executor`] supplied by the caller; [`ParallelConfig`] builds a
//! bounded Rayon pool for that purpose.

use crate::errors::{OceanReduceError, Result};
use crate::field::Region;
use ndarray::ArrayD;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::info;

/// A chunk task: evaluate one region of a field
pub type ChunkTask<'a> = dyn Fn(&[Range<usize>]) -> Result<ArrayD<f64>> + Sync + 'a;

/// Opaque parallel executor for chunk tasks
pub trait Executor: Send + Sync {
    /// Run `task` once per region and return the blocks in region order
    ///
    /// # Errors
    ///
    /// Returns the first task error encountered.
    fn execute(&self, regions: &[Region], task: &ChunkTask<'_>) -> Result<Vec<ArrayD<f64>>>;

    /// Number of workers available to this executor
    fn workers(&self) -> usize;
}

/// Executes chunk tasks one after another on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn execute(&self, regions: &[Region], task: &ChunkTask<'_>) -> Result<Vec<ArrayD<f64>>> {
        regions.iter().map(|r| task(r.as_slice())).collect()
    }

    fn workers(&self) -> usize {
        1
    }
}

/// Executes chunk tasks on a dedicated, bounded Rayon thread pool
pub struct RayonExecutor {
    pool: ThreadPool,
}

impl RayonExecutor {
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ThreadPool`] if the pool cannot be built.
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("ocean-reduce-{i}"))
            .build()
            .map_err(|e| {
                OceanReduceError::ThreadPool(format!(
                    "Failed to initialize thread pool with {num_threads} threads: {e}"
                ))
            })?;
        Ok(Self { pool })
    }
}

impl std::fmt::Debug for RayonExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonExecutor")
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl Executor for RayonExecutor {
    fn execute(&self, regions: &[Region], task: &ChunkTask<'_>) -> Result<Vec<ArrayD<f64>>> {
        self.pool
            .install(|| regions.par_iter().map(|r| task(r.as_slice())).collect())
    }

    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Worker count; `None` uses every available core
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    #[must_use]
    pub const fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    #[must_use]
    pub const fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Number of workers this configuration resolves to
    #[must_use]
    pub fn resolved_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Build the bounded executor described by this configuration
    ///
    /// # Errors
    ///
    /// Returns [`OceanReduceError::ThreadPool`] if the pool cannot be built.
    pub fn build_executor(&self) -> Result<RayonExecutor> {
        let threads = self.resolved_threads();
        let executor = RayonExecutor::new(threads)?;
        info!("✅ Configured parallel processing with {threads} threads");
        Ok(executor)
    }
}

/// Get information about the current parallel configuration
#[must_use]
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information
    pub fn log(&self) {
        info!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "📊 Parallel processing information"
        );
    }
}
