//! Rayon execution settings for the sample loop and DIM.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XvaError};

/// Minimum number of samples handed to one rayon task.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Sample count below which the engine runs sequentially.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}

/// Configuration for parallel execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Minimum samples per rayon task.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum samples before using parallelism.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    /// Dedicated pool size; `None` uses the global rayon pool.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            threads: None,
        }
    }
}

impl ParallelConfig {
    /// Creates a configuration using the global pool.
    pub fn new(batch_size: usize, parallel_threshold: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            parallel_threshold,
            threads: None,
        }
    }

    /// Runs on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Serial configuration, for tests and debugging.
    pub fn sequential() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_threshold: usize::MAX,
            threads: None,
        }
    }

    /// Returns whether to use parallel processing for the given item count.
    #[inline]
    pub fn should_parallelize(&self, n_items: usize) -> bool {
        n_items >= self.parallel_threshold
    }

    /// Number of worker threads a parallel section will use.
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Runs `op` inside the configured pool.
    ///
    /// # Errors
    ///
    /// `XvaError::Configuration` if the dedicated pool cannot be built.
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self.threads {
            None => Ok(op()),
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n.max(1))
                    .build()
                    .map_err(|e| XvaError::configuration(format!("thread pool: {}", e)))?;
                Ok(pool.install(op))
            }
        }
    }
}
