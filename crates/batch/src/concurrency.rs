//! Concurrency planning
//!
//! Derives how many engine processes may run at once from the CPU core count
//! and configuration.

use crate::config::Config;

/// Upper bound for the derived job count
const MAX_DERIVED_JOBS: u32 = 8;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of engine processes running at once
    pub max_concurrent_jobs: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// - Detects CPU cores via num_cpus if not specified in config
    /// - An explicit non-zero `queue.max_concurrent_jobs` is used unchanged
    /// - Otherwise one job per four cores, at least 1 and at most 8
    pub fn derive(cfg: &Config) -> Self {
        let total_cores = cfg
            .cpu
            .logical_cores
            .unwrap_or_else(|| num_cpus::get() as u32);

        let max_concurrent_jobs = if cfg.queue.max_concurrent_jobs > 0 {
            cfg.queue.max_concurrent_jobs
        } else {
            derive_max_jobs(total_cores)
        };

        Self {
            total_cores,
            max_concurrent_jobs,
        }
    }

    /// Limit as the queue consumes it
    pub fn queue_limit(&self) -> usize {
        self.max_concurrent_jobs.max(1) as usize
    }
}

fn derive_max_jobs(cores: u32) -> u32 {
    (cores / 4).clamp(1, MAX_DERIVED_JOBS)
}

pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
