//! Scheduler configuration.

use std::{num::NonZeroUsize, thread};

/// Tunables for a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker threads. Zero runs every job on the calling thread.
    pub workers: usize,
    /// Jobs one worker takes per system before the rest run on the
    /// calling thread.
    pub max_jobs_per_worker: usize,
    /// Merge staged mutations at the end of every frame.
    pub auto_merge: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            max_jobs_per_worker: 16,
            auto_merge: true,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with `workers` threads and defaults otherwise.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Read overrides from `TESSERA_WORKERS`, `TESSERA_MAX_JOBS_PER_WORKER`
    /// and `TESSERA_AUTO_MERGE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SchedulerConfig::from_env`], reading values through
    /// `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            workers: lookup("TESSERA_WORKERS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.workers),
            max_jobs_per_worker: lookup("TESSERA_MAX_JOBS_PER_WORKER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_jobs_per_worker),
            auto_merge: lookup("TESSERA_AUTO_MERGE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.auto_merge),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
