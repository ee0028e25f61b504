//! Execution configuration.

use quiver_core::{Error, Result};

/// Environment variable read by [`ExecutionConfig::from_env`].
pub const THREADS_ENV: &str = "QUIVER_THREADS";

/// Default number of tasks each slot is given when an entry space is split.
pub const DEFAULT_TASKS_PER_SLOT: usize = 2;

/// How many execution slots an event loop uses.
///
/// The slot count is resolved once, when a data frame is created, and fixes
/// the loop type for the lifetime of its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionConfig {
    threads: Option<usize>,
    tasks_per_slot: usize,
}

impl ExecutionConfig {
    /// Sequential execution.
    pub fn new() -> Self {
        Self {
            threads: None,
            tasks_per_slot: DEFAULT_TASKS_PER_SLOT,
        }
    }

    /// Multi-slot execution with `n` worker threads; `0` uses every available core.
    pub fn with_threads(n: usize) -> Self {
        Self {
            threads: Some(n),
            ..Self::new()
        }
    }

    /// Reads the thread count from `QUIVER_THREADS`, sequential when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(THREADS_ENV) {
            Ok(value) => {
                let n = value.trim().parse::<usize>().map_err(|_| {
                    Error::invalid_value(THREADS_ENV, format!("{:?} is not a thread count", value))
                })?;
                Ok(Self::with_threads(n))
            }
            Err(std::env::VarError::NotPresent) => Ok(Self::new()),
            Err(e) => Err(Error::invalid_value(THREADS_ENV, e.to_string())),
        }
    }

    /// Sets how many tasks per slot an empty source is split into.
    pub fn tasks_per_slot(mut self, n: usize) -> Self {
        self.tasks_per_slot = n.max(1);
        self
    }

    #[inline]
    pub fn get_threads(&self) -> Option<usize> {
        self.threads
    }

    #[inline]
    pub fn get_tasks_per_slot(&self) -> usize {
        self.tasks_per_slot
    }

    /// The number of slots this configuration resolves to.
    pub fn n_slots(&self) -> usize {
        match self.threads {
            None => 1,
            Some(0) => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Some(n) => n,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sequential() {
        let config = ExecutionConfig::default();
        assert_eq!(config.get_threads(), None);
        assert_eq!(config.n_slots(), 1);
        assert_eq!(config.get_tasks_per_slot(), DEFAULT_TASKS_PER_SLOT);
    }

    #[test]
    fn test_with_threads() {
        assert_eq!(ExecutionConfig::with_threads(4).n_slots(), 4);
        assert!(ExecutionConfig::with_threads(0).n_slots() >= 1);
        assert_eq!(ExecutionConfig::new().tasks_per_slot(0).get_tasks_per_slot(), 1);
    }
}
