//! Configuration for RSim kernel execution
//!
//! This module provides configuration types for controlling how a logical process
//! dispatches events and how the admission engine searches for allocations.
use crate::core::types::SimTime;
use serde::{Deserialize, Serialize};

/// How events produced by a worker during a tick reach the wait-queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchMode {
    /// Events at the current time are drained by the producing worker before it
    /// reports completion; later events go straight to the wait-queue
    #[default]
    Direct,
    /// Every produced event is held by the worker and merged into the wait-queue
    /// at the start of the next advance
    Buffered,
}

/// Configuration for simulation execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub dispatch_mode: DispatchMode,
    /// The size of the worker pool; `None` lets rayon choose
    pub thread_pool_size: Option<usize>,
    /// Time at which the sentinel fires and the run terminates
    pub end_time: SimTime,
    /// Seed for activity duration sampling
    pub seed: u64,
    /// Budget of candidate trials for the overlapping-resource assignment
    /// search; `None` searches exhaustively
    pub max_search_steps: Option<usize>,
}

impl SimulationConfig {
    /// Create a new simulation configuration with default values
    ///
    /// Default configuration uses direct dispatch, rayon's default pool size
    /// and an exhaustive assignment search
    pub fn new() -> Self {
        Self {
            dispatch_mode: DispatchMode::default(),
            thread_pool_size: None,
            end_time: 1_000,
            seed: 0,
            max_search_steps: None,
        }
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Set the number of worker threads
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    pub fn with_end_time(mut self, end_time: SimTime) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Bound the assignment search; exhausting the budget counts as infeasible
    pub fn with_search_budget(mut self, steps: usize) -> Self {
        self.max_search_steps = Some(steps);
        self
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.dispatch_mode, DispatchMode::Direct);
        assert_eq!(config.thread_pool_size, None);
        assert_eq!(config.max_search_steps, None);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::new()
            .with_dispatch_mode(DispatchMode::Buffered)
            .with_thread_pool_size(4)
            .with_end_time(250)
            .with_seed(7)
            .with_search_budget(64);

        assert_eq!(config.dispatch_mode, DispatchMode::Buffered);
        assert_eq!(config.thread_pool_size, Some(4));
        assert_eq!(config.end_time, 250);
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_search_steps, Some(64));
    }

    #[test]
    fn test_dispatch_mode_equality() {
        assert_eq!(DispatchMode::Direct, DispatchMode::Direct);
        assert_ne!(DispatchMode::Direct, DispatchMode::Buffered);
    }
}
