//! Centralized configuration for churnsim.
//!
//! Plain structs with defaults. Callers fill them from the command line or
//! build them in code; nothing is resolved reflectively.

use crate::engine::SimulationError;
use crate::process::presets::ChurnPreset;

/// Default cap on heap entries, live and expired.
pub const DEFAULT_MAX_QUEUE_LEN: usize = 1_000_000;

/// Default number of invariant violations tolerated before aborting.
pub const DEFAULT_MAX_INVARIANT_VIOLATIONS: usize = 10;

/// Settings for a single engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed for the engine's random number generator
    pub seed: u64,
    /// Raw time during which observers are not notified
    pub burnin: f64,
    /// Events strictly later than this are never popped (None = unbounded)
    pub horizon: Option<f64>,
    /// Maximum number of queued events
    pub max_queue_len: usize,
    /// Violations tolerated before the run aborts
    pub max_invariant_violations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            burnin: 0.0,
            horizon: None,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
            max_invariant_violations: DEFAULT_MAX_INVARIANT_VIOLATIONS,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Checks the configuration before an engine is built.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfiguration` - Negative or non-finite burn-in,
    ///   non-finite or negative horizon, or a zero queue length
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.burnin.is_finite() || self.burnin < 0.0 {
            return Err(invalid(format!("burn-in must be finite and >= 0, got {}", self.burnin)));
        }
        if let Some(horizon) = self.horizon {
            if !horizon.is_finite() || horizon < 0.0 {
                return Err(invalid(format!("horizon must be finite and >= 0, got {horizon}")));
            }
        }
        if self.max_queue_len == 0 {
            return Err(invalid("queue length must be positive".to_string()));
        }
        Ok(())
    }
}

/// Settings shared by the batch experiments.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Base seed; every task derives its own from it
    pub seed: u64,
    /// Independent repetitions per source
    pub repetitions: usize,
    /// Number of source vertices, taken in id order
    pub sources: usize,
    /// Burn-in before measurements start
    pub burnin: f64,
    /// Engines allowed to run at once
    pub workers: usize,
    /// Churn model for vertices
    pub preset: ChurnPreset,
    /// Toggle rate of every edge in edge-churn experiments
    pub edge_rate: f64,
    /// Measured time after burn-in; no run goes past it
    pub horizon: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            repetitions: 1,
            sources: 1,
            burnin: 0.0,
            workers: num_cpus::get(),
            preset: ChurnPreset::Exponential,
            edge_rate: 1.0,
            horizon: 1_000.0,
        }
    }
}

impl ExperimentConfig {
    /// Engine settings for one task of this experiment.
    pub fn engine_config(&self, seed: u64) -> EngineConfig {
        EngineConfig {
            seed,
            burnin: self.burnin,
            horizon: Some(self.burnin + self.horizon),
            ..EngineConfig::default()
        }
    }

    /// Checks the configuration before any task is spawned.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfiguration` - Zero workers, repetitions or
    ///   sources, a bad burn-in, a non-positive edge rate or horizon
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.workers == 0 {
            return Err(invalid("workers must be positive".to_string()));
        }
        if self.repetitions == 0 {
            return Err(invalid("repetitions must be positive".to_string()));
        }
        if self.sources == 0 {
            return Err(invalid("sources must be positive".to_string()));
        }
        if !(self.edge_rate.is_finite() && self.edge_rate > 0.0) {
            return Err(invalid(format!("edge rate must be positive, got {}", self.edge_rate)));
        }
        if !(self.horizon.is_finite() && self.horizon > 0.0) {
            return Err(invalid(format!("horizon must be positive, got {}", self.horizon)));
        }
        self.engine_config(self.seed).validate()
    }
}

fn invalid(reason: String) -> SimulationError {
    SimulationError::InvalidConfiguration { reason }
}
