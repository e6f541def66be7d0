//! Churnsim Core - Discrete-event churn simulation
//!
//! This crate simulates populations of unreliable nodes whose availability
//! follows renewal processes, and measures how a signal spreads across
//! them over time: a deterministic event engine, availability automata,
//! session-aware periodic actions and incremental temporal connectivity
//! estimators, plus a batch driver that runs many engines concurrently.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod config;
pub mod connectivity;
pub mod distribution;
pub mod engine;
pub mod experiment;
pub mod graph;
pub mod periodic;
pub mod process;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{EngineConfig, ExperimentConfig};
pub use connectivity::{EdgeChurnEstimator, TemporalConnectivityEstimator};
pub use distribution::{Distribution, DistributionError};
pub use engine::{Engine, EngineBuilder, RunOutcome, RunReport, SimulationError};
pub use experiment::{ExperimentError, run_batch};
pub use graph::{GraphError, NeighborGraph, StaticGraph};
pub use periodic::{PeriodicAction, PeriodicBehavior};
pub use process::presets::ChurnPreset;
pub use process::{Network, Process, ProcessId, State};

/// Errors that can bubble up from any churnsim subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ChurnsimError {
    /// Engine or component failure
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// Sampler construction failure
    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    /// Graph construction failure
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Batch driver failure
    #[error("Experiment error: {0}")]
    Experiment(#[from] ExperimentError),
}

impl ChurnsimError {
    /// Checks if this error comes from rejected input rather than a broken
    /// run.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ChurnsimError::Distribution(_)
                | ChurnsimError::Graph(_)
                | ChurnsimError::Simulation(SimulationError::InvalidConfiguration { .. })
                | ChurnsimError::Experiment(ExperimentError::Simulation(
                    SimulationError::InvalidConfiguration { .. }
                ))
        )
    }
}

/// Result alias for churnsim operations.
pub type Result<T> = std::result::Result<T, ChurnsimError>;
