//! Samplers for inter-event durations.
//!
//! Every sampler draws from the engine's [`DeterministicRng`], so a run is
//! reproducible from its seed alone. Parameters are validated at
//! construction; a sampler that exists can always be sampled.

mod continuous;
mod discrete;

use thiserror::Error;

use crate::engine::DeterministicRng;

pub use continuous::{Exponential, GeneralizedPareto, LeftTruncatedExponential, Uniform, Weibull};
pub use discrete::{Discrete, DiscreteExponential, Sequence};

/// Construction-time faults of a sampler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    /// Parameter outside its domain
    #[error("Invalid distribution parameter {name} = {value}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Rejected value
        value: f64,
    },

    /// Discrete distribution over no outcomes
    #[error("Probability vector is empty")]
    EmptyProbabilities,

    /// Sequence with nothing to replay
    #[error("Sequence is empty")]
    EmptySequence,

    /// Probabilities that cannot be normalized
    #[error("Invalid probabilities: {reason}")]
    InvalidProbabilities {
        /// What was wrong
        reason: String,
    },
}

/// One-dimensional distribution of non-negative durations.
pub trait Distribution {
    /// Draws one value.
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64;

    /// Analytic mean; infinite when the mean does not exist.
    fn expectation(&self) -> f64;
}

impl<D: Distribution + ?Sized> Distribution for Box<D> {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        (**self).sample(rng)
    }

    fn expectation(&self) -> f64 {
        (**self).expectation()
    }
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64, DistributionError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(DistributionError::InvalidParameter { name, value })
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<f64, DistributionError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DistributionError::InvalidParameter { name, value })
    }
}
