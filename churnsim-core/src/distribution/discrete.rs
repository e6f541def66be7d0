//! Samplers over finite sets of values.

use rand::distr::weighted::{Error as WeightedError, WeightedIndex};

use super::{Distribution, DistributionError, non_negative, positive};
use crate::engine::DeterministicRng;

/// Finite distribution drawing `values[i]` with probability proportional to
/// its weight.
#[derive(Debug, Clone)]
pub struct Discrete {
    values: Vec<f64>,
    probabilities: Vec<f64>,
    index: WeightedIndex<f64>,
}

impl Discrete {
    /// Builds a distribution giving `values[i]` weight `weights[i]`.
    ///
    /// Weights are normalized, so they need not sum to one.
    ///
    /// # Errors
    ///
    /// - `DistributionError::EmptyProbabilities` - If there are no weights
    /// - `DistributionError::InvalidProbabilities` - On a length mismatch, a negative
    ///   or non-finite weight, or weights summing to zero
    /// - `DistributionError::InvalidParameter` - If a value is negative
    pub fn new(values: Vec<f64>, weights: &[f64]) -> Result<Self, DistributionError> {
        if values.len() != weights.len() {
            return Err(DistributionError::InvalidProbabilities {
                reason: format!("{} values for {} weights", values.len(), weights.len()),
            });
        }
        for value in &values {
            non_negative("value", *value)?;
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(DistributionError::InvalidProbabilities {
                reason: format!("weight {bad} is not finite"),
            });
        }
        let index = WeightedIndex::new(weights).map_err(weights_error)?;

        let total: f64 = weights.iter().sum();
        let probabilities = weights.iter().map(|w| w / total).collect();
        Ok(Self {
            values,
            probabilities,
            index,
        })
    }

    /// Returns the probability of the `index`-th value.
    pub fn probability(&self, index: usize) -> f64 {
        self.probabilities.get(index).copied().unwrap_or(0.0)
    }
}

fn weights_error(error: WeightedError) -> DistributionError {
    match error {
        WeightedError::InvalidInput => DistributionError::EmptyProbabilities,
        WeightedError::InsufficientNonZero => DistributionError::InvalidProbabilities {
            reason: "weights sum to zero".to_string(),
        },
        other => DistributionError::InvalidProbabilities {
            reason: other.to_string(),
        },
    }
}

impl Distribution for Discrete {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        let index: usize = rng.sample(&self.index);
        self.values[index]
    }

    fn expectation(&self) -> f64 {
        self.values
            .iter()
            .zip(&self.probabilities)
            .map(|(value, p)| value * p)
            .sum()
    }
}

/// Truncated geometric law: `P(k) ∝ exp(-rate * k)` for `k` in `0..=max`,
/// each outcome scaled by `step`.
#[derive(Debug, Clone)]
pub struct DiscreteExponential {
    inner: Discrete,
}

impl DiscreteExponential {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `rate` or `step` is not positive
    pub fn new(rate: f64, max: usize, step: f64) -> Result<Self, DistributionError> {
        let rate = positive("rate", rate)?;
        let step = positive("step", step)?;
        let values = (0..=max).map(|k| k as f64 * step).collect();
        let weights: Vec<f64> = (0..=max).map(|k| (-rate * k as f64).exp()).collect();
        Ok(Self {
            inner: Discrete::new(values, &weights)?,
        })
    }
}

impl Distribution for DiscreteExponential {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        self.inner.sample(rng)
    }

    fn expectation(&self) -> f64 {
        self.inner.expectation()
    }
}

/// Replays a fixed list of values in a cycle, ignoring the random source.
#[derive(Debug, Clone)]
pub struct Sequence {
    values: Vec<f64>,
    cursor: usize,
}

impl Sequence {
    /// # Errors
    ///
    /// - `DistributionError::EmptySequence` - If `values` is empty
    /// - `DistributionError::InvalidParameter` - If a value is negative or not finite
    pub fn new(values: Vec<f64>) -> Result<Self, DistributionError> {
        if values.is_empty() {
            return Err(DistributionError::EmptySequence);
        }
        for value in &values {
            non_negative("value", *value)?;
        }
        Ok(Self { values, cursor: 0 })
    }
}

impl Distribution for Sequence {
    fn sample(&mut self, _rng: &mut DeterministicRng) -> f64 {
        let value = self.values[self.cursor];
        self.cursor = (self.cursor + 1) % self.values.len();
        value
    }

    fn expectation(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}
