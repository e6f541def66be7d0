//! Continuous duration samplers backed by `rand_distr`.

use rand_distr::{Exp, Pareto};
use statrs::function::gamma::gamma;

use super::{Distribution, DistributionError, non_negative, positive};
use crate::engine::DeterministicRng;

/// Exponential distribution with the given rate.
#[derive(Debug, Clone)]
pub struct Exponential {
    rate: f64,
    inner: Exp<f64>,
}

impl Exponential {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `rate` is not finite and positive
    pub fn new(rate: f64) -> Result<Self, DistributionError> {
        let rate = positive("rate", rate)?;
        let inner = Exp::new(rate).map_err(|_| DistributionError::InvalidParameter {
            name: "rate",
            value: rate,
        })?;
        Ok(Self { rate, inner })
    }

    /// Exponential distribution with mean `mean`.
    ///
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `mean` is not finite and positive
    pub fn with_mean(mean: f64) -> Result<Self, DistributionError> {
        Self::new(1.0 / positive("mean", mean)?)
    }

    /// Returns the rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Distribution for Exponential {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        rng.sample(&self.inner)
    }

    fn expectation(&self) -> f64 {
        1.0 / self.rate
    }
}

/// Generalized Pareto distribution with shape `alpha`, scale `beta` and
/// location `mu`.
///
/// Draws `mu + beta * (U^(-1/alpha) - 1)`, so values start at `mu`.
#[derive(Debug, Clone)]
pub struct GeneralizedPareto {
    alpha: f64,
    beta: f64,
    mu: f64,
    inner: Pareto<f64>,
}

impl GeneralizedPareto {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `alpha` or `beta` is not positive,
    ///   or `mu` is negative
    pub fn new(alpha: f64, beta: f64, mu: f64) -> Result<Self, DistributionError> {
        let alpha = positive("alpha", alpha)?;
        let beta = positive("beta", beta)?;
        let mu = non_negative("mu", mu)?;
        let inner = Pareto::new(beta, alpha).map_err(|_| DistributionError::InvalidParameter {
            name: "alpha",
            value: alpha,
        })?;
        Ok(Self {
            alpha,
            beta,
            mu,
            inner,
        })
    }

    /// Returns the shape parameter.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the scale parameter.
    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl Distribution for GeneralizedPareto {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        // Pareto draws start at beta; shift so they start at mu.
        (rng.sample::<f64, _>(&self.inner) - self.beta).max(0.0) + self.mu
    }

    fn expectation(&self) -> f64 {
        if self.alpha <= 1.0 {
            return f64::INFINITY;
        }
        self.mu + self.beta / (self.alpha - 1.0)
    }
}

/// Weibull distribution with scale `lambda` and shape `k`.
#[derive(Debug, Clone)]
pub struct Weibull {
    lambda: f64,
    k: f64,
    inner: rand_distr::Weibull<f64>,
}

impl Weibull {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If either parameter is not finite and positive
    pub fn new(lambda: f64, k: f64) -> Result<Self, DistributionError> {
        let lambda = positive("lambda", lambda)?;
        let k = positive("k", k)?;
        let inner = rand_distr::Weibull::new(lambda, k)
            .map_err(|_| DistributionError::InvalidParameter { name: "k", value: k })?;
        Ok(Self { lambda, k, inner })
    }
}

impl Distribution for Weibull {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        rng.sample(&self.inner)
    }

    fn expectation(&self) -> f64 {
        self.lambda * gamma(1.0 + 1.0 / self.k)
    }
}

/// Uniform distribution over `[low, high)`.
#[derive(Debug, Clone)]
pub struct Uniform {
    low: f64,
    high: f64,
    inner: rand::distr::Uniform<f64>,
}

impl Uniform {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `low` is negative or `high <= low`
    pub fn new(low: f64, high: f64) -> Result<Self, DistributionError> {
        let low = non_negative("low", low)?;
        if !(high.is_finite() && high > low) {
            return Err(DistributionError::InvalidParameter {
                name: "high",
                value: high,
            });
        }
        let inner = rand::distr::Uniform::new(low, high).map_err(|_| {
            DistributionError::InvalidParameter {
                name: "high",
                value: high,
            }
        })?;
        Ok(Self { low, high, inner })
    }
}

impl Distribution for Uniform {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        rng.sample(&self.inner)
    }

    fn expectation(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

/// Exponential distribution conditioned on exceeding `cutoff`.
///
/// By memorylessness this is `cutoff` plus an exponential draw.
#[derive(Debug, Clone)]
pub struct LeftTruncatedExponential {
    cutoff: f64,
    tail: Exponential,
}

impl LeftTruncatedExponential {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `rate` is not positive or `cutoff` is negative
    pub fn new(rate: f64, cutoff: f64) -> Result<Self, DistributionError> {
        Ok(Self {
            cutoff: non_negative("cutoff", cutoff)?,
            tail: Exponential::new(rate)?,
        })
    }
}

impl Distribution for LeftTruncatedExponential {
    fn sample(&mut self, rng: &mut DeterministicRng) -> f64 {
        self.cutoff + self.tail.sample(rng)
    }

    fn expectation(&self) -> f64 {
        self.cutoff + self.tail.expectation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWS: usize = 200_000;

    fn empirical_mean<D: Distribution>(distribution: &mut D, seed: u64) -> f64 {
        let mut rng = DeterministicRng::from_seed(seed);
        (0..DRAWS).map(|_| distribution.sample(&mut rng)).sum::<f64>() / DRAWS as f64
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance * expected.abs(),
            "{actual} not within {tolerance} of {expected}"
        );
    }

    #[test]
    fn test_exponential_mean() {
        let mut exp = Exponential::new(2.0).unwrap();
        assert_eq!(exp.expectation(), 0.5);
        assert_close(empirical_mean(&mut exp, 1), 0.5, 0.02);
    }

    #[test]
    fn test_exponential_rejects_bad_rate() {
        assert!(matches!(
            Exponential::new(0.0),
            Err(DistributionError::InvalidParameter { name: "rate", .. })
        ));
        assert!(Exponential::new(f64::NAN).is_err());
        assert!(Exponential::with_mean(-1.0).is_err());
    }

    #[test]
    fn test_generalized_pareto_mean_and_support() {
        let mut gpd = GeneralizedPareto::new(3.0, 2.0, 0.5).unwrap();
        assert_eq!(gpd.expectation(), 1.5);

        let mut rng = DeterministicRng::from_seed(3);
        for _ in 0..10_000 {
            assert!(gpd.sample(&mut rng) >= 0.5);
        }
        assert_close(empirical_mean(&mut gpd, 4), 1.5, 0.05);
    }

    #[test]
    fn test_generalized_pareto_heavy_tail_has_no_mean() {
        let gpd = GeneralizedPareto::new(1.0, 1.0, 0.0).unwrap();
        assert!(gpd.expectation().is_infinite());
    }

    #[test]
    fn test_weibull_mean() {
        // Shape 1 is the exponential with mean lambda.
        let mut weibull = Weibull::new(3.0, 1.0).unwrap();
        assert_close(weibull.expectation(), 3.0, 1e-9);
        assert_close(empirical_mean(&mut weibull, 5), 3.0, 0.02);

        let rayleigh = Weibull::new(1.0, 2.0).unwrap();
        assert_close(rayleigh.expectation(), std::f64::consts::PI.sqrt() / 2.0, 1e-9);
    }

    #[test]
    fn test_uniform_bounds() {
        let mut uniform = Uniform::new(1.0, 3.0).unwrap();
        let mut rng = DeterministicRng::from_seed(6);
        for _ in 0..10_000 {
            let value = uniform.sample(&mut rng);
            assert!((1.0..3.0).contains(&value));
        }
        assert_eq!(uniform.expectation(), 2.0);
        assert!(Uniform::new(2.0, 2.0).is_err());
    }

    #[test]
    fn test_left_truncated_exponential_starts_at_cutoff() {
        let cutoff = 5.0 / 3600.0;
        let mut lte = LeftTruncatedExponential::new(1.0, cutoff).unwrap();
        let mut rng = DeterministicRng::from_seed(8);
        for _ in 0..10_000 {
            assert!(lte.sample(&mut rng) >= cutoff);
        }
        assert_close(lte.expectation(), 1.0 + cutoff, 1e-12);
    }

    #[test]
    fn test_weibull_mean_at_fractional_shape() {
        // Gamma(3) = 2.
        let weibull = Weibull::new(2.0, 0.5).unwrap();
        assert_close(weibull.expectation(), 4.0, 1e-10);
    }
}
