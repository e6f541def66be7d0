//! Churn models: where a process's sojourn times come from.

use super::State;
use crate::distribution::{Distribution, DistributionError};
use crate::engine::DeterministicRng;

/// Source of sojourn times for one process.
pub trait ChurnModel {
    /// Raw time of the first down-to-up transition, or `None` if the process
    /// never comes up.
    fn first_transition(&mut self, _rng: &mut DeterministicRng) -> Option<f64> {
        Some(0.0)
    }

    /// How long the process stays in `entering`, which it enters at raw
    /// time `now`.
    fn sojourn(&mut self, entering: State, now: f64, rng: &mut DeterministicRng) -> f64;

    /// A departed process stops re-arming.
    fn has_departed(&self) -> bool {
        false
    }

    /// Long-run fraction of time up; NaN when unknown.
    fn asymptotic_availability(&self) -> f64 {
        f64::NAN
    }
}

/// Stochastic renewal: independent up and down sojourns from two
/// distributions.
pub struct RenewalChurn {
    up: Box<dyn Distribution>,
    down: Box<dyn Distribution>,
}

impl RenewalChurn {
    /// Creates a renewal model from uptime and downtime distributions.
    pub fn new<U, D>(up: U, down: D) -> Self
    where
        U: Distribution + 'static,
        D: Distribution + 'static,
    {
        Self {
            up: Box::new(up),
            down: Box::new(down),
        }
    }

    /// Mean up sojourn.
    pub fn mean_uptime(&self) -> f64 {
        self.up.expectation()
    }

    /// Mean down sojourn.
    pub fn mean_downtime(&self) -> f64 {
        self.down.expectation()
    }
}

impl ChurnModel for RenewalChurn {
    fn sojourn(&mut self, entering: State, _now: f64, rng: &mut DeterministicRng) -> f64 {
        match entering {
            State::Up => self.up.sample(rng),
            State::Down => self.down.sample(rng),
        }
    }

    fn asymptotic_availability(&self) -> f64 {
        let up = self.mean_uptime();
        let down = self.mean_downtime();
        if up.is_finite() && down.is_finite() && up + down > 0.0 {
            up / (up + down)
        } else {
            f64::NAN
        }
    }
}

/// Replays recorded session boundaries.
///
/// `instants` alternate login, logout, login, ... in absolute raw time. The
/// process departs once every instant has been replayed; a trailing login
/// without a logout leaves it up for good.
#[derive(Debug, Clone)]
pub struct TraceChurn {
    instants: Vec<f64>,
    cursor: usize,
}

impl TraceChurn {
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If an instant is negative, not
    ///   finite, or earlier than the one before it
    pub fn new(instants: Vec<f64>) -> Result<Self, DistributionError> {
        let mut previous = 0.0;
        for &instant in &instants {
            if !instant.is_finite() || instant < previous {
                return Err(DistributionError::InvalidParameter {
                    name: "trace instant",
                    value: instant,
                });
            }
            previous = instant;
        }
        Ok(Self { instants, cursor: 0 })
    }

    /// Builds a trace from `(login, logout)` session pairs.
    ///
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If sessions overlap or run backwards
    pub fn from_sessions(sessions: &[(f64, f64)]) -> Result<Self, DistributionError> {
        Self::new(sessions.iter().flat_map(|&(login, logout)| [login, logout]).collect())
    }

    fn next_instant(&mut self) -> Option<f64> {
        let instant = self.instants.get(self.cursor).copied();
        if instant.is_some() {
            self.cursor += 1;
        }
        instant
    }
}

impl ChurnModel for TraceChurn {
    fn first_transition(&mut self, _rng: &mut DeterministicRng) -> Option<f64> {
        self.next_instant()
    }

    fn sojourn(&mut self, _entering: State, now: f64, _rng: &mut DeterministicRng) -> f64 {
        self.next_instant().map_or(f64::INFINITY, |instant| instant - now)
    }

    fn has_departed(&self) -> bool {
        self.cursor >= self.instants.len()
    }

    fn asymptotic_availability(&self) -> f64 {
        let (Some(first), Some(last)) = (self.instants.first(), self.instants.last()) else {
            return 0.0;
        };
        let span = last - first;
        if span <= 0.0 {
            return f64::NAN;
        }
        let up: f64 = self
            .instants
            .chunks(2)
            .filter_map(|pair| match pair {
                [login, logout] => Some(logout - login),
                _ => None,
            })
            .sum();
        up / span
    }
}
