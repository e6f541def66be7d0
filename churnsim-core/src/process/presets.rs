//! Yao churn presets.
//!
//! Each node gets its own mean uptime `li` and mean downtime `di`, drawn
//! once from shifted Pareto laws. A mode then turns `(li, di)` into the pair
//! of sojourn distributions the node renews with.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::churn::RenewalChurn;
use crate::distribution::{
    Distribution, DistributionError, Exponential, GeneralizedPareto, LeftTruncatedExponential,
};
use crate::engine::DeterministicRng;

/// Shape of the laws the per-node means are drawn from.
const AVERAGE_ALPHA: f64 = 3.0;
/// Scale of the mean-uptime law.
const AVERAGE_BETA_UP: f64 = 1.0;
/// Scale of the mean-downtime law.
const AVERAGE_BETA_DOWN: f64 = 2.0;
/// Pareto scale multiplier applied to `li`/`di` in the Pareto modes.
const PARETO_SCALE: f64 = 2.0;
/// Five seconds, in hours.
const TRUNCATION_CUTOFF: f64 = 5.0 / 3600.0;

/// Churn mode turning per-node means into sojourn distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChurnPreset {
    /// Pareto uptimes and downtimes, alpha 3 (`H`)
    #[value(name = "h")]
    HeavyTailed,
    /// Pareto uptimes and downtimes, alpha 1.5 (`VH`)
    #[value(name = "vh")]
    VeryHeavyTailed,
    /// Exponential uptimes, Pareto downtimes (`E`)
    #[value(name = "e")]
    Exponential,
    /// Exponential uptimes and downtimes (`TE`)
    #[value(name = "te")]
    TotallyExponential,
    /// Exponential sojourns of at least five seconds (`LTE`)
    #[value(name = "lte")]
    TruncatedExponential,
}

impl ChurnPreset {
    /// Short identifier of the mode.
    pub fn id(self) -> &'static str {
        match self {
            ChurnPreset::HeavyTailed => "H",
            ChurnPreset::VeryHeavyTailed => "VH",
            ChurnPreset::Exponential => "E",
            ChurnPreset::TotallyExponential => "TE",
            ChurnPreset::TruncatedExponential => "LTE",
        }
    }

    /// Uptime distribution for a node with mean uptime `li`.
    ///
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `li` is not finite and positive
    pub fn uptime(self, li: f64) -> Result<Box<dyn Distribution>, DistributionError> {
        Ok(match self {
            ChurnPreset::HeavyTailed => Box::new(GeneralizedPareto::new(3.0, PARETO_SCALE * li, 0.0)?),
            ChurnPreset::VeryHeavyTailed => Box::new(GeneralizedPareto::new(1.5, PARETO_SCALE * li, 0.0)?),
            ChurnPreset::Exponential | ChurnPreset::TotallyExponential => {
                Box::new(Exponential::with_mean(li)?)
            }
            ChurnPreset::TruncatedExponential => {
                Box::new(LeftTruncatedExponential::new(1.0 / li, TRUNCATION_CUTOFF)?)
            }
        })
    }

    /// Downtime distribution for a node with mean downtime `di`.
    ///
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If `di` is not finite and positive
    pub fn downtime(self, di: f64) -> Result<Box<dyn Distribution>, DistributionError> {
        Ok(match self {
            ChurnPreset::HeavyTailed | ChurnPreset::Exponential => {
                Box::new(GeneralizedPareto::new(3.0, PARETO_SCALE * di, 0.0)?)
            }
            ChurnPreset::VeryHeavyTailed => Box::new(GeneralizedPareto::new(1.5, PARETO_SCALE * di, 0.0)?),
            ChurnPreset::TotallyExponential => Box::new(Exponential::with_mean(di)?),
            ChurnPreset::TruncatedExponential => {
                Box::new(LeftTruncatedExponential::new(1.0 / di, TRUNCATION_CUTOFF)?)
            }
        })
    }

    /// Renewal churn for a node with the given means.
    ///
    /// # Errors
    ///
    /// - `DistributionError::InvalidParameter` - If either mean is not finite and positive
    pub fn churn(self, node: &NodeParameters) -> Result<RenewalChurn, DistributionError> {
        Ok(RenewalChurn::new(
            self.uptime(node.li)?,
            self.downtime(node.di)?,
        ))
    }
}

impl fmt::Display for ChurnPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ChurnPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "H" => Ok(ChurnPreset::HeavyTailed),
            "VH" => Ok(ChurnPreset::VeryHeavyTailed),
            "E" => Ok(ChurnPreset::Exponential),
            "TE" => Ok(ChurnPreset::TotallyExponential),
            "LTE" => Ok(ChurnPreset::TruncatedExponential),
            _ => Err(format!("Unknown churn preset: {s}")),
        }
    }
}

/// Per-node mean uptime and downtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeParameters {
    /// Mean uptime
    pub li: f64,
    /// Mean downtime
    pub di: f64,
}

impl NodeParameters {
    /// Availability implied by the means, `li / (li + di)`.
    pub fn availability(&self) -> f64 {
        self.li / (self.li + self.di)
    }
}

/// Draws per-node means from the Yao generator.
///
/// # Errors
///
/// Never fails with the built-in constants; the `Result` carries
/// construction errors of the underlying Pareto laws.
pub fn yao_averages(nodes: usize, rng: &mut DeterministicRng) -> Result<Vec<NodeParameters>, DistributionError> {
    let mut li = GeneralizedPareto::new(AVERAGE_ALPHA, AVERAGE_BETA_UP, 0.0)?;
    let mut di = GeneralizedPareto::new(AVERAGE_ALPHA, AVERAGE_BETA_DOWN, 0.0)?;
    Ok((0..nodes)
        .map(|_| NodeParameters {
            li: li.sample(rng),
            di: di.sample(rng),
        })
        .collect())
}
