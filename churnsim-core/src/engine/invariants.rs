//! Post-event consistency checks on the process table.

use std::fmt;

use serde::Serialize;

use super::clock::Clock;
use crate::process::{Network, ProcessId};

/// Absolute tolerance for floating-point time accounting.
const TIME_TOLERANCE: f64 = 1e-6;

/// A failed check, stamped with the raw time it was detected at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Name of the failed check
    pub invariant: &'static str,
    /// Offending process, when the check is per process
    pub process: Option<ProcessId>,
    /// What was observed
    pub detail: String,
    /// Raw simulation time
    pub time: f64,
}

impl InvariantViolation {
    /// Creates a network-wide violation.
    pub fn new(invariant: &'static str, time: f64, detail: impl Into<String>) -> Self {
        Self {
            invariant,
            process: None,
            detail: detail.into(),
            time,
        }
    }

    /// Attributes the violation to one process.
    pub fn for_process(mut self, process: ProcessId) -> Self {
        self.process = Some(process);
        self
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at t={}", self.invariant, self.time)?;
        if let Some(process) = self.process {
            write!(f, " (process {process})")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// A property of the process table checked after every event.
pub trait Invariant {
    /// Checks the table as it stands after the last event.
    ///
    /// # Errors
    /// Returns `InvariantViolation` describing the first inconsistency found.
    fn check(&self, clock: &Clock, network: &Network) -> Result<(), InvariantViolation>;

    /// Name reported in violations.
    fn name(&self) -> &'static str;
}

/// Up time plus down time of every process equals the elapsed raw time.
#[derive(Debug, Default)]
pub struct RenewalConservation;

impl Invariant for RenewalConservation {
    fn check(&self, clock: &Clock, network: &Network) -> Result<(), InvariantViolation> {
        let now = clock.raw_time();
        let tolerance = TIME_TOLERANCE * now.max(1.0);
        match network
            .processes()
            .iter()
            .find(|process| (process.uptime(now) + process.downtime(now) - now).abs() > tolerance)
        {
            Some(process) => {
                let up = process.uptime(now);
                let down = process.downtime(now);
                Err(InvariantViolation::new(self.name(), now, format!("up {up} + down {down} != {now}"))
                    .for_process(process.id()))
            }
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "RenewalConservation"
    }
}

/// Cached live count matches the processes actually up.
#[derive(Debug, Default)]
pub struct LiveCountConsistency;

impl Invariant for LiveCountConsistency {
    fn check(&self, clock: &Clock, network: &Network) -> Result<(), InvariantViolation> {
        let counted = network.processes().iter().filter(|p| p.is_up()).count();
        if counted == network.live() {
            return Ok(());
        }
        Err(InvariantViolation::new(
            self.name(),
            clock.raw_time(),
            format!("cached {}, counted {counted}", network.live()),
        ))
    }

    fn name(&self) -> &'static str {
        "LiveCountConsistency"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display_names_the_process() {
        let violation = InvariantViolation::new("RenewalConservation", 2.5, "up 1 + down 1 != 2.5").for_process(4);
        assert_eq!(
            violation.to_string(),
            "RenewalConservation at t=2.5 (process 4): up 1 + down 1 != 2.5"
        );
    }

    #[test]
    fn test_empty_network_is_consistent() {
        let clock = Clock::new(0.0);
        let network = Network::default();
        assert!(RenewalConservation.check(&clock, &network).is_ok());
        assert!(LiveCountConsistency.check(&clock, &network).is_ok());
    }
}
