//! Run statistics and final reports.

use std::collections::BTreeMap;

use serde::Serialize;

use super::events::EventKind;
use super::invariants::InvariantViolation;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every bound component released its latch
    Unbound,
    /// No live events remained
    Exhausted,
    /// Next event lies past the configured horizon
    HorizonReached,
    /// `stop()` was called
    Stopped,
}

/// Counters collected while the engine runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Events popped and handled
    pub events_processed: u64,
    /// Cancelled events dropped from the queue
    pub expired_discarded: u64,
    /// Handled events by kind
    pub events_by_kind: BTreeMap<EventKind, u64>,
    /// Invariant violations seen so far
    pub invariant_violations: Vec<InvariantViolation>,
}

impl EngineStats {
    /// Records a handled event.
    pub fn record_event(&mut self, kind: EventKind) {
        self.events_processed += 1;
        *self.events_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Records an invariant violation.
    pub fn record_invariant_violation(&mut self, violation: InvariantViolation) {
        self.invariant_violations.push(violation);
    }

    /// Returns the count of handled events of `kind`.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.events_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Seed used for reproduction
    pub seed: u64,
    /// Final clock reading, burn-in included
    pub raw_time: f64,
    /// Final clock reading after burn-in
    pub time: f64,
    /// Collected counters
    pub stats: EngineStats,
    /// Why the run ended
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Run Report (seed: {})\n", self.seed));
        summary.push_str(&format!("Outcome: {:?}\n", self.outcome));
        summary.push_str(&format!("Time: {} (raw {})\n", self.time, self.raw_time));
        summary.push_str(&format!("Events processed: {}\n", self.stats.events_processed));
        summary.push_str(&format!("Expired discarded: {}\n", self.stats.expired_discarded));
        summary.push_str("\nEvent breakdown:\n");

        for (kind, count) in &self.stats.events_by_kind {
            summary.push_str(&format!("  {kind}: {count}\n"));
        }

        if !self.stats.invariant_violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.stats.invariant_violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_event_counts_by_kind() {
        let mut stats = EngineStats::default();
        stats.record_event(EventKind::PROCESS);
        stats.record_event(EventKind::PROCESS);
        stats.record_event(EventKind::ACTION);

        assert_eq!(stats.events_processed, 3);
        assert_eq!(stats.count(EventKind::PROCESS), 2);
        assert_eq!(stats.count(EventKind::ACTION), 1);
        assert_eq!(stats.count(EventKind::EDGE), 0);
    }

    #[test]
    fn test_summary_lists_kinds_and_violations() {
        let mut stats = EngineStats::default();
        stats.record_event(EventKind::EDGE);
        stats.record_invariant_violation(InvariantViolation::new(
            "LiveCountConsistency",
            4.0,
            "cached 3, counted 2",
        ));
        let report = RunReport {
            seed: 9,
            raw_time: 5.0,
            time: 4.0,
            stats,
            outcome: RunOutcome::Exhausted,
        };

        let summary = report.summary();
        assert!(summary.contains("seed: 9"));
        assert!(summary.contains("edge: 1"));
        assert!(summary.contains("LiveCountConsistency"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut stats = EngineStats::default();
        stats.record_event(EventKind::PROCESS);
        let report = RunReport {
            seed: 3,
            raw_time: 2.0,
            time: 1.0,
            stats,
            outcome: RunOutcome::HorizonReached,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "HorizonReached");
        assert_eq!(json["stats"]["events_processed"], 1);
        assert_eq!(json["stats"]["events_by_kind"]["0"], 1);
    }
}
