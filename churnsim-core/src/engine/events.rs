//! Event types and ordering for the simulation queue.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::component::ComponentId;
use crate::process::ProcessId;

/// Deterministic tie-break for events scheduled at the same instant.
///
/// Lower values are popped first when timestamps are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventKind(pub i32);

impl EventKind {
    /// Process up/down transitions.
    pub const PROCESS: EventKind = EventKind(0);
    /// Default kind for edge toggles in the edge-churn estimator.
    pub const EDGE: EventKind = EventKind(1);
    /// Periodic actions fire after every other kind at the same instant.
    pub const ACTION: EventKind = EventKind(i32::MAX);

    /// Returns the raw tie-break value.
    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EventKind::PROCESS => write!(f, "process"),
            EventKind::EDGE => write!(f, "edge"),
            EventKind::ACTION => write!(f, "action"),
            EventKind(other) => write!(f, "kind({other})"),
        }
    }
}

/// Unique, monotonically increasing event identifier.
///
/// Doubles as the final ordering key, so same-time same-kind events pop in
/// scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u64);

/// Who handles an event when it is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// A state transition of the process with this id.
    Process(ProcessId),
    /// A callback on a registered component.
    Component(ComponentId),
}

/// Scheduled event with timestamp and tie-break kind.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique event ID for deterministic ordering
    pub id: EventId,
    /// Scheduled execution time, in raw simulation time
    pub time: f64,
    /// Tie-break for events at the same timestamp
    pub kind: EventKind,
    /// Handler for this event
    pub target: EventTarget,
    /// Opaque payload for the target (edge id, slot index, ...)
    pub token: usize,
}

impl Event {
    /// Returns the process id if this is a process transition.
    pub fn process(&self) -> Option<ProcessId> {
        match self.target {
            EventTarget::Process(id) => Some(id),
            EventTarget::Component(_) => None,
        }
    }
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on every key so BinaryHeap behaves as a min-heap.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.kind.cmp(&self.kind))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
