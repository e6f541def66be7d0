//! Discrete-event scheduling kernel.
//!
//! A virtual clock, a min-heap event queue with deterministic tie-breaking
//! and lazy cancellation, and the engine loop that drives processes and
//! notifies components in stable registration order.

mod clock;
mod component;
mod events;
mod invariants;
mod queue;
mod simulation;
mod state;

// Re-export core types for public API
pub use clock::{Clock, DeterministicRng};
pub use component::{AsAny, Bindings, Component, ComponentId, SimContext};
pub use events::{Event, EventId, EventKind, EventTarget};
pub use invariants::{Invariant, InvariantViolation, LiveCountConsistency, RenewalConservation};
pub use queue::EventQueue;
pub use simulation::{Engine, EngineBuilder, SimulationError};
pub use state::{EngineStats, RunOutcome, RunReport};

#[cfg(test)]
mod tests;
