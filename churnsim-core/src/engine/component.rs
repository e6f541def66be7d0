//! Components, their view of the engine, and binding bookkeeping.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use super::clock::{Clock, DeterministicRng};
use super::events::{Event, EventId, EventKind, EventTarget};
use super::queue::EventQueue;
use super::simulation::SimulationError;
use crate::process::Network;

/// Index of a component registered with an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Downcasting support for components stored as trait objects.
pub trait AsAny: Any {
    /// Returns self as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Returns self as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Anything the engine drives: event callbacks and observers.
///
/// All hooks run to completion on the engine thread. Errors abort the run.
pub trait Component: AsAny {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Called when an event targeting this component is popped.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` when the component detects a broken invariant.
    fn on_event(&mut self, _ctx: &mut SimContext<'_>, _event: &Event) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Called after an event this component subscribed to was processed.
    ///
    /// `next` is the time of the follow-up event armed by the handler (the
    /// end of the current session for process transitions), or `None` if the
    /// handler armed nothing.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` when the component detects a broken invariant.
    fn observe(
        &mut self,
        _ctx: &mut SimContext<'_>,
        _event: &Event,
        _next: Option<f64>,
    ) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Called once, when the clock first reaches the end of burn-in.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` when the component detects a broken invariant.
    fn on_burnin_end(&mut self, _ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Done observers are no longer notified.
    fn is_done(&self) -> bool {
        false
    }
}

/// Keep-alive latches held by components.
///
/// The run ends once at least one component has bound and every bound
/// component has released its latch. Components must unbind themselves.
#[derive(Debug, Default)]
pub struct Bindings {
    bound: BTreeSet<ComponentId>,
    ever_bound: bool,
}

impl Bindings {
    pub(crate) fn bind(&mut self, id: ComponentId) {
        self.bound.insert(id);
        self.ever_bound = true;
    }

    pub(crate) fn unbind(&mut self, id: ComponentId) -> bool {
        self.bound.remove(&id)
    }

    /// Tells whether `id` currently holds a latch.
    pub fn is_bound(&self, id: ComponentId) -> bool {
        self.bound.contains(&id)
    }

    /// Number of components still holding a latch.
    pub fn count(&self) -> usize {
        self.bound.len()
    }

    /// True once every latch taken has been released.
    pub fn all_released(&self) -> bool {
        self.ever_bound && self.bound.is_empty()
    }
}

/// A component's window into the engine while one of its hooks runs.
pub struct SimContext<'a> {
    pub(crate) clock: &'a Clock,
    pub(crate) network: &'a Network,
    pub(crate) queue: &'a mut EventQueue,
    pub(crate) rng: &'a mut DeterministicRng,
    pub(crate) bindings: &'a mut Bindings,
    pub(crate) current: ComponentId,
}

impl SimContext<'_> {
    /// Returns the simulation clock.
    pub fn clock(&self) -> &Clock {
        self.clock
    }

    /// Returns the process table.
    pub fn network(&self) -> &Network {
        self.network
    }

    /// Returns the engine's random number generator.
    pub fn rng(&mut self) -> &mut DeterministicRng {
        self.rng
    }

    /// Returns the id of the component whose hook is running.
    pub fn component_id(&self) -> ComponentId {
        self.current
    }

    /// Schedules an event for the running component at raw time `time`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ScheduleInPast` - If `time` lies before the clock
    /// - `SimulationError::EventQueueOverflow` - If the queue is full
    pub fn schedule(&mut self, time: f64, kind: EventKind) -> Result<EventId, SimulationError> {
        self.schedule_with_token(time, kind, 0)
    }

    /// Like [`SimContext::schedule`], carrying a payload for the handler.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ScheduleInPast` - If `time` lies before the clock
    /// - `SimulationError::EventQueueOverflow` - If the queue is full
    pub fn schedule_with_token(
        &mut self,
        time: f64,
        kind: EventKind,
        token: usize,
    ) -> Result<EventId, SimulationError> {
        self.queue.schedule(
            self.clock.raw_time(),
            time,
            kind,
            EventTarget::Component(self.current),
            token,
        )
    }

    /// Expires a pending event. Returns false if it was no longer live.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    /// Tells whether an event is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.queue.is_live(id)
    }

    /// Releases the running component's keep-alive latch.
    pub fn unbind(&mut self) {
        if self.bindings.unbind(self.current) {
            tracing::debug!(component = %self.current, "binding released");
        }
    }
}
