//! Discrete-event engine: pops events, drives processes, notifies observers.

use std::collections::BTreeMap;

use thiserror::Error;

use super::clock::{Clock, DeterministicRng};
use super::component::{AsAny, Bindings, Component, ComponentId, SimContext};
use super::events::{Event, EventId, EventKind, EventTarget};
use super::invariants::Invariant;
use super::queue::EventQueue;
use super::state::{EngineStats, RunOutcome, RunReport};
use crate::config::EngineConfig;
use crate::distribution::DistributionError;
use crate::graph::GraphError;
use crate::process::churn::ChurnModel;
use crate::process::{Network, Process, ProcessId, State};

/// Maximum number of popped events kept for inspection.
const MAX_EVENT_HISTORY: usize = 10_000;

/// Errors that can occur during simulation.
///
/// Everything except the configuration and distribution variants signals a
/// broken scheduling invariant; the run that produced it cannot continue.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Event queue exceeded maximum capacity
    #[error("Event queue overflow: {count} events scheduled")]
    EventQueueOverflow {
        /// Number of events that caused overflow
        count: usize,
    },

    /// Event scheduled before the current clock reading
    #[error("Cannot schedule event at {requested} before current time {now}")]
    ScheduleInPast {
        /// Clock reading at scheduling time
        now: f64,
        /// Requested event time
        requested: f64,
    },

    /// Event time is not a number
    #[error("Invalid event time: {time}")]
    InvalidEventTime {
        /// Offending time
        time: f64,
    },

    /// Clock asked to move to an earlier time
    #[error("Clock cannot move from {now} back to {target}")]
    ClockWentBackwards {
        /// Current time
        now: f64,
        /// Requested time
        target: f64,
    },

    /// Churn model produced a negative or NaN sojourn
    #[error("Process {process} drew invalid sojourn {value}")]
    InvalidSojourn {
        /// Process whose churn model misbehaved
        process: ProcessId,
        /// Drawn value
        value: f64,
    },

    /// Action fired or was retargeted while its owner was down
    #[error("Process {process} is down")]
    ProcessDown {
        /// Owner process
        process: ProcessId,
    },

    /// Process id not present in the network
    #[error("Unknown process {process}")]
    UnknownProcess {
        /// Requested id
        process: ProcessId,
    },

    /// Component id not registered with the engine
    #[error("Unknown component {component}")]
    UnknownComponent {
        /// Requested id
        component: usize,
    },

    /// Component re-entered while one of its own hooks was running
    #[error("Component {component} is already running")]
    ComponentBusy {
        /// Requested id
        component: usize,
    },

    /// Component downcast to the wrong concrete type
    #[error("Component {component} has a different type")]
    ComponentTypeMismatch {
        /// Requested id
        component: usize,
    },

    /// BFS queue asked to hold more than its capacity
    #[error("Queue capacity {capacity} exceeded by request for {requested}")]
    QueueCapacity {
        /// Fixed capacity
        capacity: usize,
        /// Requested length
        requested: usize,
    },

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },

    /// Engine already finished or aborted
    #[error("Engine has already finished")]
    AlreadyDone,

    /// Unbind requested for a component that holds no binding
    #[error("Component {component} is not bound")]
    NoBindingComponent {
        /// Requested id
        component: usize,
    },

    /// Configuration rejected before the run started
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong
        reason: String,
    },

    /// Distribution construction failed
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    /// Graph rejected by a component
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Single-threaded discrete-event engine.
///
/// Owns the clock, the queue and the process table. Components are stored in
/// slots and taken out while one of their hooks runs, so a hook can freely
/// mutate the queue through its [`SimContext`].
pub struct Engine {
    config: EngineConfig,
    clock: Clock,
    rng: DeterministicRng,
    queue: EventQueue,
    network: Network,
    components: Vec<Option<Box<dyn Component>>>,
    observers: BTreeMap<EventKind, Vec<ComponentId>>,
    subscribers: Vec<Vec<ComponentId>>,
    bindings: Bindings,
    invariants: Vec<Box<dyn Invariant>>,
    stats: EngineStats,
    history: Vec<(f64, EventKind)>,
    burnin_announced: bool,
    stopped: bool,
    poisoned: bool,
    outcome: Option<RunOutcome>,
}

impl Engine {
    /// Returns the simulation clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Returns the process table.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns counters collected so far.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Returns the `(time, kind)` of popped events, oldest first.
    pub fn history(&self) -> &[(f64, EventKind)] {
        &self.history
    }

    /// Returns the outcome once the run has finished.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Tells whether the engine refuses further steps.
    pub fn is_done(&self) -> bool {
        self.poisoned || self.outcome.is_some()
    }

    /// Number of events still waiting to fire.
    pub fn pending_events(&self) -> usize {
        self.queue.live_len()
    }

    /// Returns a registered component, if it has type `T`.
    pub fn component<T: Component>(&self, id: ComponentId) -> Option<&T> {
        let component = self.components.get(id.0)?.as_ref()?;
        AsAny::as_any(&**component).downcast_ref::<T>()
    }

    /// Runs `f` against a registered component with a live engine context.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownComponent` - If `id` is not registered
    /// - `SimulationError::ComponentTypeMismatch` - If the component is not a `T`
    pub fn with_component<T, R, F>(&mut self, id: ComponentId, f: F) -> Result<R, SimulationError>
    where
        T: Component,
        F: FnOnce(&mut T, &mut SimContext<'_>) -> R,
    {
        let mut component = self.take(id)?;
        let result = match AsAny::as_any_mut(&mut *component).downcast_mut::<T>() {
            Some(typed) => {
                let mut ctx = SimContext {
                    clock: &self.clock,
                    network: &self.network,
                    queue: &mut self.queue,
                    rng: &mut self.rng,
                    bindings: &mut self.bindings,
                    current: id,
                };
                Ok(f(typed, &mut ctx))
            }
            None => Err(SimulationError::ComponentTypeMismatch { component: id.0 }),
        };
        self.components[id.0] = Some(component);
        result
    }

    /// Schedules an event at raw time `time`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ScheduleInPast` - If `time` lies before the clock
    /// - `SimulationError::EventQueueOverflow` - If the queue is full
    pub fn schedule(
        &mut self,
        time: f64,
        kind: EventKind,
        target: EventTarget,
        token: usize,
    ) -> Result<EventId, SimulationError> {
        self.queue
            .schedule(self.clock.raw_time(), time, kind, target, token)
    }

    /// Expires a pending event. Returns false if it was no longer live.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    /// Takes a keep-alive latch on behalf of `id`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownComponent` - If `id` is not registered
    pub fn bind(&mut self, id: ComponentId) -> Result<(), SimulationError> {
        if id.0 >= self.components.len() {
            return Err(SimulationError::UnknownComponent { component: id.0 });
        }
        self.bindings.bind(id);
        Ok(())
    }

    /// Releases the latch held by `id`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::NoBindingComponent` - If `id` holds no latch
    pub fn unbind(&mut self, id: ComponentId) -> Result<(), SimulationError> {
        if self.bindings.unbind(id) {
            Ok(())
        } else {
            Err(SimulationError::NoBindingComponent { component: id.0 })
        }
    }

    /// Number of components still holding a latch.
    pub fn bound_count(&self) -> usize {
        self.bindings.count()
    }

    /// Requests the run to end at the next loop check.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Processes up to `n` events. Returns how many were processed.
    ///
    /// Expired events are discarded without counting. Fewer than `n` events
    /// are processed when the run finishes first.
    ///
    /// # Errors
    ///
    /// - `SimulationError::AlreadyDone` - If the engine has finished or aborted
    /// - Any error raised by a process, component or invariant check; the
    ///   engine refuses further steps afterwards
    pub fn step(&mut self, n: usize) -> Result<usize, SimulationError> {
        self.ensure_running()?;

        let mut processed = 0;
        while processed < n && self.outcome.is_none() {
            if self.advance_guarded()? {
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Runs until the engine is unbound, exhausted, past its horizon or
    /// stopped.
    ///
    /// # Errors
    ///
    /// - `SimulationError::AlreadyDone` - If the engine has finished or aborted
    /// - Any error raised by a process, component or invariant check
    pub fn run(&mut self) -> Result<RunReport, SimulationError> {
        self.ensure_running()?;

        let outcome = loop {
            if let Some(outcome) = self.outcome {
                break outcome;
            }
            self.advance_guarded()?;
        };

        tracing::debug!(
            seed = self.rng.seed(),
            time = self.clock.time(),
            events = self.stats.events_processed,
            ?outcome,
            "run finished"
        );
        Ok(self.report(outcome))
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        RunReport {
            seed: self.rng.seed(),
            raw_time: self.clock.raw_time(),
            time: self.clock.time(),
            stats: self.stats.clone(),
            outcome,
        }
    }

    fn ensure_running(&self) -> Result<(), SimulationError> {
        if self.is_done() {
            return Err(SimulationError::AlreadyDone);
        }
        Ok(())
    }

    fn advance_guarded(&mut self) -> Result<bool, SimulationError> {
        let result = self.advance();
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Processes one event, or records why the run is over.
    ///
    /// Burn-in hooks may cancel or add events, so the queue is inspected
    /// again after they run.
    fn advance(&mut self) -> Result<bool, SimulationError> {
        loop {
            if self.stopped {
                self.outcome = Some(RunOutcome::Stopped);
                return Ok(false);
            }
            if self.bindings.all_released() {
                self.outcome = Some(RunOutcome::Unbound);
                return Ok(false);
            }

            let Some(next_time) = self.queue.peek().map(|event| event.time) else {
                let burnin_in_range = self
                    .config
                    .horizon
                    .is_none_or(|horizon| horizon >= self.clock.burnin());
                if !self.burnin_announced && burnin_in_range {
                    self.announce_burnin()?;
                    continue;
                }
                self.finish_exhausted();
                return Ok(false);
            };

            if let Some(horizon) = self.config.horizon {
                if next_time > horizon {
                    self.clock.advance_to(horizon.max(self.clock.raw_time()))?;
                    self.outcome = Some(RunOutcome::HorizonReached);
                    return Ok(false);
                }
            }

            if !self.burnin_announced && next_time >= self.clock.burnin() {
                self.announce_burnin()?;
                continue;
            }

            let Some(event) = self.queue.pop() else {
                continue;
            };

            self.clock.advance_to(event.time)?;
            self.process_event(&event)?;

            if self.history.len() < MAX_EVENT_HISTORY {
                self.history.push((event.time, event.kind));
            }
            self.stats.record_event(event.kind);
            self.stats.expired_discarded = self.queue.discarded();

            self.check_invariants()?;

            if self.bindings.all_released() {
                tracing::debug!(time = self.clock.time(), "all bindings released");
                self.outcome = Some(RunOutcome::Unbound);
            }
            return Ok(true);
        }
    }

    fn finish_exhausted(&mut self) {
        if self.bindings.count() > 0 {
            tracing::warn!(
                bound = self.bindings.count(),
                time = self.clock.time(),
                "event queue exhausted while components are still bound"
            );
        }
        self.outcome = Some(RunOutcome::Exhausted);
    }

    fn announce_burnin(&mut self) -> Result<(), SimulationError> {
        self.burnin_announced = true;
        self.clock.advance_to(self.clock.burnin())?;
        tracing::debug!(raw_time = self.clock.raw_time(), "burn-in over");

        for index in 0..self.components.len() {
            self.dispatch(ComponentId(index), |component, ctx| {
                component.on_burnin_end(ctx)
            })?;
        }
        Ok(())
    }

    fn process_event(&mut self, event: &Event) -> Result<(), SimulationError> {
        match event.target {
            EventTarget::Process(process) => {
                let now = self.clock.raw_time();
                let next = self.network.transition(process, now, &mut self.rng)?;

                let armed = match next {
                    Some(time) => Some(self.queue.schedule(
                        now,
                        time,
                        EventKind::PROCESS,
                        EventTarget::Process(process),
                        0,
                    )?),
                    None => None,
                };
                if let Some(stale) = self.network.set_pending(process, armed) {
                    self.queue.cancel(stale);
                }

                let subscribers = self.subscribers.get(process).cloned().unwrap_or_default();
                for id in subscribers {
                    self.notify(id, event, next)?;
                }
                if !self.clock.is_burning_in() {
                    self.notify_observers(event, next)?;
                }
            }
            EventTarget::Component(id) => {
                self.dispatch(id, |component, ctx| component.on_event(ctx, event))?;
                if !self.clock.is_burning_in() {
                    self.notify_observers(event, None)?;
                }
            }
        }
        Ok(())
    }

    fn notify_observers(&mut self, event: &Event, next: Option<f64>) -> Result<(), SimulationError> {
        let Some(observers) = self.observers.get(&event.kind).cloned() else {
            return Ok(());
        };
        for id in observers {
            self.notify(id, event, next)?;
        }
        Ok(())
    }

    fn notify(&mut self, id: ComponentId, event: &Event, next: Option<f64>) -> Result<(), SimulationError> {
        self.dispatch(id, |component, ctx| {
            if component.is_done() {
                return Ok(());
            }
            component.observe(ctx, event, next)
        })
    }

    fn take(&mut self, id: ComponentId) -> Result<Box<dyn Component>, SimulationError> {
        self.components
            .get_mut(id.0)
            .ok_or(SimulationError::UnknownComponent { component: id.0 })?
            .take()
            .ok_or(SimulationError::ComponentBusy { component: id.0 })
    }

    fn dispatch<F>(&mut self, id: ComponentId, f: F) -> Result<(), SimulationError>
    where
        F: FnOnce(&mut dyn Component, &mut SimContext<'_>) -> Result<(), SimulationError>,
    {
        let mut component = self.take(id)?;
        let result = {
            let mut ctx = SimContext {
                clock: &self.clock,
                network: &self.network,
                queue: &mut self.queue,
                rng: &mut self.rng,
                bindings: &mut self.bindings,
                current: id,
            };
            f(&mut *component, &mut ctx)
        };
        self.components[id.0] = Some(component);
        result
    }

    fn check_invariants(&mut self) -> Result<(), SimulationError> {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(&self.clock, &self.network) {
                tracing::warn!(%violation, "invariant violated");
                self.stats.record_invariant_violation(violation);

                if self.stats.invariant_violations.len() >= self.config.max_invariant_violations {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: self.stats.invariant_violations.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Assembles processes, components and initial events into an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    rng: DeterministicRng,
    network: Network,
    first_transitions: Vec<(ProcessId, f64)>,
    components: Vec<Box<dyn Component>>,
    observers: BTreeMap<EventKind, Vec<ComponentId>>,
    subscribers: Vec<Vec<ComponentId>>,
    bound: Vec<ComponentId>,
    prescheduled: Vec<(ComponentId, f64, EventKind, usize)>,
    invariants: Vec<Box<dyn Invariant>>,
}

impl EngineBuilder {
    /// Starts a builder for the given configuration.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfiguration` - If the configuration is rejected
    pub fn new(config: EngineConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            rng: DeterministicRng::from_seed(config.seed),
            config,
            network: Network::default(),
            first_transitions: Vec::new(),
            components: Vec::new(),
            observers: BTreeMap::new(),
            subscribers: Vec::new(),
            bound: Vec::new(),
            prescheduled: Vec::new(),
            invariants: Vec::new(),
        })
    }

    /// Random source shared with the engine, for drawing parameters at
    /// build time from the same seed.
    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    /// Number of processes added so far.
    pub fn process_count(&self) -> usize {
        self.network.size()
    }

    /// Adds a churning process. It starts down; its first transition is
    /// armed when the engine is built.
    pub fn add_process<C>(&mut self, mut churn: C) -> ProcessId
    where
        C: ChurnModel + 'static,
    {
        let id = self.network.size();
        if let Some(first) = churn.first_transition(&mut self.rng) {
            self.first_transitions.push((id, first));
        }
        self.network.push(Process::new(id, Box::new(churn)));
        self.subscribers.push(Vec::new());
        id
    }

    /// Adds a process that stays in `state` forever.
    pub fn add_pinned(&mut self, state: State) -> ProcessId {
        let id = self.network.size();
        self.network.push(Process::pinned(id, state));
        self.subscribers.push(Vec::new());
        id
    }

    /// Registers a component.
    pub fn add_component<C: Component>(&mut self, component: C) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.components.push(Box::new(component));
        id
    }

    /// Notifies `id` of every event of `kind` once burn-in is over.
    pub fn observe(&mut self, id: ComponentId, kind: EventKind) -> &mut Self {
        self.observers.entry(kind).or_default().push(id);
        self
    }

    /// Notifies `id` of every state change of `process`, burn-in included.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownProcess` - If `process` was not added
    pub fn subscribe(&mut self, id: ComponentId, process: ProcessId) -> Result<&mut Self, SimulationError> {
        self.subscribers
            .get_mut(process)
            .ok_or(SimulationError::UnknownProcess { process })?
            .push(id);
        Ok(self)
    }

    /// Takes a keep-alive latch for `id` from the start of the run.
    pub fn bind(&mut self, id: ComponentId) -> &mut Self {
        self.bound.push(id);
        self
    }

    /// Schedules an initial event for `id`.
    pub fn preschedule(&mut self, id: ComponentId, time: f64, kind: EventKind, token: usize) -> &mut Self {
        self.prescheduled.push((id, time, kind, token));
        self
    }

    /// Adds an invariant checked after every event.
    pub fn add_invariant<I: Invariant + 'static>(&mut self, invariant: I) -> &mut Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Arms the initial events and returns the engine.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownComponent` - If an observer, binding or
    ///   initial event names an unregistered component
    /// - `SimulationError::ScheduleInPast` - If an initial event lies before zero
    /// - `SimulationError::EventQueueOverflow` - If the initial events overflow the queue
    pub fn build(self) -> Result<Engine, SimulationError> {
        let component_count = self.components.len();
        let check = |id: &ComponentId| {
            if id.0 < component_count {
                Ok(())
            } else {
                Err(SimulationError::UnknownComponent { component: id.0 })
            }
        };
        self.observers.values().flatten().try_for_each(check)?;
        self.subscribers.iter().flatten().try_for_each(check)?;
        self.bound.iter().try_for_each(check)?;
        self.prescheduled.iter().try_for_each(|(id, ..)| check(id))?;

        let mut queue = EventQueue::new(self.config.max_queue_len);
        let mut network = self.network;
        for (process, time) in self.first_transitions {
            let id = queue.schedule(0.0, time, EventKind::PROCESS, EventTarget::Process(process), 0)?;
            network.set_pending(process, Some(id));
        }
        for (component, time, kind, token) in self.prescheduled {
            queue.schedule(0.0, time, kind, EventTarget::Component(component), token)?;
        }

        let mut bindings = Bindings::default();
        for id in self.bound {
            bindings.bind(id);
        }

        tracing::debug!(
            seed = self.config.seed,
            processes = network.size(),
            components = component_count,
            burnin = self.config.burnin,
            "engine built"
        );

        Ok(Engine {
            clock: Clock::new(self.config.burnin),
            rng: self.rng,
            queue,
            network,
            components: self.components.into_iter().map(Some).collect(),
            observers: self.observers,
            subscribers: self.subscribers,
            bindings,
            invariants: self.invariants,
            stats: EngineStats::default(),
            history: Vec::new(),
            burnin_announced: false,
            stopped: false,
            poisoned: false,
            outcome: None,
            config: self.config,
        })
    }
}
