//! Per-node availability automata and the table that owns them.

pub mod churn;
pub mod presets;

use std::fmt;

use crate::engine::{DeterministicRng, EventId, SimulationError};
use churn::ChurnModel;

/// Index of a process in its [`Network`].
pub type ProcessId = usize;

/// Availability of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Online
    Up,
    /// Offline
    Down,
}

impl State {
    /// The other state.
    pub fn opposite(self) -> State {
        match self {
            State::Up => State::Down,
            State::Down => State::Up,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Up => write!(f, "up"),
            State::Down => write!(f, "down"),
        }
    }
}

/// A node that alternates between up and down.
///
/// Every process starts down at time zero. On each transition it flips state,
/// books the elapsed interval against the state it left, and asks its churn
/// model how long it will stay in the new one. Pinned processes have no churn
/// model and never transition.
pub struct Process {
    id: ProcessId,
    state: State,
    last_transition: f64,
    next_transition: f64,
    cumulative_up: f64,
    cumulative_down: f64,
    transitions: u64,
    churn: Option<Box<dyn ChurnModel>>,
    pending: Option<EventId>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("last_transition", &self.last_transition)
            .field("next_transition", &self.next_transition)
            .field("cumulative_up", &self.cumulative_up)
            .field("cumulative_down", &self.cumulative_down)
            .field("pinned", &self.churn.is_none())
            .finish()
    }
}

impl Process {
    pub(crate) fn new(id: ProcessId, churn: Box<dyn ChurnModel>) -> Self {
        Self {
            id,
            state: State::Down,
            last_transition: 0.0,
            next_transition: f64::INFINITY,
            cumulative_up: 0.0,
            cumulative_down: 0.0,
            transitions: 0,
            churn: Some(churn),
            pending: None,
        }
    }

    pub(crate) fn pinned(id: ProcessId, state: State) -> Self {
        Self {
            id,
            state,
            last_transition: 0.0,
            next_transition: f64::INFINITY,
            cumulative_up: 0.0,
            cumulative_down: 0.0,
            transitions: 0,
            churn: None,
            pending: None,
        }
    }

    /// Returns the process id.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Tells whether the process is up.
    pub fn is_up(&self) -> bool {
        self.state == State::Up
    }

    /// Raw time of the last transition (zero before the first).
    pub fn last_transition(&self) -> f64 {
        self.last_transition
    }

    /// Raw time at which the current state ends, or infinity if the process
    /// will not transition again.
    pub fn next_transition(&self) -> f64 {
        self.next_transition
    }

    /// Number of transitions so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Tells whether the process can never transition.
    pub fn is_pinned(&self) -> bool {
        self.churn.is_none()
    }

    /// Total time spent up by raw time `now`, current session included.
    pub fn uptime(&self, now: f64) -> f64 {
        match self.state {
            State::Up => self.cumulative_up + (now - self.last_transition).max(0.0),
            State::Down => self.cumulative_up,
        }
    }

    /// Total time spent down by raw time `now`, current session included.
    pub fn downtime(&self, now: f64) -> f64 {
        match self.state {
            State::Down => self.cumulative_down + (now - self.last_transition).max(0.0),
            State::Up => self.cumulative_down,
        }
    }

    /// Fraction of time spent up by `now`; NaN before any time elapsed.
    pub fn empirical_availability(&self, now: f64) -> f64 {
        let up = self.uptime(now);
        let total = up + self.downtime(now);
        if total > 0.0 { up / total } else { f64::NAN }
    }

    /// Long-run fraction of time up predicted by the churn model.
    pub fn asymptotic_availability(&self) -> f64 {
        match &self.churn {
            Some(churn) => churn.asymptotic_availability(),
            None if self.is_up() => 1.0,
            None => 0.0,
        }
    }

    /// Flips the state at raw time `now` and returns the time of the next
    /// transition, or `None` if the process stops churning.
    fn transition(&mut self, now: f64, rng: &mut DeterministicRng) -> Result<Option<f64>, SimulationError> {
        let elapsed = (now - self.last_transition).max(0.0);
        match self.state {
            State::Up => self.cumulative_up += elapsed,
            State::Down => self.cumulative_down += elapsed,
        }
        self.state = self.state.opposite();
        self.last_transition = now;
        self.transitions += 1;
        self.next_transition = f64::INFINITY;

        let Some(churn) = self.churn.as_mut() else {
            return Ok(None);
        };
        if churn.has_departed() {
            return Ok(None);
        }

        let sojourn = churn.sojourn(self.state, now, rng);
        if sojourn.is_nan() || sojourn < 0.0 {
            return Err(SimulationError::InvalidSojourn {
                process: self.id,
                value: sojourn,
            });
        }
        self.next_transition = now + sojourn;
        Ok(Some(self.next_transition))
    }
}

/// Arena of processes indexed by id, plus a live count.
#[derive(Debug, Default)]
pub struct Network {
    processes: Vec<Process>,
    live: usize,
}

impl Network {
    /// Number of processes.
    pub fn size(&self) -> usize {
        self.processes.len()
    }

    /// Number of processes currently up.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Returns a process by id.
    pub fn process(&self, id: ProcessId) -> Option<&Process> {
        self.processes.get(id)
    }

    /// Returns all processes, in id order.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Tells whether `id` is up. Unknown ids read as down.
    pub fn is_up(&self, id: ProcessId) -> bool {
        self.processes.get(id).is_some_and(Process::is_up)
    }

    pub(crate) fn push(&mut self, process: Process) {
        if process.is_up() {
            self.live += 1;
        }
        self.processes.push(process);
    }

    pub(crate) fn transition(
        &mut self,
        id: ProcessId,
        now: f64,
        rng: &mut DeterministicRng,
    ) -> Result<Option<f64>, SimulationError> {
        let process = self
            .processes
            .get_mut(id)
            .ok_or(SimulationError::UnknownProcess { process: id })?;
        let next = process.transition(now, rng)?;
        match process.state {
            State::Up => self.live += 1,
            State::Down => self.live -= 1,
        }
        Ok(next)
    }

    /// Stores the handle of the armed transition, returning the previous one.
    pub(crate) fn set_pending(&mut self, id: ProcessId, pending: Option<EventId>) -> Option<EventId> {
        let process = self.processes.get_mut(id)?;
        std::mem::replace(&mut process.pending, pending)
    }
}
