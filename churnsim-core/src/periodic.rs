//! Recurring actions that only run while their owner process is up.
//!
//! An action is due at `next_access`, a raw time. It keeps at most one event
//! in the queue, and only when that event is sure to fire before the owner's
//! current session ends. Otherwise the action waits for the owner's next
//! up-transition and re-evaluates there.

use crate::engine::{Component, Event, EventId, EventKind, SimContext, SimulationError};
use crate::process::ProcessId;

/// Spacing between tied actions of consecutive priorities (a millisecond
/// over a thousand, in hours).
pub const TIEBREAK_DELTA: f64 = 1.0 / 3_600_000_000.0;

/// What a [`PeriodicAction`] does when it fires.
pub trait PeriodicBehavior: 'static {
    /// Performs the action at the current clock and returns the raw time it
    /// is next due.
    fn perform(&mut self, ctx: &mut SimContext<'_>, owner: ProcessId) -> f64;

    /// Delay applied when the owner logs in with the timer already expired.
    fn grace(&self) -> f64 {
        0.0
    }
}

/// A session-aware timer attached to one process.
///
/// Subscribe it to its owner with `EngineBuilder::subscribe`.
#[derive(Debug)]
pub struct PeriodicAction<B> {
    owner: ProcessId,
    priority: i32,
    next_access: f64,
    pending: Option<(EventId, f64)>,
    behavior: B,
}

impl<B: PeriodicBehavior> PeriodicAction<B> {
    /// Creates an action first due at `initial`, shifted by its priority.
    pub fn new(owner: ProcessId, priority: i32, initial: f64, behavior: B) -> Self {
        Self {
            owner,
            priority,
            next_access: initial + priority_penalty(priority),
            pending: None,
            behavior,
        }
    }

    /// Owner process.
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Tie-break priority; lower fires first among tied actions.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Raw time the action is due next.
    pub fn next_access(&self) -> f64 {
        self.next_access
    }

    /// Tells whether an event is armed for the current session.
    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Time of the armed event, if any.
    pub fn scheduled_time(&self) -> Option<f64> {
        self.pending.map(|(_, time)| time)
    }

    /// Returns the behavior.
    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Moves the due time to `time` and fixes up the armed event.
    ///
    /// Cancels the armed event if `time` no longer falls in the current
    /// session, moves it if it does, and arms one if none was armed and
    /// `time` now falls in the session.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ProcessDown` - If the owner is not up
    /// - `SimulationError::ScheduleInPast` - If `time` lies before the clock and in-session
    pub fn new_timer(&mut self, ctx: &mut SimContext<'_>, time: f64) -> Result<(), SimulationError> {
        if !ctx.network().is_up(self.owner) {
            return Err(SimulationError::ProcessDown { process: self.owner });
        }

        self.next_access = time;

        match self.pending {
            Some((id, _)) if !self.should_access(ctx) => {
                tracing::trace!(
                    owner = self.owner,
                    now = ctx.clock().raw_time(),
                    next_access = time,
                    "QUENCH"
                );
                ctx.cancel(id);
                self.pending = None;
            }
            Some((id, armed)) => {
                if armed != time {
                    ctx.cancel(id);
                    self.pending = None;
                    self.arm(ctx)?;
                }
            }
            None if self.should_access(ctx) => self.arm(ctx)?,
            None => {}
        }
        Ok(())
    }

    fn should_access(&self, ctx: &SimContext<'_>) -> bool {
        ctx.network()
            .process(self.owner)
            .is_some_and(|process| self.next_access < process.next_transition())
    }

    fn arm(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        if let Some((stale, _)) = self.pending.take() {
            ctx.cancel(stale);
        }
        let id = ctx.schedule(self.next_access, EventKind::ACTION)?;
        self.pending = Some((id, self.next_access));
        tracing::trace!(owner = self.owner, at = self.next_access, "SCHEDULED");
        Ok(())
    }
}

impl<B: PeriodicBehavior> Component for PeriodicAction<B> {
    fn name(&self) -> &str {
        "periodic-action"
    }

    fn on_event(&mut self, ctx: &mut SimContext<'_>, event: &Event) -> Result<(), SimulationError> {
        if self.pending.map(|(id, _)| id) != Some(event.id) {
            return Ok(());
        }
        if !ctx.network().is_up(self.owner) {
            return Err(SimulationError::ProcessDown { process: self.owner });
        }

        self.pending = None;
        let due = self.behavior.perform(ctx, self.owner);
        self.new_timer(ctx, due + priority_penalty(self.priority))
    }

    fn observe(
        &mut self,
        ctx: &mut SimContext<'_>,
        event: &Event,
        next: Option<f64>,
    ) -> Result<(), SimulationError> {
        if event.process() != Some(self.owner) || !ctx.network().is_up(self.owner) {
            return Ok(());
        }

        let now = ctx.clock().raw_time();
        if self.next_access < now {
            let target = now + self.behavior.grace() + priority_penalty(self.priority);
            if next.unwrap_or(f64::INFINITY) > target {
                tracing::trace!(owner = self.owner, from = self.next_access, to = target, "NUDGE");
                self.next_access = target;
            } else {
                tracing::trace!(owner = self.owner, now, next_access = self.next_access, "NUDGE_ABORT");
                return Ok(());
            }
        }

        if self.should_access(ctx) {
            self.arm(ctx)
        } else {
            tracing::trace!(owner = self.owner, next_access = self.next_access, "DEFERRED");
            Ok(())
        }
    }
}

fn priority_penalty(priority: i32) -> f64 {
    f64::from(priority) * TIEBREAK_DELTA
}
