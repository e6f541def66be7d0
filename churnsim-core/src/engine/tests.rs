//! Tests for the discrete-event engine.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use crate::config::EngineConfig;
use crate::distribution::{Exponential, Sequence};
use crate::engine::{
    Clock, Component, ComponentId, Engine, EngineBuilder, Event, EventId, EventKind, EventTarget, Invariant,
    InvariantViolation, LiveCountConsistency, RenewalConservation, RunOutcome, SimContext,
    SimulationError,
};
use crate::process::churn::{ChurnModel, RenewalChurn};
use crate::process::{Network, State};

type Log = Rc<RefCell<Vec<(f64, String)>>>;

/// Logs every hook it receives with the raw clock reading.
struct Recorder {
    label: &'static str,
    log: Log,
}

impl Recorder {
    fn new(label: &'static str, log: &Log) -> Self {
        Self {
            label,
            log: Rc::clone(log),
        }
    }

    fn push(&self, ctx: &SimContext<'_>, what: &str) {
        self.log
            .borrow_mut()
            .push((ctx.clock().raw_time(), format!("{}:{what}", self.label)));
    }
}

impl Component for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn on_event(&mut self, ctx: &mut SimContext<'_>, _event: &Event) -> Result<(), SimulationError> {
        self.push(ctx, "event");
        Ok(())
    }

    fn observe(&mut self, ctx: &mut SimContext<'_>, _event: &Event, _next: Option<f64>) -> Result<(), SimulationError> {
        self.push(ctx, "observe");
        Ok(())
    }

    fn on_burnin_end(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        self.push(ctx, "burnin");
        Ok(())
    }
}

/// Does nothing with its events.
struct Sink;

impl Component for Sink {
    fn name(&self) -> &str {
        "sink"
    }
}

/// Releases its binding after a number of events.
struct Countdown {
    remaining: usize,
}

impl Component for Countdown {
    fn name(&self) -> &str {
        "countdown"
    }

    fn on_event(&mut self, ctx: &mut SimContext<'_>, _event: &Event) -> Result<(), SimulationError> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            ctx.unbind();
        }
        Ok(())
    }
}

/// Cancels the listed events when burn-in ends.
struct Canceller {
    victims: Rc<RefCell<Vec<EventId>>>,
}

impl Component for Canceller {
    fn name(&self) -> &str {
        "canceller"
    }

    fn on_burnin_end(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        for id in self.victims.borrow_mut().drain(..) {
            ctx.cancel(id);
        }
        Ok(())
    }
}

/// Tries to schedule an event before the current clock.
struct TimeTraveler;

impl Component for TimeTraveler {
    fn name(&self) -> &str {
        "time-traveler"
    }

    fn on_event(&mut self, ctx: &mut SimContext<'_>, _event: &Event) -> Result<(), SimulationError> {
        let earlier = ctx.clock().raw_time() - 1.0;
        ctx.schedule(earlier, EventKind::ACTION).map(|_| ())
    }
}

struct NegativeChurn;

impl ChurnModel for NegativeChurn {
    fn sojourn(&mut self, _entering: State, _now: f64, _rng: &mut crate::engine::DeterministicRng) -> f64 {
        -1.0
    }
}

struct AlwaysViolated;

impl Invariant for AlwaysViolated {
    fn check(&self, clock: &Clock, _network: &Network) -> Result<(), InvariantViolation> {
        Err(InvariantViolation::new(self.name(), clock.raw_time(), "always"))
    }

    fn name(&self) -> &'static str {
        "AlwaysViolated"
    }
}

fn alternating(up: f64, down: f64) -> RenewalChurn {
    RenewalChurn::new(Sequence::new(vec![up]).unwrap(), Sequence::new(vec![down]).unwrap())
}

fn exponential_network(seed: u64, processes: usize, horizon: f64) -> Engine {
    let config = EngineConfig {
        horizon: Some(horizon),
        ..EngineConfig::with_seed(seed)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    for _ in 0..processes {
        builder.add_process(RenewalChurn::new(
            Exponential::with_mean(2.0).unwrap(),
            Exponential::with_mean(1.0).unwrap(),
        ));
    }
    builder.build().unwrap()
}

#[test]
fn test_same_time_events_pop_by_kind_then_schedule_order() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(Sink);
    builder
        .preschedule(id, 2.0, EventKind::EDGE, 0)
        .preschedule(id, 1.0, EventKind::ACTION, 0)
        .preschedule(id, 1.0, EventKind(5), 0)
        .preschedule(id, 1.0, EventKind::PROCESS, 0)
        .preschedule(id, 1.0, EventKind(5), 1);
    let mut engine = builder.build().unwrap();

    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert_eq!(
        engine.history(),
        &[
            (1.0, EventKind::PROCESS),
            (1.0, EventKind(5)),
            (1.0, EventKind(5)),
            (1.0, EventKind::ACTION),
            (2.0, EventKind::EDGE),
        ]
    );
    assert_eq!(report.stats.count(EventKind(5)), 2);
}

#[test]
fn test_cancelled_events_are_skipped_without_counting() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(Sink);
    let mut engine = builder.build().unwrap();

    let first = engine.schedule(1.0, EventKind::ACTION, EventTarget::Component(id), 0).unwrap();
    let second = engine.schedule(2.0, EventKind::ACTION, EventTarget::Component(id), 0).unwrap();
    engine.schedule(3.0, EventKind::ACTION, EventTarget::Component(id), 0).unwrap();
    assert!(engine.cancel(first));
    assert!(engine.cancel(second));
    assert!(!engine.cancel(second));
    assert_eq!(engine.pending_events(), 1);

    assert_eq!(engine.step(1).unwrap(), 1);
    assert_eq!(engine.clock().raw_time(), 3.0);
    assert_eq!(engine.stats().events_processed, 1);
    assert_eq!(engine.stats().expired_discarded, 2);
}

#[test]
fn test_scheduling_into_the_past_aborts_the_run() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(TimeTraveler);
    builder.preschedule(id, 5.0, EventKind::ACTION, 0);
    let mut engine = builder.build().unwrap();

    assert!(matches!(
        engine.run(),
        Err(SimulationError::ScheduleInPast { now, requested }) if now == 5.0 && requested == 4.0
    ));
    assert!(engine.is_done());
    assert!(matches!(engine.step(1), Err(SimulationError::AlreadyDone)));
}

#[test]
fn test_run_ends_when_last_binding_is_released() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let countdown = builder.add_component(Countdown { remaining: 2 });
    let sink = builder.add_component(Sink);
    builder
        .bind(countdown)
        .preschedule(countdown, 1.0, EventKind::ACTION, 0)
        .preschedule(countdown, 2.0, EventKind::ACTION, 0)
        .preschedule(countdown, 3.0, EventKind::ACTION, 0)
        .preschedule(sink, 10.0, EventKind::ACTION, 0);
    let mut engine = builder.build().unwrap();
    assert_eq!(engine.bound_count(), 1);

    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Unbound);
    assert_eq!(report.raw_time, 2.0);
    assert_eq!(engine.pending_events(), 2);
    assert_eq!(engine.bound_count(), 0);
}

#[test]
fn test_empty_queue_ends_run_even_while_bound() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(Sink);
    builder.bind(id);
    let mut engine = builder.build().unwrap();

    assert_eq!(engine.run().unwrap().outcome, RunOutcome::Exhausted);
    assert_eq!(engine.bound_count(), 1);
}

#[test]
fn test_unbind_requires_a_binding() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(Sink);
    let mut engine = builder.build().unwrap();

    assert!(matches!(
        engine.unbind(id),
        Err(SimulationError::NoBindingComponent { component: 0 })
    ));
    engine.bind(id).unwrap();
    assert!(engine.unbind(id).is_ok());
    assert!(matches!(
        engine.bind(ComponentId(7)),
        Err(SimulationError::UnknownComponent { component: 7 })
    ));
}

#[test]
fn test_builder_rejects_unknown_components() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    builder.observe(ComponentId(3), EventKind::PROCESS);

    assert!(matches!(
        builder.build(),
        Err(SimulationError::UnknownComponent { component: 3 })
    ));
}

#[test]
fn test_horizon_stops_before_later_events() {
    let mut engine = exponential_network(8, 10, 50.0);

    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::HorizonReached);
    assert_eq!(report.raw_time, 50.0);
    assert!(engine.history().iter().all(|&(time, _)| time <= 50.0));
    assert!(engine.pending_events() > 0);
}

#[test]
fn test_stop_ends_the_run() {
    let mut engine = exponential_network(1, 4, 1_000.0);

    assert_eq!(engine.step(5).unwrap(), 5);
    engine.stop();
    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(report.stats.events_processed, 5);
    assert!(matches!(engine.run(), Err(SimulationError::AlreadyDone)));
}

#[test]
fn test_burnin_hides_early_events_from_kind_observers() {
    let log: Log = Rc::default();
    let config = EngineConfig {
        burnin: 2.5,
        horizon: Some(4.5),
        ..EngineConfig::with_seed(2)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    let process = builder.add_process(alternating(1.0, 1.0));
    let observer = builder.add_component(Recorder::new("kind", &log));
    let subscriber = builder.add_component(Recorder::new("sub", &log));
    builder.observe(observer, EventKind::PROCESS);
    builder.subscribe(subscriber, process).unwrap();
    let mut engine = builder.build().unwrap();

    engine.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            (0.0, "sub:observe".to_string()),
            (1.0, "sub:observe".to_string()),
            (2.0, "sub:observe".to_string()),
            (2.5, "kind:burnin".to_string()),
            (2.5, "sub:burnin".to_string()),
            (3.0, "sub:observe".to_string()),
            (3.0, "kind:observe".to_string()),
            (4.0, "sub:observe".to_string()),
            (4.0, "kind:observe".to_string()),
        ]
    );
    assert_eq!(engine.clock().time(), 2.0);
}

#[test]
fn test_horizon_holds_when_burnin_cancels_the_next_event() {
    let victims: Rc<RefCell<Vec<EventId>>> = Rc::default();
    let config = EngineConfig {
        burnin: 5.0,
        horizon: Some(5.001),
        ..EngineConfig::with_seed(3)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    let id = builder.add_component(Canceller {
        victims: Rc::clone(&victims),
    });
    let mut engine = builder.build().unwrap();
    let near = engine.schedule(5.0005, EventKind::ACTION, EventTarget::Component(id), 0).unwrap();
    engine.schedule(100.0, EventKind::ACTION, EventTarget::Component(id), 0).unwrap();
    victims.borrow_mut().push(near);

    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::HorizonReached);
    assert!(report.raw_time <= 5.001);
    assert_eq!(report.stats.events_processed, 0);
    assert!(engine.history().is_empty());
}

#[test]
fn test_burnin_is_announced_when_queue_drains_early() {
    let log: Log = Rc::default();
    let config = EngineConfig {
        burnin: 4.0,
        ..EngineConfig::with_seed(5)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    let id = builder.add_component(Recorder::new("rec", &log));
    builder.preschedule(id, 1.0, EventKind::ACTION, 0);
    let mut engine = builder.build().unwrap();

    let report = engine.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert_eq!(report.raw_time, 4.0);
    assert_eq!(
        *log.borrow(),
        vec![(1.0, "rec:event".to_string()), (4.0, "rec:burnin".to_string())]
    );
}

#[test]
fn test_burnin_beyond_horizon_is_never_announced() {
    let log: Log = Rc::default();
    let config = EngineConfig {
        burnin: 4.0,
        horizon: Some(2.0),
        ..EngineConfig::with_seed(5)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    let id = builder.add_component(Recorder::new("rec", &log));
    builder.preschedule(id, 1.0, EventKind::ACTION, 0);
    let mut engine = builder.build().unwrap();

    assert_eq!(engine.run().unwrap().outcome, RunOutcome::Exhausted);
    assert_eq!(*log.borrow(), vec![(1.0, "rec:event".to_string())]);
}

#[test]
fn test_same_seed_replays_identically() {
    let mut first = exponential_network(99, 20, 200.0);
    let mut second = exponential_network(99, 20, 200.0);
    let mut other = exponential_network(100, 20, 200.0);

    first.run().unwrap();
    second.run().unwrap();
    other.run().unwrap();

    assert!(!first.history().is_empty());
    assert_eq!(first.history(), second.history());
    assert_ne!(first.history(), other.history());
}

#[test]
fn test_renewal_accounting_holds_throughout() {
    let config = EngineConfig {
        horizon: Some(300.0),
        ..EngineConfig::with_seed(5)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    for _ in 0..25 {
        builder.add_process(RenewalChurn::new(
            Exponential::with_mean(3.0).unwrap(),
            Exponential::with_mean(0.5).unwrap(),
        ));
    }
    builder
        .add_invariant(RenewalConservation)
        .add_invariant(LiveCountConsistency);
    let mut engine = builder.build().unwrap();

    let report = engine.run().unwrap();

    assert!(report.stats.invariant_violations.is_empty());
    let now = engine.clock().raw_time();
    for process in engine.network().processes() {
        assert!((process.uptime(now) + process.downtime(now) - now).abs() < 1e-6);
    }
}

#[test]
fn test_repeated_invariant_violations_abort() {
    let config = EngineConfig {
        max_invariant_violations: 3,
        ..EngineConfig::with_seed(0)
    };
    let mut builder = EngineBuilder::new(config).unwrap();
    builder.add_process(alternating(1.0, 1.0));
    builder.add_invariant(AlwaysViolated);
    let mut engine = builder.build().unwrap();

    assert!(matches!(
        engine.run(),
        Err(SimulationError::TooManyInvariantViolations { count: 3 })
    ));
    assert_eq!(engine.stats().invariant_violations.len(), 3);
}

#[test]
fn test_negative_sojourn_is_fatal() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    builder.add_process(NegativeChurn);
    let mut engine = builder.build().unwrap();

    assert!(matches!(
        engine.run(),
        Err(SimulationError::InvalidSojourn { process: 0, value }) if value == -1.0
    ));
}

#[test]
fn test_pinned_processes_never_transition() {
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    builder.add_pinned(State::Up);
    builder.add_pinned(State::Down);
    let mut engine = builder.build().unwrap();

    assert_eq!(engine.network().live(), 1);
    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Exhausted);
    assert_eq!(report.stats.events_processed, 0);
}

#[test]
fn test_with_component_gives_a_live_context() {
    let log: Log = Rc::default();
    let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
    let id = builder.add_component(Recorder::new("rec", &log));
    let mut engine = builder.build().unwrap();

    engine
        .with_component::<Recorder, _, _>(id, |_, ctx| ctx.schedule(4.0, EventKind::ACTION))
        .unwrap()
        .unwrap();
    assert!(matches!(
        engine.with_component::<Sink, _, _>(id, |_, _| ()),
        Err(SimulationError::ComponentTypeMismatch { component: 0 })
    ));
    assert!(engine.component::<Sink>(id).is_none());
    assert!(engine.component::<Recorder>(id).is_some());

    engine.run().unwrap();
    assert_eq!(log.borrow().as_slice(), &[(4.0, "rec:event".to_string())]);
}

proptest! {
    #[test]
    fn pops_never_go_back_in_time_or_kind(
        events in prop::collection::vec((0u32..40, 0i32..4), 1..120),
    ) {
        let mut builder = EngineBuilder::new(EngineConfig::default()).unwrap();
        let id = builder.add_component(Sink);
        for &(time, kind) in &events {
            builder.preschedule(id, f64::from(time) / 4.0, EventKind(kind), 0);
        }
        let mut engine = builder.build().unwrap();
        engine.run().unwrap();

        let history = engine.history();
        prop_assert_eq!(history.len(), events.len());
        for pair in history.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0 || (pair[0].0 == pair[1].0 && pair[0].1 <= pair[1].1));
        }
    }
}
