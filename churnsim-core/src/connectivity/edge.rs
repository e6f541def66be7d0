//! Temporal connectivity over churning edges.
//!
//! Vertices never go down; every undirected edge is an independent on/off
//! process with exponential toggle times. An edge that has carried the
//! signal is expired and stops toggling.

use std::collections::HashMap;
use std::sync::Arc;

use super::tracker::{Frontier, Reachability};
use crate::distribution::{Distribution, Exponential};
use crate::engine::{
    Component, ComponentId, EngineBuilder, Event, EventId, EventKind, SimContext, SimulationError,
};
use crate::graph::{GraphError, NeighborGraph};
use crate::process::State;

/// Per-edge toggle state.
#[derive(Debug, Clone)]
struct EdgeState {
    endpoints: (usize, usize),
    up: bool,
    expired: bool,
    toggle: Exponential,
    pending: Option<EventId>,
}

/// Tracks when each vertex first becomes reachable from `source` through
/// edges that are up.
///
/// Edges start down and flip at time zero; after that each edge waits an
/// exponential time with its own rate between flips. The source is marked
/// when burn-in ends, and reachability is recomputed whenever an edge comes
/// up.
pub struct EdgeChurnEstimator<G> {
    graph: Arc<G>,
    source: usize,
    reachability: Reachability,
    /// Start of each vertex's adjacency slots in `slot_edges`.
    slot_offsets: Vec<usize>,
    slot_edges: Vec<usize>,
    edges: Vec<EdgeState>,
    released: bool,
}

impl<G: NeighborGraph + 'static> EdgeChurnEstimator<G> {
    /// Creates an estimator where every edge toggles at `rate`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Graph` - If the graph is directed or `source` is not a vertex
    /// - `SimulationError::Distribution` - If `rate` is not finite and positive
    pub fn new(graph: Arc<G>, source: usize, rate: f64) -> Result<Self, SimulationError> {
        let index = EdgeIndex::build(&*graph, source)?;
        let rates = vec![rate; index.endpoints.len()];
        Self::assemble(graph, source, index, &rates)
    }

    /// Creates an estimator with one toggle rate per edge, in edge id order.
    ///
    /// Edge ids follow the first time an edge appears when walking vertices
    /// and their neighbors in order; see [`EdgeChurnEstimator::edge_endpoints`].
    ///
    /// # Errors
    ///
    /// - `SimulationError::Graph` - If the graph is directed or `source` is not a vertex
    /// - `SimulationError::InvalidConfiguration` - If there is not one rate per edge
    /// - `SimulationError::Distribution` - If a rate is not finite and positive
    pub fn with_rates(graph: Arc<G>, source: usize, rates: &[f64]) -> Result<Self, SimulationError> {
        let index = EdgeIndex::build(&*graph, source)?;
        if rates.len() != index.endpoints.len() {
            return Err(SimulationError::InvalidConfiguration {
                reason: format!("{} edge rates given for {} edges", rates.len(), index.endpoints.len()),
            });
        }
        Self::assemble(graph, source, index, rates)
    }

    fn assemble(graph: Arc<G>, source: usize, index: EdgeIndex, rates: &[f64]) -> Result<Self, SimulationError> {
        let edges = index
            .endpoints
            .into_iter()
            .zip(rates)
            .map(|(endpoints, &rate)| {
                Ok(EdgeState {
                    endpoints,
                    up: false,
                    expired: false,
                    toggle: Exponential::new(rate)?,
                    pending: None,
                })
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;

        Ok(Self {
            reachability: Reachability::new(graph.size()),
            graph,
            source,
            slot_offsets: index.slot_offsets,
            slot_edges: index.slot_edges,
            edges,
            released: false,
        })
    }

    /// Adds one always-up process per vertex, registers the estimator,
    /// arms every edge's first toggle at time zero and binds the engine
    /// until every vertex is reached.
    ///
    /// # Errors
    ///
    /// Never fails once the estimator is built; the `Result` matches
    /// [`super::TemporalConnectivityEstimator::install`].
    pub fn install(self, builder: &mut EngineBuilder) -> Result<ComponentId, SimulationError> {
        for _ in 0..self.graph.size() {
            builder.add_pinned(State::Up);
        }
        let edges = self.edges.len();
        let id = builder.add_component(self);
        for edge in 0..edges {
            builder.preschedule(id, 0.0, EventKind::EDGE, edge);
        }
        builder.bind(id);
        Ok(id)
    }
}

/// Maps every adjacency slot to an undirected edge id.
struct EdgeIndex {
    slot_offsets: Vec<usize>,
    slot_edges: Vec<usize>,
    endpoints: Vec<(usize, usize)>,
}

impl EdgeIndex {
    fn build<G: NeighborGraph + ?Sized>(graph: &G, source: usize) -> Result<Self, GraphError> {
        if graph.is_directed() {
            return Err(GraphError::Directed);
        }
        let size = graph.size();
        if source >= size {
            return Err(GraphError::VertexOutOfRange { vertex: source, size });
        }

        let mut ids: HashMap<(usize, usize), usize> = HashMap::new();
        let mut endpoints = Vec::new();
        let mut slot_offsets = Vec::with_capacity(size + 1);
        let mut slot_edges = Vec::new();

        slot_offsets.push(0);
        for vertex in 0..size {
            for index in 0..graph.degree(vertex) {
                let neighbor = graph.neighbor(vertex, index);
                let key = (vertex.min(neighbor), vertex.max(neighbor));
                let edge = *ids.entry(key).or_insert_with(|| {
                    endpoints.push(key);
                    endpoints.len() - 1
                });
                slot_edges.push(edge);
            }
            slot_offsets.push(slot_edges.len());
        }
        Ok(Self {
            slot_offsets,
            slot_edges,
            endpoints,
        })
    }
}

impl<G> EdgeChurnEstimator<G> {
    /// The source vertex.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Endpoints `(low, high)` of edge `edge`.
    pub fn edge_endpoints(&self, edge: usize) -> Option<(usize, usize)> {
        self.edges.get(edge).map(|state| state.endpoints)
    }

    /// Tells whether edge `edge` is currently up.
    pub fn is_edge_up(&self, edge: usize) -> bool {
        self.edges.get(edge).is_some_and(|state| state.up)
    }

    /// Tells whether edge `edge` has carried the signal and stopped toggling.
    pub fn is_edge_expired(&self, edge: usize) -> bool {
        self.edges.get(edge).is_some_and(|state| state.expired)
    }

    /// Tells whether `vertex` has been reached.
    pub fn is_reached(&self, vertex: usize) -> bool {
        self.reachability.is_reached(vertex)
    }

    /// Clock time at which `vertex` was first reached.
    pub fn reach_time(&self, vertex: usize) -> Option<f64> {
        self.reachability.reach_time(vertex)
    }

    /// Reach times of all vertices, NaN where not reached.
    pub fn reach_times(&self) -> &[f64] {
        self.reachability.reach_times()
    }

    /// Time from the source being reached to `vertex` being reached.
    pub fn end_to_end_delay(&self, vertex: usize) -> Option<f64> {
        Some(self.reach_time(vertex)? - self.reach_time(self.source)?)
    }

    /// BFS parent of `vertex`; the source is its own parent.
    pub fn reached_from(&self, vertex: usize) -> Option<usize> {
        self.reachability.reached_from(vertex)
    }

    /// Number of reached vertices.
    pub fn reached_count(&self) -> usize {
        self.reachability.reached_count()
    }

    /// True once every vertex is reached.
    pub fn is_done(&self) -> bool {
        self.reachability.is_complete()
    }
}

impl<G: NeighborGraph> EdgeChurnEstimator<G> {
    fn recompute(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        let time = ctx.clock().time();
        let mut frontier = EdgeFrontier {
            slot_offsets: &self.slot_offsets,
            slot_edges: &self.slot_edges,
            edges: &self.edges,
            traversed: Vec::new(),
        };
        self.reachability.explore(&*self.graph, &mut frontier, time)?;

        for edge in frontier.traversed {
            let state = &mut self.edges[edge];
            state.expired = true;
            if let Some(pending) = state.pending.take() {
                ctx.cancel(pending);
            }
        }

        if self.reachability.is_complete() && !self.released {
            self.released = true;
            tracing::debug!(source = self.source, time, "all vertices reached");
            ctx.unbind();
        }
        Ok(())
    }
}

struct EdgeFrontier<'a> {
    slot_offsets: &'a [usize],
    slot_edges: &'a [usize],
    edges: &'a [EdgeState],
    traversed: Vec<usize>,
}

impl EdgeFrontier<'_> {
    fn edge(&self, from: usize, index: usize) -> usize {
        self.slot_edges[self.slot_offsets[from] + index]
    }
}

impl Frontier for EdgeFrontier<'_> {
    fn is_up(&self, _vertex: usize) -> bool {
        true
    }

    fn can_flow(&self, from: usize, index: usize) -> bool {
        self.edges[self.edge(from, index)].up
    }

    fn traversed(&mut self, from: usize, index: usize, _to: usize) {
        let edge = self.edge(from, index);
        self.traversed.push(edge);
    }
}

impl<G: NeighborGraph + 'static> Component for EdgeChurnEstimator<G> {
    fn name(&self) -> &str {
        "edge-connectivity"
    }

    fn on_event(&mut self, ctx: &mut SimContext<'_>, event: &Event) -> Result<(), SimulationError> {
        let edge = event.token;
        let Some(state) = self.edges.get_mut(edge) else {
            return Ok(());
        };
        if state.expired {
            return Ok(());
        }

        state.up = !state.up;
        let next = event.time + state.toggle.sample(ctx.rng());
        state.pending = Some(ctx.schedule_with_token(next, EventKind::EDGE, edge)?);

        // Edges going down cannot extend reachability.
        if !state.up || ctx.clock().is_burning_in() || !self.reachability.is_reached(self.source) {
            return Ok(());
        }
        self.recompute(ctx)
    }

    fn on_burnin_end(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimulationError> {
        let time = ctx.clock().time();
        self.reachability.mark(self.source, self.source, time);
        tracing::trace!(source = self.source, time, "source reached");
        self.recompute(ctx)
    }

    fn is_done(&self) -> bool {
        self.reachability.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::RunOutcome;
    use crate::graph::StaticGraph;

    type Estimator = EdgeChurnEstimator<StaticGraph>;

    fn build(graph: StaticGraph, burnin: f64, rate: f64) -> (crate::engine::Engine, ComponentId) {
        let config = EngineConfig {
            burnin,
            horizon: Some(10_000.0),
            ..EngineConfig::with_seed(11)
        };
        let mut builder = EngineBuilder::new(config).unwrap();
        let id = Estimator::new(Arc::new(graph), 0, rate)
            .unwrap()
            .install(&mut builder)
            .unwrap();
        (builder.build().unwrap(), id)
    }

    #[test]
    fn test_edge_ids_cover_each_undirected_edge_once() {
        let graph = StaticGraph::undirected(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
        let estimator = Estimator::new(Arc::new(graph), 0, 1.0).unwrap();

        assert_eq!(estimator.edge_count(), 4);
        assert_eq!(estimator.edge_endpoints(0), Some((0, 1)));
        assert_eq!(estimator.edge_endpoints(1), Some((0, 3)));
        assert!(!estimator.is_edge_up(0));
    }

    #[test]
    fn test_directed_graph_is_rejected() {
        let graph = StaticGraph::directed(2, &[(0, 1)]).unwrap();
        assert!(matches!(
            Estimator::new(Arc::new(graph), 0, 1.0),
            Err(SimulationError::Graph(GraphError::Directed))
        ));
    }

    #[test]
    fn test_rate_count_must_match_edges() {
        let graph = Arc::new(StaticGraph::ring(4).unwrap());
        assert!(matches!(
            Estimator::with_rates(graph.clone(), 0, &[1.0, 1.0]),
            Err(SimulationError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            Estimator::with_rates(graph, 0, &[1.0, 1.0, -1.0, 1.0]),
            Err(SimulationError::Distribution(_))
        ));
    }

    #[test]
    fn test_edges_flip_up_at_time_zero_without_burnin() {
        let graph = StaticGraph::undirected(3, &[(0, 1), (1, 2)]).unwrap();
        let (mut engine, id) = build(graph, 0.0, 1.0);

        let report = engine.run().unwrap();
        assert_eq!(report.outcome, RunOutcome::Unbound);

        let estimator = engine.component::<Estimator>(id).unwrap();
        assert_eq!(estimator.reach_times(), &[0.0, 0.0, 0.0]);
        assert!(estimator.is_edge_expired(0));
        assert!(estimator.is_edge_expired(1));
        assert_eq!(engine.pending_events(), 0);
        assert!(engine.network().processes().iter().all(|process| process.is_up()));
    }

    #[test]
    fn test_lone_source_is_reached_at_end_of_burnin() {
        let graph = StaticGraph::undirected(1, &[]).unwrap();
        let (mut engine, id) = build(graph, 3.0, 1.0);

        let report = engine.run().unwrap();
        assert_eq!(report.outcome, RunOutcome::Unbound);
        assert_eq!(report.raw_time, 3.0);

        let estimator = engine.component::<Estimator>(id).unwrap();
        assert!(estimator.is_done());
        assert_eq!(estimator.reach_time(0), Some(0.0));
    }

    #[test]
    fn test_reach_times_follow_causal_order_after_burnin() {
        let graph = StaticGraph::ring(8).unwrap();
        let (mut engine, id) = build(graph, 5.0, 0.5);

        assert_eq!(engine.run().unwrap().outcome, RunOutcome::Unbound);
        let estimator = engine.component::<Estimator>(id).unwrap();

        assert!(estimator.is_done());
        assert_eq!(estimator.reach_time(0), Some(0.0));
        for vertex in 1..8 {
            let parent = estimator.reached_from(vertex).unwrap();
            assert!(estimator.reach_time(parent).unwrap() <= estimator.reach_time(vertex).unwrap());
        }
    }

    #[test]
    fn test_same_seed_same_reach_times() {
        let run = || {
            let (mut engine, id) = build(StaticGraph::complete(6).unwrap(), 2.0, 1.0);
            engine.run().unwrap();
            let times = engine.component::<Estimator>(id).unwrap().reach_times().to_vec();
            (times, engine.history().to_vec())
        };
        let (first, first_history) = run();
        let (second, second_history) = run();

        assert_eq!(first_history, second_history);
        assert_eq!(
            first.iter().map(|t| t.to_bits()).collect::<Vec<_>>(),
            second.iter().map(|t| t.to_bits()).collect::<Vec<_>>()
        );
    }
}
