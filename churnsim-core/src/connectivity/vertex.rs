//! Temporal connectivity over churning vertices.

use std::sync::Arc;

use super::tracker::{Frontier, Reachability};
use crate::engine::{Component, ComponentId, EngineBuilder, Event, EventKind, SimContext, SimulationError};
use crate::graph::{GraphError, NeighborGraph};
use crate::process::Network;

/// Tracks when each vertex first becomes reachable from `source` through
/// vertices that are up at the same time.
///
/// Installed as an observer of process transitions. Reachability only grows
/// when a process comes up, so down transitions are ignored. The estimator
/// holds a binding on the engine and releases it once every vertex is
/// reached.
pub struct TemporalConnectivityEstimator<G> {
    graph: Arc<G>,
    source: usize,
    cloud: Vec<bool>,
    reachability: Reachability,
    uptime_snapshot: Vec<f64>,
    uptime_reached: Vec<f64>,
    released: bool,
}

impl<G: NeighborGraph + 'static> TemporalConnectivityEstimator<G> {
    /// Creates an estimator for `source` over `graph`.
    ///
    /// # Errors
    ///
    /// - `GraphError::VertexOutOfRange` - If `source` is not a vertex
    pub fn new(graph: Arc<G>, source: usize) -> Result<Self, GraphError> {
        Self::with_cloud_nodes(graph, source, &[])
    }

    /// Creates an estimator where the `cloud` vertices count as always up.
    ///
    /// # Errors
    ///
    /// - `GraphError::VertexOutOfRange` - If `source` or a cloud vertex is not a vertex
    pub fn with_cloud_nodes(graph: Arc<G>, source: usize, cloud: &[usize]) -> Result<Self, GraphError> {
        let size = graph.size();
        if source >= size {
            return Err(GraphError::VertexOutOfRange { vertex: source, size });
        }

        let mut is_cloud = vec![false; size];
        for &vertex in cloud {
            *is_cloud
                .get_mut(vertex)
                .ok_or(GraphError::VertexOutOfRange { vertex, size })? = true;
        }

        Ok(Self {
            graph,
            source,
            cloud: is_cloud,
            reachability: Reachability::new(size),
            uptime_snapshot: vec![0.0; size],
            uptime_reached: vec![f64::NAN; size],
            released: false,
        })
    }

    /// Registers the estimator with `builder`, observing process
    /// transitions and binding the engine until every vertex is reached.
    ///
    /// Vertex `v` is process `v`, so all processes must be added first.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Graph` - If the graph size differs from the number of processes
    pub fn install(self, builder: &mut EngineBuilder) -> Result<ComponentId, SimulationError> {
        let network = builder.process_count();
        if self.graph.size() != network {
            return Err(GraphError::SizeMismatch {
                graph: self.graph.size(),
                network,
            }
            .into());
        }

        let id = builder.add_component(self);
        builder.observe(id, EventKind::PROCESS).bind(id);
        Ok(id)
    }
}

impl<G> TemporalConnectivityEstimator<G> {
    /// The source vertex.
    pub fn source(&self) -> usize {
        self.source
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

    /// Uptime `vertex` accumulated between the source being reached and
    /// `vertex` being reached.
    pub fn perceived_delay(&self, vertex: usize) -> Option<f64> {
        if !self.is_reached(vertex) {
            return None;
        }
        Some(self.uptime_reached[vertex] - self.uptime_snapshot[vertex])
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

struct VertexFrontier<'a> {
    network: &'a Network,
    cloud: &'a [bool],
    uptime_reached: &'a mut [f64],
    now: f64,
}

impl Frontier for VertexFrontier<'_> {
    fn is_up(&self, vertex: usize) -> bool {
        self.cloud[vertex] || self.network.is_up(vertex)
    }

    fn traversed(&mut self, _from: usize, _index: usize, to: usize) {
        self.uptime_reached[to] = uptime(self.network, to, self.now);
    }
}

fn uptime(network: &Network, vertex: usize, now: f64) -> f64 {
    network.process(vertex).map_or(0.0, |process| process.uptime(now))
}

impl<G: NeighborGraph + 'static> Component for TemporalConnectivityEstimator<G> {
    fn name(&self) -> &str {
        "temporal-connectivity"
    }

    fn observe(&mut self, ctx: &mut SimContext<'_>, event: &Event, _next: Option<f64>) -> Result<(), SimulationError> {
        let Some(process) = event.process() else {
            return Ok(());
        };
        if !ctx.network().is_up(process) {
            return Ok(());
        }

        let now = ctx.clock().raw_time();
        let time = ctx.clock().time();

        if !self.reachability.is_reached(self.source) {
            if process != self.source {
                return Ok(());
            }
            for (vertex, snapshot) in self.uptime_snapshot.iter_mut().enumerate() {
                *snapshot = uptime(ctx.network(), vertex, now);
            }
            self.reachability.mark(self.source, self.source, time);
            self.uptime_reached[self.source] = uptime(ctx.network(), self.source, now);
            tracing::trace!(source = self.source, time, "source reached");
        }

        let mut frontier = VertexFrontier {
            network: ctx.network(),
            cloud: &self.cloud,
            uptime_reached: &mut self.uptime_reached,
            now,
        };
        self.reachability.explore(&*self.graph, &mut frontier, time)?;

        if self.reachability.is_complete() && !self.released {
            self.released = true;
            tracing::debug!(source = self.source, time, "all vertices reached");
            ctx.unbind();
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.reachability.is_complete()
    }
}
