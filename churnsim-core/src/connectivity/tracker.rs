//! Incremental single-source reachability shared by the estimators.

use super::bfs_queue::BfsQueue;
use crate::engine::SimulationError;
use crate::graph::NeighborGraph;

/// Which vertices and adjacency slots currently carry the signal.
pub(crate) trait Frontier {
    /// Tells whether `vertex` can be reached and relay right now.
    fn is_up(&self, vertex: usize) -> bool;

    /// Tells whether the `index`-th adjacency slot of `from` is usable.
    fn can_flow(&self, _from: usize, _index: usize) -> bool {
        true
    }

    /// Called after `to` was reached through the `index`-th slot of `from`.
    fn traversed(&mut self, _from: usize, _index: usize, _to: usize) {}
}

/// First-reach times over a fixed vertex set.
///
/// A reach time is written once and never changes. A reached vertex is
/// frontier-done once all its neighbors are reached; until then it is
/// re-explored whenever connectivity may have grown.
#[derive(Debug, Clone)]
pub struct Reachability {
    reached: Vec<f64>,
    reached_from: Vec<Option<usize>>,
    frontier_done: Vec<bool>,
    reached_count: usize,
    queue: BfsQueue,
}

impl Reachability {
    /// Creates a tracker with nothing reached.
    pub fn new(size: usize) -> Self {
        Self {
            reached: vec![f64::NAN; size],
            reached_from: vec![None; size],
            frontier_done: vec![false; size],
            reached_count: 0,
            queue: BfsQueue::new(size),
        }
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.reached.len()
    }

    /// Tells whether `vertex` has been reached. Unknown vertices are not.
    pub fn is_reached(&self, vertex: usize) -> bool {
        self.reached.get(vertex).is_some_and(|time| !time.is_nan())
    }

    /// Time `vertex` was first reached.
    pub fn reach_time(&self, vertex: usize) -> Option<f64> {
        self.reached.get(vertex).copied().filter(|time| !time.is_nan())
    }

    /// All reach times, NaN for vertices not reached yet.
    pub fn reach_times(&self) -> &[f64] {
        &self.reached
    }

    /// Vertex through which `vertex` was reached; the source is its own
    /// parent.
    pub fn reached_from(&self, vertex: usize) -> Option<usize> {
        self.reached_from.get(vertex).copied().flatten()
    }

    /// Tells whether every neighbor of `vertex` has been reached.
    pub fn is_frontier_done(&self, vertex: usize) -> bool {
        self.frontier_done.get(vertex).copied().unwrap_or(false)
    }

    /// Number of reached vertices.
    pub fn reached_count(&self) -> usize {
        self.reached_count
    }

    /// True once every vertex is reached.
    pub fn is_complete(&self) -> bool {
        self.reached_count == self.reached.len()
    }

    /// Records the first reach of `node` through `parent`. Later calls for
    /// the same node are ignored.
    pub(crate) fn mark(&mut self, parent: usize, node: usize, time: f64) {
        if self.is_reached(node) {
            return;
        }
        self.reached[node] = time;
        self.reached_from[node] = Some(parent);
        self.reached_count += 1;
    }

    /// Floods from every reached, up vertex whose frontier is still open.
    pub(crate) fn explore<G, F>(&mut self, graph: &G, frontier: &mut F, time: f64) -> Result<(), SimulationError>
    where
        G: NeighborGraph + ?Sized,
        F: Frontier,
    {
        for start in 0..self.size() {
            if self.frontier_done[start] || !self.is_reached(start) || !frontier.is_up(start) {
                continue;
            }

            self.queue.add_last(start)?;
            while let Some(current) = self.queue.peek_first() {
                let mut done = true;
                for index in 0..graph.degree(current) {
                    let neighbor = graph.neighbor(current, index);
                    if !self.is_reached(neighbor)
                        && frontier.is_up(neighbor)
                        && frontier.can_flow(current, index)
                    {
                        self.mark(current, neighbor, time);
                        frontier.traversed(current, index, neighbor);
                        self.queue.add_last(neighbor)?;
                    }
                    done &= self.is_reached(neighbor);
                }
                self.frontier_done[current] = done;
                self.queue.remove_first();
            }
        }
        Ok(())
    }
}
