//! Immutable neighbor graphs.
//!
//! The estimators only read a graph through [`NeighborGraph`]; a graph is
//! shared between concurrent runs behind an `Arc` and never mutated after
//! construction.

use thiserror::Error;

use crate::engine::DeterministicRng;

/// Errors raised while building or checking a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Edge endpoint or source outside `0..size`
    #[error("Vertex {vertex} out of range for graph of size {size}")]
    VertexOutOfRange {
        /// Offending vertex
        vertex: usize,
        /// Number of vertices
        size: usize,
    },

    /// Edge from a vertex to itself
    #[error("Self loop on vertex {vertex}")]
    SelfLoop {
        /// Offending vertex
        vertex: usize,
    },

    /// Directed graph where an undirected one is required
    #[error("Graph must be undirected")]
    Directed,

    /// Edge probability outside `[0, 1]`
    #[error("Invalid edge probability {value}")]
    InvalidProbability {
        /// Rejected value
        value: f64,
    },

    /// Graph size does not match the number of processes
    #[error("Graph has {graph} vertices but the network has {network} processes")]
    SizeMismatch {
        /// Vertices in the graph
        graph: usize,
        /// Processes in the network
        network: usize,
    },
}

/// Read-only adjacency view.
pub trait NeighborGraph: Send + Sync {
    /// Number of vertices.
    fn size(&self) -> usize;

    /// Out-degree of `vertex`.
    fn degree(&self, vertex: usize) -> usize;

    /// The `index`-th neighbor of `vertex`, `index < degree(vertex)`.
    fn neighbor(&self, vertex: usize, index: usize) -> usize;

    /// Tells whether `to` is a neighbor of `from`.
    fn is_edge(&self, from: usize, to: usize) -> bool {
        (0..self.degree(from)).any(|i| self.neighbor(from, i) == to)
    }

    /// Tells whether edges are one-way.
    fn is_directed(&self) -> bool;
}

/// Compressed adjacency lists with sorted, deduplicated neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGraph {
    offsets: Vec<usize>,
    targets: Vec<usize>,
    directed: bool,
}

impl StaticGraph {
    /// Builds an undirected graph; every edge is stored both ways.
    ///
    /// # Errors
    ///
    /// - `GraphError::VertexOutOfRange` - If an endpoint is not below `size`
    /// - `GraphError::SelfLoop` - If an edge joins a vertex to itself
    pub fn undirected(size: usize, edges: &[(usize, usize)]) -> Result<Self, GraphError> {
        let both_ways: Vec<(usize, usize)> = edges.iter().flat_map(|&(u, v)| [(u, v), (v, u)]).collect();
        Self::build(size, &both_ways, false)
    }

    /// Builds a directed graph.
    ///
    /// # Errors
    ///
    /// - `GraphError::VertexOutOfRange` - If an endpoint is not below `size`
    /// - `GraphError::SelfLoop` - If an edge joins a vertex to itself
    pub fn directed(size: usize, edges: &[(usize, usize)]) -> Result<Self, GraphError> {
        Self::build(size, edges, true)
    }

    /// Cycle over `size` vertices.
    ///
    /// # Errors
    ///
    /// Never fails; rings of one or two vertices collapse to a path.
    pub fn ring(size: usize) -> Result<Self, GraphError> {
        let edges: Vec<(usize, usize)> = (0..size)
            .map(|i| (i, (i + 1) % size))
            .filter(|(u, v)| u != v)
            .collect();
        Self::undirected(size, &edges)
    }

    /// Clique over `size` vertices.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` mirrors the other constructors.
    pub fn complete(size: usize) -> Result<Self, GraphError> {
        let edges: Vec<(usize, usize)> = (0..size)
            .flat_map(|u| (u + 1..size).map(move |v| (u, v)))
            .collect();
        Self::undirected(size, &edges)
    }

    /// G(n, p) random graph drawn from `seed`.
    ///
    /// # Errors
    ///
    /// - `GraphError::InvalidProbability` - If `p` is outside `[0, 1]`
    pub fn erdos_renyi(size: usize, p: f64, seed: u64) -> Result<Self, GraphError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(GraphError::InvalidProbability { value: p });
        }
        let mut rng = DeterministicRng::from_seed(seed);
        let mut edges = Vec::new();
        for u in 0..size {
            for v in u + 1..size {
                if rng.random_bool(p) {
                    edges.push((u, v));
                }
            }
        }
        Self::undirected(size, &edges)
    }

    /// Neighbors of `vertex`, sorted.
    pub fn neighbors(&self, vertex: usize) -> &[usize] {
        &self.targets[self.offsets[vertex]..self.offsets[vertex + 1]]
    }

    /// Position of `vertex`'s adjacency list in the flat target array.
    pub fn offset(&self, vertex: usize) -> usize {
        self.offsets[vertex]
    }

    /// Number of stored (directed) adjacency entries.
    pub fn entries(&self) -> usize {
        self.targets.len()
    }

    fn build(size: usize, edges: &[(usize, usize)], directed: bool) -> Result<Self, GraphError> {
        let mut lists = vec![Vec::new(); size];
        for &(u, v) in edges {
            for vertex in [u, v] {
                if vertex >= size {
                    return Err(GraphError::VertexOutOfRange { vertex, size });
                }
            }
            if u == v {
                return Err(GraphError::SelfLoop { vertex: u });
            }
            lists[u].push(v);
        }

        let mut offsets = Vec::with_capacity(size + 1);
        let mut targets = Vec::with_capacity(edges.len());
        offsets.push(0);
        for mut list in lists {
            list.sort_unstable();
            list.dedup();
            targets.extend(list);
            offsets.push(targets.len());
        }

        Ok(Self {
            offsets,
            targets,
            directed,
        })
    }
}

impl NeighborGraph for StaticGraph {
    fn size(&self) -> usize {
        self.offsets.len() - 1
    }

    fn degree(&self, vertex: usize) -> usize {
        self.offsets[vertex + 1] - self.offsets[vertex]
    }

    fn neighbor(&self, vertex: usize, index: usize) -> usize {
        self.targets[self.offsets[vertex] + index]
    }

    fn is_edge(&self, from: usize, to: usize) -> bool {
        from < self.size() && self.neighbors(from).binary_search(&to).is_ok()
    }

    fn is_directed(&self) -> bool {
        self.directed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undirected_stores_both_directions() {
        let graph = StaticGraph::undirected(3, &[(0, 1), (1, 2), (1, 0)]).unwrap();

        assert_eq!(graph.size(), 3);
        assert_eq!(graph.neighbors(1), &[0, 2]);
        assert_eq!(graph.degree(0), 1);
        assert!(graph.is_edge(2, 1));
        assert!(!graph.is_edge(0, 2));
        assert!(!graph.is_directed());
    }

    #[test]
    fn test_directed_keeps_orientation() {
        let graph = StaticGraph::directed(2, &[(0, 1)]).unwrap();
        assert!(graph.is_edge(0, 1));
        assert!(!graph.is_edge(1, 0));
        assert!(graph.is_directed());
    }

    #[test]
    fn test_invalid_edges_are_rejected() {
        assert_eq!(
            StaticGraph::undirected(2, &[(0, 2)]).unwrap_err(),
            GraphError::VertexOutOfRange { vertex: 2, size: 2 }
        );
        assert_eq!(
            StaticGraph::undirected(2, &[(1, 1)]).unwrap_err(),
            GraphError::SelfLoop { vertex: 1 }
        );
    }

    #[test]
    fn test_generators() {
        let ring = StaticGraph::ring(5).unwrap();
        assert!((0..5).all(|v| ring.degree(v) == 2));
        assert!(ring.is_edge(4, 0));

        let complete = StaticGraph::complete(4).unwrap();
        assert!((0..4).all(|v| complete.degree(v) == 3));
        assert_eq!(complete.entries(), 12);

        let empty = StaticGraph::erdos_renyi(6, 0.0, 1).unwrap();
        assert_eq!(empty.entries(), 0);
        assert_eq!(
            StaticGraph::erdos_renyi(6, 0.4, 9).unwrap(),
            StaticGraph::erdos_renyi(6, 0.4, 9).unwrap()
        );
        assert!(StaticGraph::erdos_renyi(6, 1.5, 9).is_err());
    }

    #[test]
    fn test_trait_default_is_edge_matches_lookup() {
        struct Star;
        impl NeighborGraph for Star {
            fn size(&self) -> usize {
                3
            }
            fn degree(&self, vertex: usize) -> usize {
                if vertex == 0 { 2 } else { 1 }
            }
            fn neighbor(&self, vertex: usize, index: usize) -> usize {
                if vertex == 0 { index + 1 } else { 0 }
            }
            fn is_directed(&self) -> bool {
                false
            }
        }

        assert!(Star.is_edge(0, 2));
        assert!(!Star.is_edge(1, 2));
    }
}
