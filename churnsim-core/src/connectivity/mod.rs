//! Temporal connectivity estimators.
//!
//! Both estimators keep single-source reachability up to date as the
//! topology churns, re-exploring only from reached vertices whose
//! neighborhood is not fully reached yet.

mod bfs_queue;
mod edge;
mod tracker;
mod vertex;

pub use bfs_queue::BfsQueue;
pub use edge::EdgeChurnEstimator;
pub use tracker::Reachability;
pub use vertex::TemporalConnectivityEstimator;
