//! Batch experiments: many independent engines run concurrently.
//!
//! Every task builds its own engine from a derived seed and owns all of its
//! mutable state. Only the graph and the per-node parameters are shared,
//! immutably, behind `Arc`s.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::ExperimentConfig;
use crate::connectivity::{EdgeChurnEstimator, TemporalConnectivityEstimator};
use crate::distribution::DistributionError;
use crate::engine::{
    DeterministicRng, EngineBuilder, LiveCountConsistency, RenewalConservation, RunOutcome,
    SimulationError,
};
use crate::graph::{GraphError, NeighborGraph};
use crate::process::presets::{yao_averages, NodeParameters};

/// Errors raised while setting up or running a batch.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// A run aborted or could not be built
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Graph rejected before any task started
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Per-node parameters could not be turned into churn models
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    /// Worker panicked or was cancelled
    #[error("Task {task} failed: {reason}")]
    TaskFailed {
        /// Index of the task in the batch
        task: usize,
        /// What the runtime reported
        reason: String,
    },
}

/// Runs `tasks` on the blocking pool, at most `workers` at a time.
///
/// Results come back in task order whatever order the tasks finish in.
///
/// # Errors
///
/// - `ExperimentError::TaskFailed` - If a task panicked or was cancelled
/// - Any error returned by a task; the first one in task order is reported
pub async fn run_batch<T, F>(tasks: Vec<F>, workers: usize) -> Result<Vec<T>, ExperimentError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ExperimentError> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());

    for (index, task) in tasks.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExperimentError::TaskFailed {
                    task: index,
                    reason: e.to_string(),
                })?;
            tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| ExperimentError::TaskFailed {
                    task: index,
                    reason: e.to_string(),
                })?
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let result = handle.await.map_err(|e| ExperimentError::TaskFailed {
            task: index,
            reason: e.to_string(),
        })??;
        results.push(result);
    }
    Ok(results)
}

/// Seed for task `index` of a batch started from `base`.
pub fn derive_seed(base: u64, index: u64) -> u64 {
    let mut z = base ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Reach times of one `(source, repetition)` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivitySample {
    /// Source vertex
    pub source: usize,
    /// Repetition index
    pub repetition: usize,
    /// Delay from the source to each vertex; `None` if never reached
    pub reach_times: Vec<Option<f64>>,
    /// Clock reading, after burn-in, when the run ended
    pub end_time: f64,
    /// Whether every vertex was reached before the horizon
    pub complete: bool,
}

impl ConnectivitySample {
    fn new(source: usize, repetition: usize, delays: Vec<Option<f64>>, end_time: f64, outcome: RunOutcome) -> Self {
        Self {
            source,
            repetition,
            reach_times: delays,
            end_time,
            complete: outcome == RunOutcome::Unbound,
        }
    }
}

/// Temporal connectivity under Yao churn, one run per source and repetition.
pub struct TemporalConnectivityExperiment<G> {
    graph: Arc<G>,
    nodes: Arc<Vec<NodeParameters>>,
    config: ExperimentConfig,
}

impl<G: NeighborGraph + 'static> TemporalConnectivityExperiment<G> {
    /// Draws per-node parameters from `config.seed` and prepares the batch.
    ///
    /// # Errors
    ///
    /// - `ExperimentError::Simulation` - If the configuration is rejected
    /// - `ExperimentError::Graph` - If there are more sources than vertices
    pub fn new(graph: Arc<G>, config: ExperimentConfig) -> Result<Self, ExperimentError> {
        let mut rng = DeterministicRng::from_seed(config.seed);
        let nodes = yao_averages(graph.size(), &mut rng)?;
        Self::with_parameters(graph, Arc::new(nodes), config)
    }

    /// Prepares the batch with explicit per-node parameters.
    ///
    /// # Errors
    ///
    /// - `ExperimentError::Simulation` - If the configuration is rejected
    /// - `ExperimentError::Graph` - If there are more sources than vertices or
    ///   the parameters do not match the graph
    pub fn with_parameters(
        graph: Arc<G>,
        nodes: Arc<Vec<NodeParameters>>,
        config: ExperimentConfig,
    ) -> Result<Self, ExperimentError> {
        config.validate()?;
        check_sources(graph.size(), config.sources)?;
        if nodes.len() != graph.size() {
            return Err(GraphError::SizeMismatch {
                graph: graph.size(),
                network: nodes.len(),
            }
            .into());
        }
        Ok(Self { graph, nodes, config })
    }

    /// Per-node parameters shared by every run.
    pub fn nodes(&self) -> &[NodeParameters] {
        &self.nodes
    }

    /// Runs every task and returns samples ordered by repetition, then source.
    ///
    /// # Errors
    ///
    /// - Any error raised by a run; see [`run_batch`]
    pub async fn run(&self) -> Result<Vec<ConnectivitySample>, ExperimentError> {
        let tasks = task_grid(&self.config)
            .map(|(index, repetition, source)| {
                let graph = Arc::clone(&self.graph);
                let nodes = Arc::clone(&self.nodes);
                let config = self.config.clone();
                move || run_vertex_task(graph, &nodes, &config, index, repetition, source)
            })
            .collect::<Vec<_>>();

        tracing::info!(
            vertices = self.graph.size(),
            preset = %self.config.preset,
            repetitions = self.config.repetitions,
            sources = self.config.sources,
            "starting temporal connectivity batch"
        );
        run_batch(tasks, self.config.workers).await
    }
}

fn run_vertex_task<G: NeighborGraph + 'static>(
    graph: Arc<G>,
    nodes: &[NodeParameters],
    config: &ExperimentConfig,
    index: usize,
    repetition: usize,
    source: usize,
) -> Result<ConnectivitySample, ExperimentError> {
    let mut builder = EngineBuilder::new(config.engine_config(derive_seed(config.seed, index as u64)))?;
    for node in nodes {
        builder.add_process(config.preset.churn(node)?);
    }
    let id = TemporalConnectivityEstimator::new(graph, source)?.install(&mut builder)?;

    let mut engine = builder.build()?;
    let report = engine.run()?;
    let estimator = engine
        .component::<TemporalConnectivityEstimator<G>>(id)
        .ok_or(SimulationError::ComponentTypeMismatch { component: id.0 })?;

    let delays = (0..nodes.len()).map(|v| estimator.end_to_end_delay(v)).collect();
    tracing::debug!(source, repetition, reached = estimator.reached_count(), "connectivity task finished");
    Ok(ConnectivitySample::new(source, repetition, delays, report.time, report.outcome))
}

/// Temporal connectivity over churning edges; vertices never go down.
pub struct EdgeConnectivityExperiment<G> {
    graph: Arc<G>,
    config: ExperimentConfig,
}

impl<G: NeighborGraph + 'static> EdgeConnectivityExperiment<G> {
    /// Prepares the batch; every edge toggles at `config.edge_rate`.
    ///
    /// # Errors
    ///
    /// - `ExperimentError::Simulation` - If the configuration is rejected
    /// - `ExperimentError::Graph` - If the graph is directed or there are more
    ///   sources than vertices
    pub fn new(graph: Arc<G>, config: ExperimentConfig) -> Result<Self, ExperimentError> {
        config.validate()?;
        if graph.is_directed() {
            return Err(GraphError::Directed.into());
        }
        check_sources(graph.size(), config.sources)?;
        Ok(Self { graph, config })
    }

    /// Runs every task and returns samples ordered by repetition, then source.
    ///
    /// # Errors
    ///
    /// - Any error raised by a run; see [`run_batch`]
    pub async fn run(&self) -> Result<Vec<ConnectivitySample>, ExperimentError> {
        let tasks = task_grid(&self.config)
            .map(|(index, repetition, source)| {
                let graph = Arc::clone(&self.graph);
                let config = self.config.clone();
                move || run_edge_task(graph, &config, index, repetition, source)
            })
            .collect::<Vec<_>>();

        tracing::info!(
            vertices = self.graph.size(),
            rate = self.config.edge_rate,
            repetitions = self.config.repetitions,
            sources = self.config.sources,
            "starting edge connectivity batch"
        );
        run_batch(tasks, self.config.workers).await
    }
}

fn run_edge_task<G: NeighborGraph + 'static>(
    graph: Arc<G>,
    config: &ExperimentConfig,
    index: usize,
    repetition: usize,
    source: usize,
) -> Result<ConnectivitySample, ExperimentError> {
    let size = graph.size();
    let mut builder = EngineBuilder::new(config.engine_config(derive_seed(config.seed, index as u64)))?;
    let id = EdgeChurnEstimator::new(graph, source, config.edge_rate)?.install(&mut builder)?;

    let mut engine = builder.build()?;
    let report = engine.run()?;
    let estimator = engine
        .component::<EdgeChurnEstimator<G>>(id)
        .ok_or(SimulationError::ComponentTypeMismatch { component: id.0 })?;

    let delays = (0..size).map(|v| estimator.end_to_end_delay(v)).collect();
    Ok(ConnectivitySample::new(source, repetition, delays, report.time, report.outcome))
}

/// Availability of one node over one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeAvailability {
    /// Process id
    pub node: usize,
    /// Mean uptime parameter
    pub li: f64,
    /// Mean downtime parameter
    pub di: f64,
    /// Fraction of the run spent up
    pub empirical: f64,
    /// Long-run fraction predicted by the churn model
    pub asymptotic: f64,
}

/// Per-node availability of one repetition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySample {
    /// Repetition index
    pub repetition: usize,
    /// One entry per node
    pub nodes: Vec<NodeAvailability>,
}

impl AvailabilitySample {
    /// Mean absolute gap between empirical and asymptotic availability,
    /// ignoring nodes whose asymptotic value is unknown.
    pub fn mean_error(&self) -> f64 {
        let gaps: Vec<f64> = self
            .nodes
            .iter()
            .filter(|node| node.asymptotic.is_finite())
            .map(|node| (node.empirical - node.asymptotic).abs())
            .collect();
        if gaps.is_empty() {
            return f64::NAN;
        }
        gaps.iter().sum::<f64>() / gaps.len() as f64
    }
}

/// Renewal processes run to the horizon, compared with their predicted
/// availability.
pub struct AvailabilityExperiment {
    nodes: Arc<Vec<NodeParameters>>,
    config: ExperimentConfig,
}

impl AvailabilityExperiment {
    /// Draws `nodes` per-node parameters from `config.seed`.
    ///
    /// # Errors
    ///
    /// - `ExperimentError::Simulation` - If the configuration is rejected
    pub fn new(nodes: usize, config: ExperimentConfig) -> Result<Self, ExperimentError> {
        config.validate()?;
        let mut rng = DeterministicRng::from_seed(config.seed);
        let nodes = yao_averages(nodes, &mut rng)?;
        Ok(Self {
            nodes: Arc::new(nodes),
            config,
        })
    }

    /// Runs one task per repetition.
    ///
    /// # Errors
    ///
    /// - Any error raised by a run, including renewal invariant violations
    pub async fn run(&self) -> Result<Vec<AvailabilitySample>, ExperimentError> {
        let tasks = (0..self.config.repetitions)
            .map(|repetition| {
                let nodes = Arc::clone(&self.nodes);
                let config = self.config.clone();
                move || run_availability_task(&nodes, &config, repetition)
            })
            .collect::<Vec<_>>();

        tracing::info!(
            nodes = self.nodes.len(),
            preset = %self.config.preset,
            horizon = self.config.horizon,
            "starting availability batch"
        );
        run_batch(tasks, self.config.workers).await
    }
}

fn run_availability_task(
    nodes: &[NodeParameters],
    config: &ExperimentConfig,
    repetition: usize,
) -> Result<AvailabilitySample, ExperimentError> {
    let mut builder = EngineBuilder::new(config.engine_config(derive_seed(config.seed, repetition as u64)))?;
    for node in nodes {
        builder.add_process(config.preset.churn(node)?);
    }
    builder
        .add_invariant(RenewalConservation)
        .add_invariant(LiveCountConsistency);

    let mut engine = builder.build()?;
    let report = engine.run()?;
    let now = report.raw_time;

    let nodes = engine
        .network()
        .processes()
        .iter()
        .zip(nodes)
        .map(|(process, params)| NodeAvailability {
            node: process.id(),
            li: params.li,
            di: params.di,
            empirical: process.empirical_availability(now),
            asymptotic: process.asymptotic_availability(),
        })
        .collect();
    Ok(AvailabilitySample { repetition, nodes })
}

fn check_sources(size: usize, sources: usize) -> Result<(), GraphError> {
    if sources > size {
        return Err(GraphError::VertexOutOfRange { vertex: sources - 1, size });
    }
    Ok(())
}

/// `(task index, repetition, source)` for every task, repetition-major.
fn task_grid(config: &ExperimentConfig) -> impl Iterator<Item = (usize, usize, usize)> + use<> {
    let sources = config.sources;
    (0..config.repetitions)
        .flat_map(move |repetition| (0..sources).map(move |source| (repetition, source)))
        .enumerate()
        .map(|(index, (repetition, source))| (index, repetition, source))
}
