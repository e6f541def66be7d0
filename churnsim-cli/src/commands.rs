//! CLI command implementations

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use churnsim_core::config::ExperimentConfig;
use churnsim_core::experiment::{
    AvailabilityExperiment, EdgeConnectivityExperiment, TemporalConnectivityExperiment,
};
use churnsim_core::graph::StaticGraph;
use churnsim_core::process::presets::ChurnPreset;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;

/// Graph families the CLI can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Topology {
    /// Cycle over all vertices
    Ring,
    /// Every pair of vertices linked
    Complete,
    /// Erdős–Rényi graph, see `--edge-probability`
    Random,
}

/// Graph and batch options shared by the connectivity commands.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Number of vertices
    #[arg(short, long, default_value = "100")]
    nodes: usize,

    /// Graph family
    #[arg(long, value_enum, default_value_t = Topology::Random)]
    topology: Topology,

    /// Link probability for random graphs
    #[arg(long, default_value = "0.05")]
    edge_probability: f64,

    /// Independent runs per source
    #[arg(short, long, default_value = "1")]
    repetitions: usize,

    /// Number of sources, taken in vertex order
    #[arg(short, long, default_value = "1")]
    sources: usize,

    /// Warm-up time before measurements start
    #[arg(long, default_value = "0")]
    burnin: f64,

    /// Measured time after burn-in
    #[arg(long, default_value = "1000")]
    horizon: f64,

    /// Engines running at once (defaults to the CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Base seed for graph generation and every run
    #[arg(long, default_value = "42")]
    seed: u64,
}

impl BatchArgs {
    fn graph(&self) -> anyhow::Result<StaticGraph> {
        let graph = match self.topology {
            Topology::Ring => StaticGraph::ring(self.nodes)?,
            Topology::Complete => StaticGraph::complete(self.nodes)?,
            Topology::Random => StaticGraph::erdos_renyi(self.nodes, self.edge_probability, self.seed)?,
        };
        Ok(graph)
    }

    fn config(&self) -> ExperimentConfig {
        let defaults = ExperimentConfig::default();
        ExperimentConfig {
            seed: self.seed,
            repetitions: self.repetitions,
            sources: self.sources,
            burnin: self.burnin,
            workers: self.workers.unwrap_or(defaults.workers),
            horizon: self.horizon,
            ..defaults
        }
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Temporal connectivity under vertex churn
    Connectivity {
        #[command(flatten)]
        batch: BatchArgs,

        /// Churn model for every vertex
        #[arg(short, long, value_enum, default_value_t = ChurnPreset::Exponential)]
        preset: ChurnPreset,
    },
    /// Temporal connectivity under edge churn
    EdgeConnectivity {
        #[command(flatten)]
        batch: BatchArgs,

        /// Toggle rate of every edge
        #[arg(long, default_value = "1.0")]
        rate: f64,
    },
    /// Empirical against predicted availability of renewal processes
    Availability {
        /// Number of processes
        #[arg(short, long, default_value = "100")]
        nodes: usize,

        /// Churn model for every process
        #[arg(short, long, value_enum, default_value_t = ChurnPreset::Exponential)]
        preset: ChurnPreset,

        /// Independent runs
        #[arg(short, long, default_value = "1")]
        repetitions: usize,

        /// Simulated time per run
        #[arg(long, default_value = "1000")]
        horizon: f64,

        /// Engines running at once (defaults to the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Base seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Handle the CLI command
///
/// # Errors
/// - Graph generation or configuration rejected
/// - Any run of the batch failing
/// - Writing results to stdout failing
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Connectivity { batch, preset } => run_connectivity(batch, preset).await,
        Commands::EdgeConnectivity { batch, rate } => run_edge_connectivity(batch, rate).await,
        Commands::Availability {
            nodes,
            preset,
            repetitions,
            horizon,
            workers,
            seed,
        } => {
            let defaults = ExperimentConfig::default();
            let config = ExperimentConfig {
                seed,
                repetitions,
                preset,
                horizon,
                workers: workers.unwrap_or(defaults.workers),
                ..defaults
            };
            run_availability(nodes, config).await
        }
    }
}

async fn run_connectivity(batch: BatchArgs, preset: ChurnPreset) -> anyhow::Result<()> {
    let graph = Arc::new(batch.graph()?);
    let config = ExperimentConfig {
        preset,
        ..batch.config()
    };
    let experiment = TemporalConnectivityExperiment::new(graph, config)?;

    let samples = experiment.run().await.context("temporal connectivity batch failed")?;
    let incomplete = samples.iter().filter(|sample| !sample.complete).count();
    if incomplete > 0 {
        tracing::warn!(incomplete, total = samples.len(), "some runs hit the horizon");
    }
    print_records(&samples)
}

async fn run_edge_connectivity(batch: BatchArgs, rate: f64) -> anyhow::Result<()> {
    let graph = Arc::new(batch.graph()?);
    let config = ExperimentConfig {
        edge_rate: rate,
        ..batch.config()
    };
    let experiment = EdgeConnectivityExperiment::new(graph, config)?;

    let samples = experiment.run().await.context("edge connectivity batch failed")?;
    print_records(&samples)
}

async fn run_availability(nodes: usize, config: ExperimentConfig) -> anyhow::Result<()> {
    let experiment = AvailabilityExperiment::new(nodes, config)?;

    let samples = experiment.run().await.context("availability batch failed")?;
    for sample in &samples {
        tracing::info!(
            repetition = sample.repetition,
            mean_error = sample.mean_error(),
            "availability run finished"
        );
    }
    print_records(&samples)
}

/// Writes one JSON object per line.
fn print_records<T: Serialize>(records: &[T]) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
