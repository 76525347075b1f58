//! Demo binary: reads (or synthesizes) a point cloud, builds a histogram,
//! coarsens it, and prints density/tail-probability summaries.
//!
//! This binary is the only place in the crate that does file I/O,
//! installs a `tracing-subscriber`, or depends on `clap` — the library
//! itself never does any of the three (§10.4).

use std::fs::File;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use density_tree::external::{bbox, label, mde};
use density_tree::{
    backtrack_full_trajectory, backtrack_num_steps, CountVolumePriority, Histogram, SplitRule,
    TailProbabilities,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("reading input: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("parsing a CSV field as a float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error(transparent)]
    Tree(#[from] density_tree::TreeError),
    #[error("no points to estimate a density from")]
    NoPoints,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SplitRuleArg {
    Cycle,
    Widest,
}

impl From<SplitRuleArg> for SplitRule {
    fn from(value: SplitRuleArg) -> Self {
        match value {
            SplitRuleArg::Cycle => SplitRule::Cycle,
            SplitRuleArg::Widest => SplitRule::Widest,
        }
    }
}

/// Builds and coarsens an adaptive-histogram density estimate.
#[derive(Parser, Debug)]
#[command(name = "density-tree", about)]
struct Args {
    /// CSV file of sample points, one row per point, no header. When
    /// omitted a synthetic bimodal Gaussian-mixture fixture is generated
    /// instead.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Dimension of the synthetic fixture (ignored when --input is given).
    #[arg(long, default_value_t = 2)]
    dim: usize,

    /// Number of points to synthesize (ignored when --input is given).
    #[arg(long, default_value_t = 20_000)]
    num_points: usize,

    /// RNG seed for the synthetic fixture.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Splitting rule used to build the spatial tree.
    #[arg(long, value_enum, default_value = "widest")]
    split_rule: SplitRuleArg,

    /// Stop descent once a cell's widest side falls below this length.
    #[arg(long, default_value_t = 0.05)]
    finest_res_side_length: f64,

    /// Relative padding applied to the estimated bounding box.
    #[arg(long, default_value_t = 0.01)]
    bbox_padding: f64,

    /// Coarsen to exactly this many leaves instead of running full MDE
    /// selection.
    #[arg(long)]
    target_leaves: Option<u64>,

    /// Fraction of points held out for MDE validation when
    /// `--target-leaves` is not given.
    #[arg(long, default_value_t = 0.2)]
    validation_fraction: f64,

    /// Stride through the backtrack trajectory when running MDE selection
    /// (the `kInMDE` runtime parameter, §6).
    #[arg(long, default_value_t = 1)]
    k_in_mde: usize,
}

fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

fn read_csv_points(path: &PathBuf) -> Result<Vec<Vec<f64>>, CliError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(file);
    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let point = record
            .iter()
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()?;
        points.push(point);
    }
    Ok(points)
}

/// A two-component Gaussian mixture in `dim` dimensions, one mode near the
/// origin and one near `(4, 4, ..., 4)`, generated via Box-Muller (rand 0.7
/// has no built-in normal distribution without pulling in `rand_distr`).
fn synthetic_bimodal(dim: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let center = if i % 2 == 0 { 0.0 } else { 4.0 };
            (0..dim)
                .map(|_| {
                    let u1: f64 = rng.gen_range(1e-12, 1.0);
                    let u2: f64 = rng.gen_range(0.0, 1.0);
                    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                    center + z * 0.6
                })
                .collect()
        })
        .collect()
}

fn run() -> Result<(), CliError> {
    let args = Args::parse();

    let points = match &args.input {
        Some(path) => {
            tracing::info!(?path, "reading points from CSV");
            read_csv_points(path)?
        }
        None => {
            tracing::info!(dim = args.dim, n = args.num_points, "generating synthetic bimodal fixture");
            synthetic_bimodal(args.dim, args.num_points, args.seed)
        }
    };
    if points.is_empty() {
        return Err(CliError::NoPoints);
    }

    let n_holdout = ((points.len() as f64) * args.validation_fraction.clamp(0.0, 0.9)) as usize;
    let (validation_points, training_points) = points.split_at(n_holdout);

    let (low, high) = bbox::estimate(training_points, args.bbox_padding)?;
    let dim = low.len();
    tracing::info!(?low, ?high, dim, "estimated bounding box");

    let tree = density_tree::SpatialTree::new(low, high, args.split_rule.into())?;

    let counts = label::label_points(&tree, args.finest_res_side_length, training_points)?;
    let total_count: u64 = counts.values().iter().sum();
    let labels = counts.truncation().leaves().to_vec();
    let count_values = counts.values().to_vec();
    let histogram = Histogram::new(tree.clone(), total_count, labels, count_values)?;
    tracing::info!(leaves = histogram.counts().len(), total_count, "built fine histogram");

    let selected = match args.target_leaves {
        Some(target) if target >= 1 && (target as usize) < histogram.counts().len() => {
            let steps = histogram.counts().truncation().minimal_completion().len() as u64 - target;
            backtrack_num_steps(&histogram, CountVolumePriority::new(total_count), steps.max(1))
        }
        Some(_) => histogram.clone(),
        None => {
            let trajectory = backtrack_full_trajectory(&histogram, CountVolumePriority::new(total_count));
            let validation_counts = label::label_points(&tree, args.finest_res_side_length, validation_points)?;
            mde::select(&trajectory, &validation_counts, args.k_in_mde).clone()
        }
    };
    tracing::info!(leaves = selected.counts().len(), "selected histogram");

    let density = selected.normalize();
    let tails = TailProbabilities::from_density(&density);

    println!("selected histogram: {} leaves, {} total points", selected.counts().len(), total_count);
    // `tails` was built from `density` via `TailProbabilities::from_density`,
    // so the two leaf maps share the same truncation and iteration order.
    for ((label, &(d, v)), &tail_value) in density.density_map().iter().zip(tails.tails().values().iter()) {
        println!("  leaf {label}: density={d:.6} volume={v:.6} cumulative_tail={tail_value:.6}");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    run().map_err(|err| {
        tracing::error!(%err, "density-tree failed");
        anyhow::Error::from(err)
    })
}
