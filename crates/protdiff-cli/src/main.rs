//! protdiff CLI
//!
//! Inspect diffusion noise schedules and score sampled structures with TMalign.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protdiff_samplers::{BetaScheduleKind, DerivedCoefficients, ScheduleConfig};
use protdiff_tmalign::{default_threads, TmAlign};

#[derive(Parser)]
#[command(name = "protdiff")]
#[command(about = "Protein structure diffusion utilities")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a beta schedule, its derived coefficients and posterior variance as JSON
    Schedule {
        /// JSON schedule config (overrides the flags below)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Schedule shape
        #[arg(long, value_enum, default_value = "cosine")]
        kind: ScheduleKind,

        /// Number of diffusion timesteps
        #[arg(short, long, default_value = "250")]
        timesteps: usize,

        /// First beta (linear, quadratic, sigmoid)
        #[arg(long, default_value = "0.0001")]
        beta_start: f64,

        /// Last beta (linear, quadratic, sigmoid)
        #[arg(long, default_value = "0.02")]
        beta_end: f64,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// TM-score of a query structure, normalized by the reference length
    Tmalign {
        query: PathBuf,
        reference: PathBuf,

        /// Pass -fast to TMalign
        #[arg(long)]
        fast: bool,
    },

    /// Highest TM-score of a query across many references
    MaxTm {
        query: PathBuf,

        #[arg(required = true)]
        references: Vec<PathBuf>,

        /// Worker count (default: available parallelism)
        #[arg(long)]
        threads: Option<usize>,

        /// Run full (slower) alignments instead of -fast
        #[arg(long)]
        no_fast: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScheduleKind {
    /// Evenly spaced betas
    Linear,
    /// Cosine schedule on the cumulative alpha product
    Cosine,
    /// Evenly spaced sqrt(beta)
    Quadratic,
    /// Sigmoid ramp between beta-start and beta-end
    Sigmoid,
}

impl From<ScheduleKind> for BetaScheduleKind {
    fn from(kind: ScheduleKind) -> Self {
        match kind {
            ScheduleKind::Linear => BetaScheduleKind::Linear,
            ScheduleKind::Cosine => BetaScheduleKind::Cosine,
            ScheduleKind::Quadratic => BetaScheduleKind::Quadratic,
            ScheduleKind::Sigmoid => BetaScheduleKind::Sigmoid,
        }
    }
}

#[derive(Serialize)]
struct ScheduleReport {
    config: ScheduleConfig,
    #[serde(flatten)]
    coefficients: DerivedCoefficients,
    posterior_variance: Vec<f32>,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_schedule(config: ScheduleConfig, pretty: bool) -> Result<()> {
    let schedule = config
        .build()
        .with_context(|| format!("Invalid schedule config: {config:?}"))?;
    tracing::info!(kind = ?config.kind, timesteps = schedule.len(), "built beta schedule");

    let report = ScheduleReport {
        coefficients: schedule.coefficients(),
        posterior_variance: schedule.posterior_variance(),
        config,
    };
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

fn run_max_tm(
    query: PathBuf,
    references: Vec<PathBuf>,
    threads: Option<usize>,
    fast: bool,
) -> Result<()> {
    let tm = TmAlign::locate()?;
    let threads = threads.unwrap_or_else(default_threads);

    let pb = ProgressBar::new(references.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("aligning");

    let best = tm
        .max_score_with(&query, &references, threads, fast, |reference, score| {
            tracing::debug!(reference = %reference.display(), score, "aligned");
            pb.inc(1);
        })
        .with_context(|| format!("Failed to score {}", query.display()))?;
    pb.finish_and_clear();

    println!("{best}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Schedule {
            config,
            kind,
            timesteps,
            beta_start,
            beta_end,
            pretty,
        } => {
            let config = match config {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse {}", path.display()))?
                }
                None => ScheduleConfig {
                    kind: kind.into(),
                    timesteps,
                    beta_start,
                    beta_end,
                    ..Default::default()
                },
            };
            run_schedule(config, pretty)
        }

        Commands::Tmalign {
            query,
            reference,
            fast,
        } => {
            let score = TmAlign::locate()?
                .score(&query, &reference, fast)
                .with_context(|| {
                    format!("Failed to align {} to {}", query.display(), reference.display())
                })?;
            println!("{score}");
            Ok(())
        }

        Commands::MaxTm {
            query,
            references,
            threads,
            no_fast,
        } => run_max_tm(query, references, threads, !no_fast),
    }
}
