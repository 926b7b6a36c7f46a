//! tilepaint - inspect and exercise the tiled paint engine
//!
//! Lists color spaces, runs the reference paint scenario and times
//! composite throughput.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "tilepaint")]
#[command(author, version, about = "Tiled paint-device engine driver")]
#[command(long_about = "
Drives the tiled paint-device engine from the command line.

Examples:
  tilepaint spaces                      # List color spaces and their ops
  tilepaint spaces rgba-u16 --ops       # One space, with composite ops
  tilepaint scenario                    # Fill, composite, thumbnail, LOD
  tilepaint bench --space rgba-u8 --op over --size 1024
  tilepaint --config engine.yaml -j 8 bench --parallel
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// List color spaces, channels and composite ops
    #[command(visible_alias = "ls")]
    Spaces(SpacesArgs),

    /// Run the reference paint scenario and print results
    Scenario(ScenarioArgs),

    /// Time composite throughput
    Bench(BenchArgs),
}

#[derive(Args)]
struct SpacesArgs {
    /// Only this color space
    id: Option<String>,

    /// Show composite ops
    #[arg(long)]
    ops: bool,
}

#[derive(Args)]
struct ScenarioArgs {
    /// Color space of the devices (defaults to the configured one)
    #[arg(short, long)]
    space: Option<String>,

    /// Composite op used for the second device
    #[arg(long, default_value = "over")]
    op: String,

    /// Opacity of the composite
    #[arg(long, default_value = "0.5")]
    opacity: f32,
}

#[derive(Args)]
struct BenchArgs {
    /// Color space
    #[arg(short, long, default_value = "rgba-u8")]
    space: String,

    /// Composite op
    #[arg(long, default_value = "over")]
    op: String,

    /// Edge length of the square region in pixels
    #[arg(long, default_value = "1024")]
    size: u32,

    /// Repetitions
    #[arg(short = 'n', long, default_value = "5")]
    iterations: u32,

    /// Use the tile-parallel path
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let engine = commands::load_engine(cli.config.as_deref(), cli.threads)?;

    match cli.command {
        Commands::Spaces(args) => commands::spaces::run(args, &engine, cli.verbose),
        Commands::Scenario(args) => commands::scenario::run(args, &engine, cli.verbose),
        Commands::Bench(args) => commands::bench::run(args, &engine),
    }
}
