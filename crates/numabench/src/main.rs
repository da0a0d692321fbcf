//! numabench command-line runner

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use numabench_core::config::{AccessPattern, MemoryType, NumaDistance, OperationMode};
use numabench_core::{BenchConfig, BenchmarkRunner, FileConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// numabench - DRAM vs. NVRAM memory throughput on NUMA machines
///
/// Per-worker results are written to stdout as `thread_id;cpu_id;bytes_accessed`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Backing memory: dram or nvram
    #[arg(long)]
    mem_type: Option<MemoryType>,

    /// Region placement: near or far
    #[arg(long)]
    distance: Option<NumaDistance>,

    /// Chunk order: sequential or random
    #[arg(long)]
    pattern: Option<AccessPattern>,

    /// Operation mode: normal, clflush or nontemporal
    #[arg(long)]
    mode: Option<OperationMode>,

    /// Bytes per load/store (1, 2, 4, 8 or 16)
    #[arg(long)]
    access_size: Option<usize>,

    /// Chunk size in bytes (power of two)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Region size per worker in GiB
    #[arg(long)]
    mem_per_thread: Option<usize>,

    /// Measurement duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Loads per load/store period
    #[arg(long)]
    loads: Option<u32>,

    /// Stores per load/store period
    #[arg(long)]
    stores: Option<u32>,

    /// Master seed of the per-worker seed sequence
    #[arg(long, value_parser = parse_seed)]
    seed: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_seed(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn build_config(args: &Args) -> Result<BenchConfig> {
    let mut builder = BenchConfig::builder();

    if let Some(path) = &args.config {
        let file = FileConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        builder = builder.apply_file(file);
    }

    if let Some(memory_type) = args.mem_type {
        builder = builder.memory_type(memory_type);
    }
    if let Some(distance) = args.distance {
        builder = builder.distance(distance);
    }
    if let Some(pattern) = args.pattern {
        builder = builder.pattern(pattern);
    }
    if let Some(mode) = args.mode {
        builder = builder.mode(mode);
    }
    if let Some(bytes) = args.access_size {
        builder = builder.access_size(bytes);
    }
    if let Some(bytes) = args.chunk_size {
        builder = builder.chunk_size(bytes);
    }
    if let Some(gib) = args.mem_per_thread {
        builder = builder.mem_per_thread_gib(gib);
    }
    if let Some(secs) = args.duration {
        let duration = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid duration {secs}"))?;
        builder = builder.duration(duration);
    }
    if let Some(loads) = args.loads {
        builder = builder.loads(loads);
    }
    if let Some(stores) = args.stores {
        builder = builder.stores(stores);
    }
    if let Some(seed) = args.seed {
        builder = builder.master_seed(seed);
    }

    builder.build().context("invalid configuration")
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries only results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("numabench={0},numabench_core={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("numabench {}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;

    if args.print_config {
        print!("{config}");
        return Ok(());
    }

    let report = BenchmarkRunner::new(config).run()?;
    report
        .write_csv(std::io::stdout().lock())
        .context("writing results")?;
    report.log_summary();

    Ok(())
}
