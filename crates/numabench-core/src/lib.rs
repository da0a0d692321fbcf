//! # `numabench` Core
//!
//! Memory throughput benchmark for NUMA machines, comparing DRAM against
//! byte-addressable persistent memory (NVRAM) and near against far placement.
//!
//! This crate provides:
//! - **Region allocation**: node-local DRAM via `mmap` + `mbind`, or NVRAM
//!   mapped from DAX devices with `MAP_SYNC`
//! - **Access engine**: chunked sequential/random traversal with a fixed
//!   load/store mix and plain, flushing, or non-temporal operations
//! - **Runner**: one pinned worker thread per configured CPU, stopped by a
//!   single shared flag after a fixed duration
//!
//! ## Design Principles
//!
//! 1. **No shared state in the measurement window** - each worker owns its
//!    region and generator, the stop flag is the only shared word
//! 2. **Reproducible** - every worker seed comes from a fixed master sequence
//! 3. **Resolved once** - width, pattern and mode are monomorphized before
//!    the hot loop starts
//! 4. **Fail fast** - any setup failure aborts the whole run
//!
//! ## Example
//!
//! ```rust,ignore
//! use numabench_core::{BenchConfig, BenchmarkRunner};
//!
//! let config = BenchConfig::builder()
//!     .mem_per_thread_gib(2)
//!     .access_size(8)
//!     .chunk_size(64)
//!     .build()?;
//!
//! let report = BenchmarkRunner::new(config).run()?;
//! report.write_csv(std::io::stdout().lock())?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod numa;
pub mod region;
pub mod rng;
pub mod runner;

// Re-export key types
pub use config::{BenchConfig, BenchConfigBuilder, FileConfig};
pub use engine::{AccessEngine, ChunkLimit, EngineReport, RunSignal, StopCondition};
pub use region::{Region, RegionAllocator};
pub use runner::{BenchmarkRunner, RunReport, WorkerReport};

/// Result type for numabench-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for numabench-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Region allocation errors
    #[error("Region error: {0}")]
    Region(#[from] region::RegionError),

    /// Access engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    /// Runner errors
    #[error("Runner error: {0}")]
    Runner(#[from] runner::RunnerError),
}
