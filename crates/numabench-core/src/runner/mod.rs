//! # Benchmark Runner
//!
//! Coordinates one timed run: one pinned worker per configured CPU, all
//! stopped by a single shared [`RunSignal`].
//!
//! ## Lifecycle
//!
//! ```text
//!  for each worker (domain by domain):
//!      seed ← master sequence
//!      region ← acquire(index within domain, cpu)
//!      spawn thread → pin → ready → engine.run(region, seed, signal)
//!  sleep(duration)
//!  signal.stop()
//!  join every worker → report; release every region
//! ```
//!
//! Any setup failure stops the workers already started, joins them and
//! releases their regions before the error is returned.

mod worker;

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{BenchConfig, OperationMode, WorkerSlot};
use crate::engine::{has_cache_control, AccessEngine, EngineError, RunSignal};
use crate::numa::NumaTopology;
use crate::region::{RegionAllocator, RegionError};
use crate::rng::SeedSequence;

use worker::WorkerHandle;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker {thread_index}: {message}")]
    SpawnFailed {
        /// Global thread index
        thread_index: usize,
        /// Error message
        message: String,
    },

    /// Failed to pin a worker thread
    #[error("Failed to pin worker to CPU {cpu}: {message}")]
    AffinityFailed {
        /// Target CPU
        cpu: usize,
        /// Error message
        message: String,
    },

    /// A worker thread panicked
    #[error("Worker {thread_index} panicked")]
    WorkerPanicked {
        /// Global thread index
        thread_index: usize,
    },

    /// Acquiring a worker's region failed
    #[error("Worker {thread_index} on CPU {cpu}: {source}")]
    RegionFailed {
        /// Global thread index
        thread_index: usize,
        /// Worker CPU
        cpu: usize,
        /// The allocation or mapping error
        #[source]
        source: RegionError,
    },

    /// The engine rejected a region
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Global thread index
    pub thread_index: usize,
    /// CPU the worker ran on
    pub cpu_id: usize,
    /// Elements accessed
    pub work_count: u64,
    /// Bytes loaded or stored
    pub bytes_accessed: u64,
}

/// Result of one run, workers in thread order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Per-worker results
    pub workers: Vec<WorkerReport>,
    /// Measured time between starting the wait and raising the stop signal
    pub elapsed: Duration,
}

impl RunReport {
    /// Total bytes accessed by all workers.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.workers.iter().map(|w| w.bytes_accessed).sum()
    }

    /// Aggregate throughput in GiB/s.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput_gib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / (1u64 << 30) as f64 / secs
    }

    /// Writes `thread_id;cpu_id;bytes_accessed` rows, header first.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "thread_id;cpu_id;bytes_accessed")?;
        for worker in &self.workers {
            writeln!(
                out,
                "{};{};{}",
                worker.thread_index, worker.cpu_id, worker.bytes_accessed
            )?;
        }
        out.flush()
    }

    /// Logs the aggregate result.
    pub fn log_summary(&self) {
        tracing::info!(
            "{} workers accessed {} bytes in {:.3}s ({:.2} GiB/s)",
            self.workers.len(),
            self.total_bytes(),
            self.elapsed.as_secs_f64(),
            self.throughput_gib_s()
        );
    }
}

/// Runs a configured benchmark.
#[derive(Debug)]
pub struct BenchmarkRunner {
    config: BenchConfig,
    host: NumaTopology,
}

impl BenchmarkRunner {
    /// Creates a runner on the detected host topology.
    #[must_use]
    pub fn new(config: BenchConfig) -> Self {
        Self::with_host(config, NumaTopology::detect())
    }

    /// Creates a runner on an explicit host topology.
    #[must_use]
    pub fn with_host(config: BenchConfig, host: NumaTopology) -> Self {
        Self { config, host }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Runs the benchmark for the configured duration.
    ///
    /// # Errors
    ///
    /// Returns the first region, spawn, pinning or worker error. No partial
    /// report is produced.
    pub fn run(&self) -> Result<RunReport, RunnerError> {
        let config = &self.config;
        self.log_start();

        let allocator = RegionAllocator::with_host(config, &self.host);
        let engine = AccessEngine::from_config(config);
        let signal = Arc::new(RunSignal::new());
        let mut seeds = SeedSequence::new(config.master_seed);
        let mut workers = Vec::with_capacity(config.topology.num_workers());

        for slot in config.topology.workers() {
            let seed = seeds.next_seed();
            match Self::start_worker(&allocator, slot, seed, engine, &signal) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    tracing::error!("Aborting run: {e}");
                    signal.stop();
                    let _ = Self::collect(&allocator, workers);
                    return Err(e);
                }
            }
        }

        tracing::info!("{} workers running for {:?}", workers.len(), config.duration);
        let started = Instant::now();
        thread::sleep(config.duration);
        signal.stop();
        let elapsed = started.elapsed();

        let workers = Self::collect(&allocator, workers)?;
        Ok(RunReport { workers, elapsed })
    }

    fn start_worker(
        allocator: &RegionAllocator,
        slot: WorkerSlot,
        seed: u32,
        engine: AccessEngine,
        signal: &Arc<RunSignal>,
    ) -> Result<WorkerHandle, RunnerError> {
        let region = allocator
            .acquire(slot.domain_index, slot.cpu)
            .map_err(|source| RunnerError::RegionFailed {
                thread_index: slot.thread_index,
                cpu: slot.cpu,
                source,
            })?;
        WorkerHandle::spawn(slot, seed, engine, region, signal)
    }

    /// Joins every worker and releases every region, returning the first
    /// error if any worker failed.
    fn collect(
        allocator: &RegionAllocator,
        workers: Vec<WorkerHandle>,
    ) -> Result<Vec<WorkerReport>, RunnerError> {
        let mut reports = Vec::with_capacity(workers.len());
        let mut first_error = None;

        for mut handle in workers {
            let slot = handle.slot();
            let outcome = handle.join().and_then(|exit| {
                allocator.release(exit.region);
                exit.result
            });

            match outcome {
                Ok(report) => reports.push(WorkerReport {
                    thread_index: slot.thread_index,
                    cpu_id: slot.cpu,
                    work_count: report.work_count,
                    bytes_accessed: report.bytes_touched(),
                }),
                Err(e) => {
                    tracing::error!("Worker {} failed: {e}", slot.thread_index);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    fn log_start(&self) {
        let config = &self.config;
        self.host.log_topology();

        for slot in config.topology.workers() {
            if let Some(node) = self.host.node_for_cpu(slot.cpu) {
                if node != slot.domain {
                    tracing::warn!(
                        "CPU {} is configured in domain {} but belongs to host node {}",
                        slot.cpu,
                        slot.domain,
                        node
                    );
                }
            }
        }

        if config.mode != OperationMode::Normal && !has_cache_control() {
            tracing::warn!(
                "Mode {} has no cache-control instructions on this target, plain accesses are used",
                config.mode
            );
        }

        tracing::info!(
            "Starting {} {} {} run: access {} bytes, chunk {} bytes, region {} bytes ({} chunks), loads {} / stores {}",
            config.memory_type,
            config.pattern,
            config.mode,
            config.access_size,
            config.chunk_size,
            config.region_size,
            config.chunks_per_region(),
            config.mix.loads,
            config.mix.stores
        );
    }
}
