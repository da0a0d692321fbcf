//! # Worker Handle
//!
//! Owns one pinned measurement thread.
//!
//! The thread:
//! 1. Pins itself to its CPU with `sched_setaffinity`
//! 2. Signals that it is ready
//! 3. Runs the access engine on its region until the run signal stops it
//! 4. Hands the region back through the join handle so the runner can
//!    release it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::WorkerSlot;
use crate::engine::{AccessEngine, EngineReport, RunSignal};
use crate::region::Region;

use super::RunnerError;

/// What a worker thread returns when it exits.
pub(crate) struct WorkerExit {
    /// The worker's region, still mapped
    pub region: Region,
    /// Engine outcome
    pub result: Result<EngineReport, RunnerError>,
}

/// Everything the worker thread needs.
struct WorkerContext {
    slot: WorkerSlot,
    seed: u32,
    engine: AccessEngine,
    signal: Arc<RunSignal>,
    ready: Arc<AtomicBool>,
}

/// Handle to a running worker thread.
pub(crate) struct WorkerHandle {
    slot: WorkerSlot,
    signal: Arc<RunSignal>,
    thread: Option<JoinHandle<WorkerExit>>,
}

impl WorkerHandle {
    /// Spawns a worker and waits until it is pinned.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned or pinned. The region
    /// is unmapped in both cases.
    pub fn spawn(
        slot: WorkerSlot,
        seed: u32,
        engine: AccessEngine,
        region: Region,
        signal: &Arc<RunSignal>,
    ) -> Result<Self, RunnerError> {
        let ready = Arc::new(AtomicBool::new(false));
        let context = WorkerContext {
            slot,
            seed,
            engine,
            signal: Arc::clone(signal),
            ready: Arc::clone(&ready),
        };

        let thread = thread::Builder::new()
            .name(format!("numabench-worker-{}", slot.thread_index))
            .spawn(move || worker_main(&context, region))
            .map_err(|e| RunnerError::SpawnFailed {
                thread_index: slot.thread_index,
                message: e.to_string(),
            })?;

        // Wait for the thread to pin itself, or to give up trying
        while !ready.load(Ordering::Acquire) && !thread.is_finished() {
            thread::yield_now();
        }

        let mut handle = Self {
            slot,
            signal: Arc::clone(signal),
            thread: Some(thread),
        };

        if !ready.load(Ordering::Acquire) {
            let exit = handle.join()?;
            return Err(exit.result.err().unwrap_or(RunnerError::WorkerPanicked {
                thread_index: slot.thread_index,
            }));
        }

        Ok(handle)
    }

    /// The worker's placement.
    pub fn slot(&self) -> WorkerSlot {
        self.slot
    }

    /// Waits for the worker thread to exit.
    ///
    /// Does not stop the worker; raise the run signal first.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::WorkerPanicked`] if the thread panicked. Its
    /// region was unmapped during unwinding.
    pub fn join(&mut self) -> Result<WorkerExit, RunnerError> {
        let thread_index = self.slot.thread_index;
        self.thread
            .take()
            .ok_or(RunnerError::WorkerPanicked { thread_index })?
            .join()
            .map_err(|_| RunnerError::WorkerPanicked { thread_index })
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.signal.stop();
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("slot", &self.slot)
            .field("joined", &self.thread.is_none())
            .finish_non_exhaustive()
    }
}

fn worker_main(ctx: &WorkerContext, mut region: Region) -> WorkerExit {
    if let Err(e) = set_cpu_affinity(ctx.slot.cpu) {
        return WorkerExit {
            region,
            result: Err(e),
        };
    }
    ctx.ready.store(true, Ordering::Release);

    tracing::debug!(
        "Worker {} pinned to CPU {}, seed {:#x}",
        ctx.slot.thread_index,
        ctx.slot.cpu,
        ctx.seed
    );

    let result = ctx
        .engine
        .run(region.as_mut_slice(), ctx.seed, &*ctx.signal)
        .map_err(RunnerError::from);

    WorkerExit { region, result }
}

/// Pins the calling thread to `cpu_id`.
fn set_cpu_affinity(cpu_id: usize) -> Result<(), RunnerError> {
    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
        use std::mem;

        let max_cpus = mem::size_of::<cpu_set_t>() * 8;
        if cpu_id >= max_cpus {
            return Err(RunnerError::AffinityFailed {
                cpu: cpu_id,
                message: format!("CPU id exceeds cpu_set_t capacity ({max_cpus})"),
            });
        }

        // SAFETY: the set is zero-initialized and cleared with CPU_ZERO;
        // pid 0 is the calling thread
        unsafe {
            let mut set: cpu_set_t = mem::zeroed();
            CPU_ZERO(&mut set);
            CPU_SET(cpu_id, &mut set);

            let result = sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &raw const set);
            if result != 0 {
                return Err(RunnerError::AffinityFailed {
                    cpu: cpu_id,
                    message: format!(
                        "sched_setaffinity failed: {}",
                        std::io::Error::last_os_error()
                    ),
                });
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("CPU pinning unsupported on this platform, CPU {cpu_id} not enforced");
    }

    Ok(())
}
