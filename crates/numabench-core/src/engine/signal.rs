//! # Stop Conditions
//!
//! The engine polls its stop condition once per chunk. [`RunSignal`] is the
//! process-wide flag raised by the runner; [`ChunkLimit`] stops after a fixed
//! number of chunks and makes runs deterministic for tests and benches.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Polled by the engine before every chunk.
pub trait StopCondition {
    /// Returns true once the engine must stop.
    fn should_stop(&self) -> bool;
}

/// One-shot stop flag shared by all workers.
///
/// Written once (running → stopped) and read with relaxed ordering; workers
/// tolerate seeing the transition up to one chunk late.
#[derive(Debug, Default)]
pub struct RunSignal {
    stopped: AtomicBool,
}

impl RunSignal {
    /// Creates a signal in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every worker to stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Returns true while the run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Relaxed)
    }
}

impl StopCondition for RunSignal {
    #[inline(always)]
    fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// Stops after a fixed number of chunks.
#[derive(Debug)]
pub struct ChunkLimit {
    remaining: Cell<u64>,
}

impl ChunkLimit {
    /// Allows exactly `chunks` chunks.
    #[must_use]
    pub fn new(chunks: u64) -> Self {
        Self {
            remaining: Cell::new(chunks),
        }
    }

    /// Chunks still allowed.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining.get()
    }
}

impl StopCondition for ChunkLimit {
    #[inline]
    fn should_stop(&self) -> bool {
        match self.remaining.get() {
            0 => true,
            n => {
                self.remaining.set(n - 1);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_run_signal_one_shot() {
        let signal = RunSignal::new();
        assert!(signal.is_running());
        assert!(!signal.should_stop());

        signal.stop();
        assert!(!signal.is_running());
        assert!(signal.should_stop());
    }

    #[test]
    fn test_run_signal_visible_across_threads() {
        let signal = Arc::new(RunSignal::new());
        let worker = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let mut polls = 0u64;
                while !signal.should_stop() {
                    polls += 1;
                    std::hint::spin_loop();
                }
                polls
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(10));
        signal.stop();
        worker.join().unwrap();
    }

    #[test]
    fn test_chunk_limit() {
        let limit = ChunkLimit::new(2);
        assert!(!limit.should_stop());
        assert!(!limit.should_stop());
        assert!(limit.should_stop());
        assert!(limit.should_stop());
        assert_eq!(limit.remaining(), 0);
    }
}
