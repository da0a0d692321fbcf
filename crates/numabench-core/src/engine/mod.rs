//! # Access Engine
//!
//! Walks one worker's region until told to stop and counts every element it
//! touched.
//!
//! ## Traversal
//!
//! ```text
//!  region ┌──────────┬──────────┬──────────┬──────────┐
//!         │ chunk 0  │ chunk 1  │   ...    │ chunk N-1│   N = region / chunk
//!         └──────────┴──────────┴──────────┴──────────┘
//!  chunk  ┌──┬──┬──┬──┬──┬──┬──┬──┐
//!         │L │L │S │L │L │S │L │L │   elements of ACCESS_SIZE bytes,
//!         └──┴──┴──┴──┴──┴──┴──┴──┘   address order, loads:stores = 2:1
//! ```
//!
//! Sequential runs visit chunks in address order and restart after `N`
//! chunks; random runs draw every chunk offset from the worker's generator.
//! The stop condition is polled once per chunk, so a run may overshoot the
//! stop signal by at most one chunk.
//!
//! ## Dispatch
//!
//! Width, pattern and mode are resolved once in [`AccessEngine::run`] into a
//! monomorphized loop; only the load/store choice is evaluated per element.

mod element;
mod mode;
mod schedule;
mod signal;
mod traversal;

pub use element::Element;
pub use mode::{has_cache_control, AccessMode, Flush, NonTemporal, Plain};
pub use schedule::{OpMix, Operation};
pub use signal::{ChunkLimit, RunSignal, StopCondition};
pub use traversal::{ChunkGeometry, Random, Sequential, Traversal};

use crate::config::{AccessPattern, AccessSize, BenchConfig, OperationMode};
use crate::rng::Drand48;

/// Errors detected before the access loop starts.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Region and chunk sizes do not fit together
    #[error("Region of {region_size} bytes is not a non-zero multiple of chunk size {chunk_size}")]
    RegionSize {
        /// Region size in bytes
        region_size: usize,
        /// Chunk size in bytes
        chunk_size: usize,
    },

    /// Chunk size is not a power of two or smaller than one element
    #[error("Chunk size {chunk_size} is invalid for access size {access_size}")]
    ChunkSize {
        /// Chunk size in bytes
        chunk_size: usize,
        /// Element width in bytes
        access_size: usize,
    },

    /// Region start is not aligned to the element width
    #[error("Region at {address:#x} is not aligned to {access_size} bytes")]
    Misaligned {
        /// Region start address
        address: usize,
        /// Element width in bytes
        access_size: usize,
    },
}

/// Work performed by one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineReport {
    /// Elements accessed
    pub work_count: u64,
    /// Chunks completed
    pub chunks: u64,
    /// Element width in bytes
    pub access_size: usize,
}

impl EngineReport {
    /// Total bytes loaded or stored.
    #[must_use]
    pub fn bytes_touched(&self) -> u64 {
        self.work_count * self.access_size as u64
    }
}

/// Per-run access parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEngine {
    access_size: AccessSize,
    chunk_size: usize,
    pattern: AccessPattern,
    mode: OperationMode,
    mix: OpMix,
}

impl AccessEngine {
    /// Creates an engine with explicit parameters.
    #[must_use]
    pub fn new(
        access_size: AccessSize,
        chunk_size: usize,
        pattern: AccessPattern,
        mode: OperationMode,
        mix: OpMix,
    ) -> Self {
        Self {
            access_size,
            chunk_size,
            pattern,
            mode,
            mix,
        }
    }

    /// Creates an engine from a validated configuration.
    #[must_use]
    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            config.access_size,
            config.chunk_size,
            config.pattern,
            config.mode,
            config.mix,
        )
    }

    /// Walks `memory` until `stop` fires.
    ///
    /// The generator is seeded with `seed`; identical seeds and parameters
    /// produce identical offset and value sequences.
    ///
    /// # Errors
    ///
    /// Returns an error if `memory` does not fit the chunk geometry or is not
    /// aligned to the element width. Nothing is accessed in that case.
    pub fn run<S>(&self, memory: &mut [u8], seed: u32, stop: &S) -> Result<EngineReport, EngineError>
    where
        S: StopCondition + ?Sized,
    {
        let geometry = self.geometry(memory)?;
        let mut rng = Drand48::new(seed);
        let base = memory.as_mut_ptr();

        let (work_count, chunks) = match self.access_size {
            AccessSize::B1 => self.with_pattern::<u8, S>(base, geometry, &mut rng, stop),
            AccessSize::B2 => self.with_pattern::<u16, S>(base, geometry, &mut rng, stop),
            AccessSize::B4 => self.with_pattern::<u32, S>(base, geometry, &mut rng, stop),
            AccessSize::B8 => self.with_pattern::<u64, S>(base, geometry, &mut rng, stop),
            AccessSize::B16 => self.with_pattern::<u128, S>(base, geometry, &mut rng, stop),
        };

        Ok(EngineReport {
            work_count,
            chunks,
            access_size: self.access_size.bytes(),
        })
    }

    fn geometry(&self, memory: &[u8]) -> Result<ChunkGeometry, EngineError> {
        let access_size = self.access_size.bytes();
        let chunk_size = self.chunk_size;
        let region_size = memory.len();

        if !chunk_size.is_power_of_two() || chunk_size < access_size {
            return Err(EngineError::ChunkSize {
                chunk_size,
                access_size,
            });
        }
        if region_size == 0 || region_size % chunk_size != 0 {
            return Err(EngineError::RegionSize {
                region_size,
                chunk_size,
            });
        }
        let address = memory.as_ptr() as usize;
        if address % access_size != 0 {
            return Err(EngineError::Misaligned {
                address,
                access_size,
            });
        }

        Ok(ChunkGeometry::new(region_size, chunk_size))
    }

    fn with_pattern<W: Element, S: StopCondition + ?Sized>(
        &self,
        base: *mut u8,
        geometry: ChunkGeometry,
        rng: &mut Drand48,
        stop: &S,
    ) -> (u64, u64) {
        match self.pattern {
            AccessPattern::Sequential => self.with_mode::<W, Sequential, S>(base, geometry, rng, stop),
            AccessPattern::Random => self.with_mode::<W, Random, S>(base, geometry, rng, stop),
        }
    }

    fn with_mode<W: Element, T: Traversal, S: StopCondition + ?Sized>(
        &self,
        base: *mut u8,
        geometry: ChunkGeometry,
        rng: &mut Drand48,
        stop: &S,
    ) -> (u64, u64) {
        // SAFETY (all arms): `geometry` was derived from the live region at
        // `base`, which stays exclusively borrowed for the whole call
        match self.mode {
            OperationMode::Normal => unsafe {
                access_loop::<W, T, Plain, S>(base, geometry, self.mix, rng, stop)
            },
            OperationMode::Flush => unsafe {
                access_loop::<W, T, Flush, S>(base, geometry, self.mix, rng, stop)
            },
            OperationMode::NonTemporal => unsafe {
                access_loop::<W, T, NonTemporal, S>(base, geometry, self.mix, rng, stop)
            },
        }
    }
}

/// The measurement loop. Returns `(work_count, chunks)`.
///
/// # Safety
///
/// `base` must point to `geometry.region_size()` writable bytes aligned to
/// `W::WIDTH`, not accessed by anyone else for the duration of the call.
unsafe fn access_loop<W, T, M, S>(
    base: *mut u8,
    geometry: ChunkGeometry,
    mix: OpMix,
    rng: &mut Drand48,
    stop: &S,
) -> (u64, u64)
where
    W: Element,
    T: Traversal,
    M: AccessMode,
    S: StopCondition + ?Sized,
{
    let chunk_size = geometry.chunk_size();
    let chunks_per_pass = geometry.chunks_per_pass();
    let mut work_count = 0u64;
    let mut chunks = 0u64;

    'run: loop {
        let mut offset = 0;

        for index in 0..chunks_per_pass {
            if stop.should_stop() {
                break 'run;
            }
            offset = if index == 0 {
                T::first(&geometry, rng)
            } else {
                T::next(&geometry, offset, rng)
            };

            // offset + chunk_size <= region_size for both traversals
            let chunk = base.add(offset);
            let mut element = 0;
            while element < chunk_size {
                let ptr = chunk.add(element);
                match mix.operation(work_count) {
                    Operation::Load => M::load::<W>(ptr),
                    Operation::Store => M::store::<W>(ptr, W::draw(rng)),
                }
                work_count += 1;
                element += W::WIDTH;
            }

            chunks += 1;
        }
    }

    M::finish();
    (work_count, chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use rand_core::RngCore;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(
        access_size: AccessSize,
        chunk_size: usize,
        pattern: AccessPattern,
        mode: OperationMode,
        mix: OpMix,
    ) -> AccessEngine {
        AccessEngine::new(access_size, chunk_size, pattern, mode, mix)
    }

    fn region(len: usize) -> Region {
        Region::anonymous(len).unwrap()
    }

    #[test]
    fn test_single_element_region_loads_only() {
        let mut region = region(1);
        let engine = engine(
            AccessSize::B1,
            1,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::loads_only(),
        );

        let report = engine
            .run(region.as_mut_slice(), 1, &ChunkLimit::new(10))
            .unwrap();

        assert_eq!(report.work_count, 10);
        assert_eq!(report.chunks, 10);
        assert_eq!(report.bytes_touched(), report.work_count);
        assert_eq!(region.as_slice(), &[0]);
    }

    const ALL_WIDTHS: [AccessSize; 5] = [
        AccessSize::B1,
        AccessSize::B2,
        AccessSize::B4,
        AccessSize::B8,
        AccessSize::B16,
    ];

    /// Native-endian bytes of the next store value of width `W`.
    fn drawn_bytes<W: Element>(rng: &mut Drand48) -> Vec<u8> {
        let mut slot = [0u128; 1];
        // SAFETY: slot is 16 bytes, 16-byte aligned
        unsafe { W::store(slot.as_mut_ptr().cast::<u8>(), W::draw(rng)) };
        slot[0].to_ne_bytes()[..W::WIDTH].to_vec()
    }

    /// Store values filling `len` bytes, in draw order.
    fn drawn_run(size: AccessSize, rng: &mut Drand48, len: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            bytes.extend(match size {
                AccessSize::B1 => drawn_bytes::<u8>(rng),
                AccessSize::B2 => drawn_bytes::<u16>(rng),
                AccessSize::B4 => drawn_bytes::<u32>(rng),
                AccessSize::B8 => drawn_bytes::<u64>(rng),
                AccessSize::B16 => drawn_bytes::<u128>(rng),
            });
        }
        bytes
    }

    #[test]
    fn test_sequential_stores_visit_each_element_once_in_order() {
        for size in ALL_WIDTHS {
            let mut region = region(4096);
            let engine = engine(
                size,
                64,
                AccessPattern::Sequential,
                OperationMode::Normal,
                OpMix::stores_only(),
            );

            let report = engine
                .run(region.as_mut_slice(), 99, &ChunkLimit::new(4096 / 64))
                .unwrap();
            assert_eq!(report.work_count, 4096 / size.bytes() as u64, "width {size}");
            assert_eq!(report.bytes_touched(), 4096, "width {size}");

            let expected = drawn_run(size, &mut Drand48::new(99), 4096);
            assert_eq!(region.as_slice(), &expected[..], "width {size}");
        }
    }

    #[test]
    fn test_random_stores_land_on_drawn_chunks() {
        let region_size = 4096;
        let chunk_size = 256;
        let geometry = ChunkGeometry::new(region_size, chunk_size);

        for size in ALL_WIDTHS {
            let mut region = region(region_size);
            let engine = engine(
                size,
                chunk_size,
                AccessPattern::Random,
                OperationMode::Normal,
                OpMix::stores_only(),
            );

            // 40 chunks span more than two passes of 16 chunks
            engine
                .run(region.as_mut_slice(), 31, &ChunkLimit::new(40))
                .unwrap();

            let mut rng = Drand48::new(31);
            let mut model = vec![0u8; region_size];
            for _ in 0..40 {
                let offset = Random::next(&geometry, 0, &mut rng);
                assert_eq!(offset % chunk_size, 0);
                assert!(offset + chunk_size <= region_size);
                let values = drawn_run(size, &mut rng, chunk_size);
                model[offset..offset + chunk_size].copy_from_slice(&values);
            }
            assert_eq!(region.as_slice(), &model[..], "width {size}");
        }
    }

    #[test]
    fn test_sequential_wraps_after_a_pass() {
        let mut region = region(256);
        let engine = engine(
            AccessSize::B4,
            64,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::stores_only(),
        );

        // One and a half passes: the first half is overwritten by the second pass.
        engine
            .run(region.as_mut_slice(), 5, &ChunkLimit::new(6))
            .unwrap();

        let mut rng = Drand48::new(5);
        let first_pass: Vec<u32> = (0..64).map(|_| rng.next_u32()).collect();
        let second_pass: Vec<u32> = (0..32).map(|_| rng.next_u32()).collect();
        let words: Vec<u32> = region
            .as_slice()
            .chunks_exact(4)
            .map(|w| u32::from_ne_bytes(w.try_into().unwrap()))
            .collect();

        assert_eq!(&words[..32], &second_pass[..]);
        assert_eq!(&words[32..], &first_pass[32..]);
    }

    #[test]
    fn test_mixed_schedule_touches_only_store_slots() {
        let mut region = region(1024);
        let engine = engine(
            AccessSize::B4,
            32,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::new(2, 1),
        );

        engine
            .run(region.as_mut_slice(), 21, &ChunkLimit::new(1024 / 32))
            .unwrap();

        let mut rng = Drand48::new(21);
        for (index, word) in region.as_slice().chunks_exact(4).enumerate() {
            let value = u32::from_ne_bytes(word.try_into().unwrap());
            if index % 3 == 2 {
                assert_eq!(value, rng.next_u32(), "store slot {index}");
            } else {
                assert_eq!(value, 0, "load slot {index}");
            }
        }
    }

    #[test]
    fn test_loads_only_never_writes() {
        let mut region = region(8192);
        let engine = engine(
            AccessSize::B16,
            128,
            AccessPattern::Random,
            OperationMode::Flush,
            OpMix::loads_only(),
        );

        let report = engine
            .run(region.as_mut_slice(), 3, &ChunkLimit::new(500))
            .unwrap();

        assert_eq!(report.work_count, 500 * 8);
        assert!(region.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_random_runs_are_reproducible() {
        let run = |seed: u32| {
            let mut region = region(1 << 16);
            let engine = engine(
                AccessSize::B2,
                256,
                AccessPattern::Random,
                OperationMode::Normal,
                OpMix::new(1, 3),
            );
            engine
                .run(region.as_mut_slice(), seed, &ChunkLimit::new(300))
                .unwrap();
            region.as_slice().to_vec()
        };

        assert_eq!(run(0xBAAD_F00D), run(0xBAAD_F00D));
        assert_ne!(run(1), run(2));
    }

    #[test]
    fn test_modes_store_identical_values() {
        let run = |mode: OperationMode, size: AccessSize| {
            let mut region = region(4096);
            let engine = engine(size, 64, AccessPattern::Random, mode, OpMix::stores_only());
            engine
                .run(region.as_mut_slice(), 8, &ChunkLimit::new(40))
                .unwrap();
            region.as_slice().to_vec()
        };

        for size in ALL_WIDTHS {
            let plain = run(OperationMode::Normal, size);
            assert_eq!(plain, run(OperationMode::Flush, size));
            assert_eq!(plain, run(OperationMode::NonTemporal, size));
        }
    }

    #[test]
    fn test_stopped_signal_performs_no_work() {
        let mut region = region(4096);
        let signal = RunSignal::new();
        signal.stop();

        let report = AccessEngine::new(
            AccessSize::B8,
            64,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::loads_only(),
        )
        .run(region.as_mut_slice(), 1, &signal)
        .unwrap();

        assert_eq!(report.work_count, 0);
        assert_eq!(report.bytes_touched(), 0);
    }

    #[test]
    fn test_run_signal_stops_at_chunk_boundary() {
        let signal = Arc::new(RunSignal::new());
        let worker = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let mut region = Region::anonymous(1 << 20).unwrap();
                AccessEngine::new(
                    AccessSize::B8,
                    256,
                    AccessPattern::Random,
                    OperationMode::Normal,
                    OpMix::new(1, 1),
                )
                .run(region.as_mut_slice(), 4, &*signal)
                .unwrap()
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        signal.stop();
        let report = worker.join().unwrap();

        assert!(report.work_count > 0);
        assert_eq!(report.work_count, report.chunks * 32);
        assert_eq!(report.bytes_touched(), report.work_count * 8);
    }

    #[test]
    fn test_rejects_region_not_multiple_of_chunk() {
        let mut region = region(100);
        let err = engine(
            AccessSize::B1,
            64,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::loads_only(),
        )
        .run(region.as_mut_slice(), 0, &ChunkLimit::new(1))
        .unwrap_err();

        assert!(matches!(err, EngineError::RegionSize { region_size: 100, .. }));
    }

    #[test]
    fn test_rejects_bad_chunk_size() {
        let mut region = region(4096);
        let err = engine(
            AccessSize::B16,
            8,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::loads_only(),
        )
        .run(region.as_mut_slice(), 0, &ChunkLimit::new(1))
        .unwrap_err();

        assert!(matches!(err, EngineError::ChunkSize { .. }));
    }

    #[test]
    fn test_rejects_misaligned_region() {
        let mut region = region(4096 + 8);
        let err = engine(
            AccessSize::B8,
            8,
            AccessPattern::Sequential,
            OperationMode::Normal,
            OpMix::loads_only(),
        )
        .run(&mut region.as_mut_slice()[1..4097], 0, &ChunkLimit::new(1))
        .unwrap_err();

        assert!(matches!(err, EngineError::Misaligned { access_size: 8, .. }));
    }
}
