//! # Chunk Traversal
//!
//! Chooses the next chunk offset inside a region. A pass covers
//! `region_size / chunk_size` chunks; the engine restarts the traversal
//! after every pass.

use rand_core::RngCore;

/// Chunk offset strategy.
pub trait Traversal {
    /// Offset of the first chunk of a pass.
    fn first<R: RngCore>(geometry: &ChunkGeometry, rng: &mut R) -> usize;

    /// Offset of the chunk following `current`.
    fn next<R: RngCore>(geometry: &ChunkGeometry, current: usize, rng: &mut R) -> usize;
}

/// Region and chunk dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    region_size: usize,
    chunk_size: usize,
}

impl ChunkGeometry {
    /// Creates a geometry; `chunk_size` must be a power of two dividing
    /// `region_size`.
    #[must_use]
    pub fn new(region_size: usize, chunk_size: usize) -> Self {
        debug_assert!(chunk_size.is_power_of_two());
        debug_assert!(region_size >= chunk_size && region_size % chunk_size == 0);
        Self {
            region_size,
            chunk_size,
        }
    }

    /// Region size in bytes.
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks visited per pass.
    #[must_use]
    pub fn chunks_per_pass(&self) -> usize {
        self.region_size / self.chunk_size
    }
}

/// Increasing offsets, one chunk apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

/// Offsets drawn from the generator, aligned down to the chunk size.
#[derive(Debug, Clone, Copy, Default)]
pub struct Random;

impl Traversal for Sequential {
    #[inline(always)]
    fn first<R: RngCore>(_geometry: &ChunkGeometry, _rng: &mut R) -> usize {
        0
    }

    #[inline(always)]
    fn next<R: RngCore>(geometry: &ChunkGeometry, current: usize, _rng: &mut R) -> usize {
        current + geometry.chunk_size
    }
}

impl Traversal for Random {
    #[inline(always)]
    fn first<R: RngCore>(geometry: &ChunkGeometry, rng: &mut R) -> usize {
        Self::draw(geometry, rng)
    }

    #[inline(always)]
    fn next<R: RngCore>(geometry: &ChunkGeometry, _current: usize, rng: &mut R) -> usize {
        Self::draw(geometry, rng)
    }
}

impl Random {
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation)]
    fn draw<R: RngCore>(geometry: &ChunkGeometry, rng: &mut R) -> usize {
        // Remainder is below region_size, so it fits in usize.
        let offset = (rng.next_u64() % geometry.region_size as u64) as usize;
        offset & !(geometry.chunk_size - 1)
    }
}
