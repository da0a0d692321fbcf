//! # Access Widths
//!
//! One [`Element`] implementation per supported width. Store values are
//! built from 31-bit generator draws:
//!
//! | Width | Value |
//! |-------|-------|
//! | 1, 2 | low bits of one draw |
//! | 4 | one draw |
//! | 8 | `r0 \| r1 << 32` |
//! | 16 | `r0 \| r1 << 32 \| r2 << 64 \| r3 << 96` |

use std::ptr;

use rand_core::RngCore;

/// A fixed-width element that the engine loads and stores.
///
/// # Safety
///
/// Pointers passed to the accessors must be valid for `WIDTH` bytes and
/// aligned to `WIDTH`.
pub trait Element: Copy + Send + 'static {
    /// Width in bytes.
    const WIDTH: usize;

    /// Builds a store value from the generator.
    fn draw<R: RngCore>(rng: &mut R) -> Self;

    /// Reads the element.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `WIDTH` bytes and aligned to `WIDTH`.
    #[inline(always)]
    unsafe fn load(ptr: *const u8) -> Self {
        ptr::read_volatile(ptr.cast::<Self>())
    }

    /// Writes the element through the cache.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `WIDTH` bytes and aligned to `WIDTH`.
    #[inline(always)]
    unsafe fn store(ptr: *mut u8, value: Self) {
        ptr::write_volatile(ptr.cast::<Self>(), value);
    }

    /// Writes the element with a streaming (cache-bypassing) store.
    ///
    /// Widths without a streaming store instruction fall back to
    /// [`store`](Self::store).
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `WIDTH` bytes and aligned to `WIDTH`.
    #[inline(always)]
    unsafe fn store_nontemporal(ptr: *mut u8, value: Self) {
        Self::store(ptr, value);
    }
}

#[allow(clippy::cast_possible_truncation)]
impl Element for u8 {
    const WIDTH: usize = 1;

    #[inline(always)]
    fn draw<R: RngCore>(rng: &mut R) -> Self {
        rng.next_u32() as u8
    }
}

#[allow(clippy::cast_possible_truncation)]
impl Element for u16 {
    const WIDTH: usize = 2;

    #[inline(always)]
    fn draw<R: RngCore>(rng: &mut R) -> Self {
        rng.next_u32() as u16
    }
}

impl Element for u32 {
    const WIDTH: usize = 4;

    #[inline(always)]
    fn draw<R: RngCore>(rng: &mut R) -> Self {
        rng.next_u32()
    }

    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    #[allow(clippy::cast_possible_wrap)]
    unsafe fn store_nontemporal(ptr: *mut u8, value: Self) {
        use core::arch::x86_64::_mm_stream_si32;
        _mm_stream_si32(ptr.cast::<i32>(), value as i32);
    }
}

impl Element for u64 {
    const WIDTH: usize = 8;

    #[inline(always)]
    fn draw<R: RngCore>(rng: &mut R) -> Self {
        let low = u64::from(rng.next_u32());
        let high = u64::from(rng.next_u32());
        low | (high << 32)
    }

    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    #[allow(clippy::cast_possible_wrap)]
    unsafe fn store_nontemporal(ptr: *mut u8, value: Self) {
        use core::arch::x86_64::_mm_stream_si64;
        _mm_stream_si64(ptr.cast::<i64>(), value as i64);
    }
}

impl Element for u128 {
    const WIDTH: usize = 16;

    #[inline(always)]
    fn draw<R: RngCore>(rng: &mut R) -> Self {
        (0..4).fold(0u128, |acc, i| acc | (u128::from(rng.next_u32()) << (32 * i)))
    }

    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    unsafe fn store_nontemporal(ptr: *mut u8, value: Self) {
        use core::arch::x86_64::{__m128i, _mm_set_epi64x, _mm_stream_si128};
        let high = (value >> 64) as u64 as i64;
        let low = value as u64 as i64;
        _mm_stream_si128(ptr.cast::<__m128i>(), _mm_set_epi64x(high, low));
    }
}
