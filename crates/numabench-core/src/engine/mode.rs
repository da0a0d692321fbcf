//! # Operation Modes
//!
//! Zero-sized strategies selected once per run, so the hot loop carries no
//! per-element mode checks.
//!
//! | Mode | Load | Store |
//! |------|------|-------|
//! | [`Plain`] | read | write |
//! | [`Flush`] | read + `clflush` | write + `clflush` |
//! | [`NonTemporal`] | read | streaming write, `sfence` on stop |
//!
//! Cache-line flushes and fences are x86\_64 instructions; other targets
//! perform the plain access only.

use super::element::Element;

/// How loads and stores touch memory.
pub trait AccessMode {
    /// Reads the element at `ptr`, discarding the value.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid and aligned for `W`.
    unsafe fn load<W: Element>(ptr: *const u8);

    /// Writes `value` to `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid and aligned for `W`.
    unsafe fn store<W: Element>(ptr: *mut u8, value: W);

    /// Runs once after the last access.
    #[inline]
    fn finish() {}
}

/// Plain loads and stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

/// Loads and stores followed by a cache-line flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flush;

/// Plain loads, streaming stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonTemporal;

impl AccessMode for Plain {
    #[inline(always)]
    unsafe fn load<W: Element>(ptr: *const u8) {
        std::hint::black_box(W::load(ptr));
    }

    #[inline(always)]
    unsafe fn store<W: Element>(ptr: *mut u8, value: W) {
        W::store(ptr, value);
    }
}

impl AccessMode for Flush {
    #[inline(always)]
    unsafe fn load<W: Element>(ptr: *const u8) {
        std::hint::black_box(W::load(ptr));
        flush_line(ptr);
    }

    #[inline(always)]
    unsafe fn store<W: Element>(ptr: *mut u8, value: W) {
        W::store(ptr, value);
        flush_line(ptr);
    }
}

impl AccessMode for NonTemporal {
    #[inline(always)]
    unsafe fn load<W: Element>(ptr: *const u8) {
        std::hint::black_box(W::load(ptr));
    }

    #[inline(always)]
    unsafe fn store<W: Element>(ptr: *mut u8, value: W) {
        W::store_nontemporal(ptr, value);
    }

    fn finish() {
        store_fence();
    }
}

#[inline(always)]
unsafe fn flush_line(ptr: *const u8) {
    #[cfg(target_arch = "x86_64")]
    core::arch::x86_64::_mm_clflush(ptr);

    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}

#[inline]
fn store_fence() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: sfence has no operands; SSE is part of the x86_64 baseline
    unsafe {
        core::arch::x86_64::_mm_sfence();
    }

    #[cfg(not(target_arch = "x86_64"))]
    std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
}

/// Returns true if the target executes flushes and streaming stores.
#[must_use]
pub const fn has_cache_control() -> bool {
    cfg!(target_arch = "x86_64")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<M: AccessMode>() {
        let mut slot = [0u64; 8];
        let ptr = slot.as_mut_ptr().cast::<u8>();

        // SAFETY: slot is 64 bytes, 8-byte aligned
        unsafe {
            M::store::<u64>(ptr, 0xAB);
            M::load::<u64>(ptr);
            M::store::<u32>(ptr.add(8), 0xCD);
        }
        M::finish();

        assert_eq!(slot[0], 0xAB);
        assert_eq!(slot[1] & 0xFFFF_FFFF, 0xCD);
    }

    #[test]
    fn test_plain() {
        exercise::<Plain>();
    }

    #[test]
    fn test_flush() {
        exercise::<Flush>();
    }

    #[test]
    fn test_nontemporal() {
        exercise::<NonTemporal>();
    }
}
