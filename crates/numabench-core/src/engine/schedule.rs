//! # Load/Store Schedule
//!
//! Fixed, deterministic interleaving of loads and stores: out of every
//! `loads + stores` consecutive elements the first `loads` are loads and the
//! rest are stores.

/// The operation performed on one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read the element
    Load,
    /// Write a fresh random value to the element
    Store,
}

/// Ratio of loads to stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpMix {
    /// Loads per period
    pub loads: u32,
    /// Stores per period
    pub stores: u32,
}

impl OpMix {
    /// Creates a mix of `loads` loads followed by `stores` stores.
    #[must_use]
    pub const fn new(loads: u32, stores: u32) -> Self {
        Self { loads, stores }
    }

    /// Loads only.
    #[must_use]
    pub const fn loads_only() -> Self {
        Self::new(1, 0)
    }

    /// Stores only.
    #[must_use]
    pub const fn stores_only() -> Self {
        Self::new(0, 1)
    }

    /// Length of one load/store cycle.
    #[must_use]
    pub fn period(&self) -> u64 {
        u64::from(self.loads) + u64::from(self.stores)
    }

    /// Returns true if the mix performs no operation at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.period() == 0
    }

    /// Returns the operation for the element at `work_count`.
    #[inline]
    #[must_use]
    pub fn operation(&self, work_count: u64) -> Operation {
        if self.stores == 0 {
            Operation::Load
        } else if self.loads == 0 {
            Operation::Store
        } else if work_count % self.period() < u64::from(self.loads) {
            Operation::Load
        } else {
            Operation::Store
        }
    }
}

impl Default for OpMix {
    fn default() -> Self {
        Self::loads_only()
    }
}
