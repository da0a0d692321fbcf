//! # NUMA Placement
//!
//! Host topology detection and node-local memory allocation.
//!
//! ```text
//! ┌─────────────────────┐         ┌─────────────────────┐
//! │       Node 0        │         │       Node 1        │
//! │  ┌───────────────┐  │         │  ┌───────────────┐  │
//! │  │   Workers     │──┼── far ──┼─►│  DRAM / NVRAM │  │
//! │  └───────┬───────┘  │         │  └───────────────┘  │
//! │        near         │         │                     │
//! │  ┌───────▼───────┐  │         │                     │
//! │  │  DRAM / NVRAM │  │         │                     │
//! │  └───────────────┘  │         │                     │
//! └─────────────────────┘         └─────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`NumaTopology`] - Detects the host's nodes and their CPUs
//! - [`NumaAllocator`] - `mmap` + `mbind` allocation on a given node
//!
//! ## Platform Support
//!
//! | Platform | Support |
//! |----------|---------|
//! | Linux | Full NUMA support |
//! | Other | Single node, no binding |

mod allocator;
mod error;
mod topology;

pub use allocator::NumaAllocator;
pub use error::NumaError;
pub use topology::{online_cpus, NumaTopology};
