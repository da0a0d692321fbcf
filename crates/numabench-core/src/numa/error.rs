//! # NUMA Error Types
//!
//! Error types for host topology detection and node-local allocation.

/// Errors that can occur during NUMA operations.
#[derive(Debug, thiserror::Error)]
pub enum NumaError {
    /// Allocation failed
    #[error("NUMA allocation of {size} bytes failed: {source}")]
    AllocationFailed {
        /// Requested size in bytes
        size: usize,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Invalid NUMA node
    #[error("Invalid NUMA node: {node} (system has {available} nodes)")]
    InvalidNode {
        /// The requested node
        node: usize,
        /// Number of available nodes
        available: usize,
    },

    /// Memory binding failed
    #[error("Binding memory to node {node} failed: {source}")]
    BindFailed {
        /// The target node
        node: usize,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Topology detection failed
    #[error("Topology detection failed: {0}")]
    TopologyError(String),
}
