//! Region acquisition errors.

use std::path::PathBuf;

use crate::numa::NumaError;

/// Errors raised while acquiring a worker region.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The core is not listed in any configured domain
    #[error("CPU {cpu} is not part of any configured domain")]
    UnknownCpu {
        /// The core id
        cpu: usize,
    },

    /// The target domain has no NVRAM devices
    #[error("Domain {domain} has no NVRAM devices")]
    NoDevices {
        /// Target domain index
        domain: usize,
    },

    /// The worker's device offset does not fit in 64 bits
    #[error("NVRAM offset of worker {worker_index} with {region_size}-byte regions overflows")]
    OffsetOverflow {
        /// Worker index within its domain
        worker_index: usize,
        /// Region size in bytes
        region_size: usize,
    },

    /// Node-local DRAM allocation failed
    #[error(transparent)]
    Numa(#[from] NumaError),

    /// Opening an NVRAM device failed
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        /// Device path
        path: PathBuf,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Mapping an NVRAM device failed
    #[error("Failed to map {} at offset {offset}: {source}", path.display())]
    Map {
        /// Device path
        path: PathBuf,
        /// Byte offset into the device
        offset: u64,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },
}
