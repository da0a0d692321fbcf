//! # Configuration File
//!
//! TOML overlay for [`BenchConfigBuilder`](super::BenchConfigBuilder). Every
//! key is optional; missing keys keep the builder's defaults.
//!
//! ```toml
//! memory_type = "nvram"
//! distance = "far"
//! pattern = "random"
//! mode = "clflush"
//! access_size = 8
//! chunk_size = 64
//! mem_per_thread_gib = 2
//! duration_secs = 80
//! loads = 1
//! stores = 1
//!
//! [[domains]]
//! cpus = [0, 2, 4, 6]
//! nvram = ["/dev/dax0.0"]
//!
//! [[domains]]
//! cpus = [1, 3, 5, 7]
//! nvram = ["/dev/dax1.0"]
//! ```

use std::path::Path;

use serde::Deserialize;

use super::topology::Domain;
use super::{AccessPattern, AccessSize, ConfigError, MemoryType, NumaDistance, OperationMode};

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// DRAM or NVRAM
    pub memory_type: Option<MemoryType>,
    /// Near or far placement
    pub distance: Option<NumaDistance>,
    /// Sequential or random chunk order
    pub pattern: Option<AccessPattern>,
    /// Plain, flushing or non-temporal operations
    pub mode: Option<OperationMode>,
    /// Bytes per element
    pub access_size: Option<AccessSize>,
    /// Bytes per chunk
    pub chunk_size: Option<usize>,
    /// Region size per worker, in GiB
    pub mem_per_thread_gib: Option<usize>,
    /// Region size per worker, in bytes (overrides `mem_per_thread_gib`)
    pub region_size: Option<usize>,
    /// Run duration in seconds
    pub duration_secs: Option<u64>,
    /// Loads per load/store period
    pub loads: Option<u32>,
    /// Stores per load/store period
    pub stores: Option<u32>,
    /// Seed of the per-worker seed sequence
    pub master_seed: Option<u32>,
    /// Explicit topology; detected from the host when absent
    pub domains: Option<Vec<Domain>>,
}

impl FileConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }
}
