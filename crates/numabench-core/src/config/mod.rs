//! # Benchmark Configuration
//!
//! The validated, immutable parameter set of one benchmark run. Built with
//! [`BenchConfigBuilder`], optionally seeded from a TOML [`FileConfig`], and
//! frozen before any worker starts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use numabench_core::config::{BenchConfig, MemoryType, NumaDistance};
//!
//! let config = BenchConfig::builder()
//!     .memory_type(MemoryType::Nvram)
//!     .distance(NumaDistance::Far)
//!     .access_size(16)
//!     .chunk_size(256)
//!     .build()?;
//! ```

mod error;
mod file;
mod topology;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub use error::ConfigError;
pub use file::FileConfig;
pub use topology::{Domain, SystemTopology, WorkerSlot};

use crate::engine::OpMix;
use crate::numa::NumaTopology;
use crate::rng::DEFAULT_MASTER_SEED;

/// Bytes in one GiB.
pub const GIB: usize = 1 << 30;

/// Page granularity required for NVRAM mapping offsets.
pub const PAGE_SIZE: usize = 4096;

/// Upper bound on configured domains; near/far is defined for two.
pub const MAX_DOMAINS: usize = 2;

/// Backing memory of the worker regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Anonymous memory bound to a NUMA node
    Dram,
    /// DAX device mapped with `MAP_SYNC`
    Nvram,
}

/// Placement of a worker's region relative to its CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumaDistance {
    /// Same domain as the worker's CPU
    Near,
    /// The other of exactly two domains
    Far,
}

impl NumaDistance {
    /// Returns the node a worker on `owning_node` allocates from.
    ///
    /// Far flips the lowest bit, which only names "the other node" on a
    /// two-domain topology.
    #[inline]
    #[must_use]
    pub fn target_node(self, owning_node: usize) -> usize {
        match self {
            Self::Near => owning_node,
            Self::Far => owning_node ^ 1,
        }
    }
}

/// Order in which chunks are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPattern {
    /// Increasing chunk offsets, restarting at zero after each pass
    Sequential,
    /// Chunk offsets drawn from the worker's generator
    Random,
}

/// How each load or store touches memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Plain loads and stores
    #[serde(alias = "plain")]
    Normal,
    /// Flush the cache line after every access
    #[serde(rename = "clflush", alias = "flush")]
    Flush,
    /// Streaming stores that bypass the cache
    #[serde(alias = "non-temporal", alias = "nt")]
    NonTemporal,
}

/// Width of one element access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "usize")]
pub enum AccessSize {
    /// 1 byte
    B1,
    /// 2 bytes
    B2,
    /// 4 bytes
    B4,
    /// 8 bytes
    B8,
    /// 16 bytes
    B16,
}

impl AccessSize {
    /// Returns the width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::B1 => 1,
            Self::B2 => 2,
            Self::B4 => 4,
            Self::B8 => 8,
            Self::B16 => 16,
        }
    }
}

impl TryFrom<usize> for AccessSize {
    type Error = ConfigError;

    fn try_from(bytes: usize) -> Result<Self, Self::Error> {
        match bytes {
            1 => Ok(Self::B1),
            2 => Ok(Self::B2),
            4 => Ok(Self::B4),
            8 => Ok(Self::B8),
            16 => Ok(Self::B16),
            _ => Err(ConfigError::InvalidValue {
                field: "access_size",
                value: bytes.to_string(),
            }),
        }
    }
}

impl FromStr for MemoryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dram" => Ok(Self::Dram),
            "nvram" => Ok(Self::Nvram),
            _ => Err(ConfigError::InvalidValue {
                field: "memory_type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dram => write!(f, "dram"),
            Self::Nvram => write!(f, "nvram"),
        }
    }
}

impl FromStr for NumaDistance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "near" => Ok(Self::Near),
            "far" => Ok(Self::Far),
            _ => Err(ConfigError::InvalidValue {
                field: "distance",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for NumaDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Near => write!(f, "near"),
            Self::Far => write!(f, "far"),
        }
    }
}

impl FromStr for AccessPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            _ => Err(ConfigError::InvalidValue {
                field: "pattern",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for OperationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "normal" | "plain" => Ok(Self::Normal),
            "clflush" | "flush" => Ok(Self::Flush),
            "nontemporal" | "non-temporal" | "nt" => Ok(Self::NonTemporal),
            _ => Err(ConfigError::InvalidValue {
                field: "mode",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Flush => write!(f, "clflush"),
            Self::NonTemporal => write!(f, "nontemporal"),
        }
    }
}

impl FromStr for AccessSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "access_size",
                value: s.to_string(),
            })
            .and_then(Self::try_from)
    }
}

impl fmt::Display for AccessSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bytes())
    }
}

/// Validated parameters of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// DRAM or NVRAM regions
    pub memory_type: MemoryType,
    /// Near or far placement
    pub distance: NumaDistance,
    /// Chunk visiting order
    pub pattern: AccessPattern,
    /// Plain, flushing or non-temporal operations
    pub mode: OperationMode,
    /// Element width
    pub access_size: AccessSize,
    /// Chunk size in bytes (power of two)
    pub chunk_size: usize,
    /// Region size per worker in bytes
    pub region_size: usize,
    /// Measurement window
    pub duration: Duration,
    /// Load/store ratio
    pub mix: OpMix,
    /// Seed of the per-worker seed sequence
    pub master_seed: u32,
    /// Domains, CPUs and devices
    pub topology: SystemTopology,
}

impl BenchConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    /// Number of chunks in one pass over a region.
    #[must_use]
    pub fn chunks_per_region(&self) -> usize {
        self.region_size / self.chunk_size
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidConfig(msg));
        let width = self.access_size.bytes();

        if self.mix.is_empty() {
            return invalid("loads and stores must not both be 0".to_string());
        }
        if !self.chunk_size.is_power_of_two() {
            return invalid(format!("chunk_size {} is not a power of two", self.chunk_size));
        }
        if self.chunk_size < width {
            return invalid(format!(
                "chunk_size {} is smaller than access_size {width}",
                self.chunk_size
            ));
        }
        if self.region_size == 0 || self.region_size % self.chunk_size != 0 {
            return invalid(format!(
                "region_size {} must be a non-zero multiple of chunk_size {}",
                self.region_size, self.chunk_size
            ));
        }
        if self.memory_type == MemoryType::Nvram && self.region_size % PAGE_SIZE != 0 {
            return invalid(format!(
                "region_size {} must be a multiple of {PAGE_SIZE} for NVRAM mappings",
                self.region_size
            ));
        }
        if self.duration.is_zero() {
            return invalid("duration must be > 0".to_string());
        }

        self.validate_topology()
    }

    fn validate_topology(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidConfig(msg));
        let topo = &self.topology;
        let num_domains = topo.num_domains();

        if num_domains == 0 || num_domains > MAX_DOMAINS {
            return invalid(format!(
                "{num_domains} domains configured, expected 1 to {MAX_DOMAINS}"
            ));
        }
        if self.distance == NumaDistance::Far && num_domains != 2 {
            return invalid("far distance requires exactly 2 domains".to_string());
        }
        if topo.num_workers() == 0 {
            return invalid("topology lists no CPUs".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for slot in topo.workers() {
            if !seen.insert(slot.cpu) {
                return invalid(format!("cpu {} is listed more than once", slot.cpu));
            }
        }

        if self.memory_type == MemoryType::Nvram {
            for (index, domain) in topo.domains().iter().enumerate() {
                if domain.cpus.is_empty() {
                    continue;
                }
                let target = self.distance.target_node(index);
                let has_devices = topo.domain(target).is_some_and(|d| !d.nvram.is_empty());
                if !has_devices {
                    return invalid(format!(
                        "domain {target} has no NVRAM devices but is targeted by domain {index}"
                    ));
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for BenchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MEM_TYPE = {}", self.memory_type)?;
        writeln!(f, "NUMA_DISTANCE = {}", self.distance)?;
        writeln!(f, "OPERATION_MODE = {}", self.mode)?;
        writeln!(f, "ACCESS_PATTERN = {}", self.pattern)?;
        writeln!(f, "MEM_PER_THREAD = {} bytes", self.region_size)?;
        writeln!(f, "NUM_LOADS = {}", self.mix.loads)?;
        writeln!(f, "NUM_STORES = {}", self.mix.stores)?;
        writeln!(f, "ACCESS_SIZE = {}", self.access_size)?;
        writeln!(f, "CHUNK_SIZE = {}", self.chunk_size)?;
        writeln!(f, "DURATION = {}", self.duration.as_secs_f64())?;
        writeln!(f, "MASTER_SEED = {:#x}", self.master_seed)?;
        writeln!(f)?;
        write!(f, "{}", self.topology)
    }
}

/// Region size as given to the builder, before conversion to bytes.
#[derive(Debug, Clone, Copy)]
enum RegionSpec {
    Bytes(usize),
    Gib(usize),
}

impl RegionSpec {
    fn bytes(self) -> Result<usize, ConfigError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Gib(gib) => gib.checked_mul(GIB).ok_or_else(|| ConfigError::InvalidValue {
                field: "mem_per_thread_gib",
                value: gib.to_string(),
            }),
        }
    }
}

/// Builder for [`BenchConfig`].
#[derive(Debug, Default, Clone)]
pub struct BenchConfigBuilder {
    memory_type: Option<MemoryType>,
    distance: Option<NumaDistance>,
    pattern: Option<AccessPattern>,
    mode: Option<OperationMode>,
    access_size: Option<usize>,
    chunk_size: Option<usize>,
    region_size: Option<RegionSpec>,
    duration: Option<Duration>,
    loads: Option<u32>,
    stores: Option<u32>,
    master_seed: Option<u32>,
    topology: Option<SystemTopology>,
}

impl BenchConfigBuilder {
    /// Sets the backing memory type.
    #[must_use]
    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Sets near or far placement.
    #[must_use]
    pub fn distance(mut self, distance: NumaDistance) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Sets the chunk visiting order.
    #[must_use]
    pub fn pattern(mut self, pattern: AccessPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Sets the operation mode.
    #[must_use]
    pub fn mode(mut self, mode: OperationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the element width in bytes (1, 2, 4, 8 or 16).
    #[must_use]
    pub fn access_size(mut self, bytes: usize) -> Self {
        self.access_size = Some(bytes);
        self
    }

    /// Sets the chunk size in bytes.
    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    /// Sets the region size per worker in GiB.
    #[must_use]
    pub fn mem_per_thread_gib(mut self, gib: usize) -> Self {
        self.region_size = Some(RegionSpec::Gib(gib));
        self
    }

    /// Sets the region size per worker in bytes.
    #[must_use]
    pub fn region_size(mut self, bytes: usize) -> Self {
        self.region_size = Some(RegionSpec::Bytes(bytes));
        self
    }

    /// Sets the measurement window.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets loads per load/store period.
    #[must_use]
    pub fn loads(mut self, loads: u32) -> Self {
        self.loads = Some(loads);
        self
    }

    /// Sets stores per load/store period.
    #[must_use]
    pub fn stores(mut self, stores: u32) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Sets the master seed.
    #[must_use]
    pub fn master_seed(mut self, seed: u32) -> Self {
        self.master_seed = Some(seed);
        self
    }

    /// Sets an explicit topology.
    #[must_use]
    pub fn topology(mut self, topology: SystemTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Applies every key present in a configuration file.
    #[must_use]
    pub fn apply_file(mut self, file: FileConfig) -> Self {
        self.memory_type = file.memory_type.or(self.memory_type);
        self.distance = file.distance.or(self.distance);
        self.pattern = file.pattern.or(self.pattern);
        self.mode = file.mode.or(self.mode);
        self.access_size = file.access_size.map(AccessSize::bytes).or(self.access_size);
        self.chunk_size = file.chunk_size.or(self.chunk_size);
        self.region_size = file
            .region_size
            .map(RegionSpec::Bytes)
            .or(file.mem_per_thread_gib.map(RegionSpec::Gib))
            .or(self.region_size);
        self.duration = file.duration_secs.map(Duration::from_secs).or(self.duration);
        self.loads = file.loads.or(self.loads);
        self.stores = file.stores.or(self.stores);
        self.master_seed = file.master_seed.or(self.master_seed);
        self.topology = file.domains.map(SystemTopology::new).or(self.topology);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// Without an explicit topology the host topology is detected.
    ///
    /// # Errors
    ///
    /// Returns an error if the access size is invalid, the region size
    /// overflows, or validation fails.
    pub fn build(self) -> Result<BenchConfig, ConfigError> {
        let access_size = AccessSize::try_from(self.access_size.unwrap_or(1))?;
        let region_size = self.region_size.map_or(Ok(2 * GIB), RegionSpec::bytes)?;
        let topology = self
            .topology
            .unwrap_or_else(|| SystemTopology::from_host(&NumaTopology::detect()));

        let config = BenchConfig {
            memory_type: self.memory_type.unwrap_or(MemoryType::Dram),
            distance: self.distance.unwrap_or(NumaDistance::Near),
            pattern: self.pattern.unwrap_or(AccessPattern::Sequential),
            mode: self.mode.unwrap_or(OperationMode::Normal),
            access_size,
            chunk_size: self.chunk_size.unwrap_or(1),
            region_size,
            duration: self.duration.unwrap_or(Duration::from_secs(5)),
            mix: OpMix::new(self.loads.unwrap_or(1), self.stores.unwrap_or(0)),
            master_seed: self.master_seed.unwrap_or(DEFAULT_MASTER_SEED),
            topology,
        };
        config.validate()?;
        Ok(config)
    }
}
