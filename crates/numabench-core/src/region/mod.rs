//! # Worker Regions
//!
//! Each worker owns one contiguous region of `region_size` bytes:
//!
//! - **DRAM**: anonymous memory bound to the target node of the worker's
//!   domain (near: own domain, far: the other one)
//! - **NVRAM**: a `MAP_SYNC` window of one of the target domain's devices,
//!   chosen round-robin by the worker's index within its domain
//!
//! A [`Region`] unmaps itself on drop, so releasing is consuming it.

mod error;
mod nvram;
mod placement;

use std::fmt;
use std::path::PathBuf;
use std::ptr::NonNull;

pub use error::RegionError;
pub use placement::{nvram_slot, NvramSlot};

use crate::config::{BenchConfig, MemoryType, NumaDistance, SystemTopology};
use crate::numa::{NumaAllocator, NumaTopology};

/// Where a region's memory comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Anonymous memory bound to a NUMA node
    Dram {
        /// Target node
        node: usize,
    },
    /// Window of an NVRAM device
    Nvram {
        /// Device path
        device: PathBuf,
        /// Byte offset into the device
        offset: u64,
    },
    /// Unbound anonymous memory
    Anonymous,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dram { node } => write!(f, "dram node {node}"),
            Self::Nvram { device, offset } => write!(f, "{}@{offset}", device.display()),
            Self::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// An exclusively owned, mapped memory region.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
    placement: Placement,
}

// SAFETY: the mapping is owned by exactly one Region and only reachable
// through it
unsafe impl Send for Region {}

impl Region {
    /// Maps `len` bytes of unbound anonymous memory, zero-filled.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping fails.
    pub fn anonymous(len: usize) -> Result<Self, RegionError> {
        let ptr = NumaAllocator::new(&NumaTopology::single_node(1)).alloc_on_node(0, len)?;
        Ok(Self {
            ptr,
            len,
            placement: Placement::Anonymous,
        })
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Where the memory lives.
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Views the region as bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is a live mapping of len bytes owned by self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the region as mutable bytes.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is a live mapping of len bytes exclusively owned by self
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: every placement is an mmap of exactly len bytes owned by self
        unsafe { NumaAllocator::dealloc(self.ptr, self.len) };
    }
}

/// Acquires and releases worker regions for one run.
#[derive(Debug, Clone)]
pub struct RegionAllocator {
    memory_type: MemoryType,
    distance: NumaDistance,
    region_size: usize,
    topology: SystemTopology,
    numa: NumaAllocator,
}

impl RegionAllocator {
    /// Creates an allocator for `config` on the detected host.
    #[must_use]
    pub fn new(config: &BenchConfig) -> Self {
        Self::with_host(config, &NumaTopology::detect())
    }

    /// Creates an allocator for `config` on an explicit host topology.
    #[must_use]
    pub fn with_host(config: &BenchConfig, host: &NumaTopology) -> Self {
        if config.memory_type == MemoryType::Dram {
            if !host.is_numa() {
                tracing::warn!("Single-node host, DRAM regions are not node-bound");
            } else if host.num_nodes() < config.topology.num_domains() {
                tracing::warn!(
                    "{} domains configured but host has {} NUMA nodes",
                    config.topology.num_domains(),
                    host.num_nodes()
                );
            }
        }

        Self {
            memory_type: config.memory_type,
            distance: config.distance,
            region_size: config.region_size,
            topology: config.topology.clone(),
            numa: NumaAllocator::new(host),
        }
    }

    /// Domain a worker on `core_id` allocates from.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::UnknownCpu`] if no domain lists the core.
    pub fn target_domain(&self, core_id: usize) -> Result<usize, RegionError> {
        let owning = self
            .topology
            .domain_of_cpu(core_id)
            .ok_or(RegionError::UnknownCpu { cpu: core_id })?;
        Ok(self.distance.target_node(owning))
    }

    /// Acquires the region of worker `worker_index` (its index within its
    /// domain) running on `core_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the core is unknown, the target node or device
    /// does not exist, or allocation, binding or mapping fails.
    pub fn acquire(&self, worker_index: usize, core_id: usize) -> Result<Region, RegionError> {
        let target = self.target_domain(core_id)?;
        let len = self.region_size;

        let region = match self.memory_type {
            MemoryType::Dram => Region {
                ptr: self.numa.alloc_on_node(target, len)?,
                len,
                placement: Placement::Dram { node: target },
            },
            MemoryType::Nvram => {
                let devices = self
                    .topology
                    .domain(target)
                    .map(|d| d.nvram.as_slice())
                    .unwrap_or_default();
                if devices.is_empty() {
                    return Err(RegionError::NoDevices { domain: target });
                }
                let slot = nvram_slot(worker_index, devices.len(), len).ok_or(
                    RegionError::OffsetOverflow {
                        worker_index,
                        region_size: len,
                    },
                )?;
                let device = &devices[slot.device_index];
                Region {
                    ptr: nvram::map_device(device, slot.offset, len)?,
                    len,
                    placement: Placement::Nvram {
                        device: device.clone(),
                        offset: slot.offset,
                    },
                }
            }
        };

        tracing::debug!(
            "Worker {} on CPU {} acquired {} bytes ({})",
            worker_index,
            core_id,
            len,
            region.placement
        );
        Ok(region)
    }

    /// Releases a region. The mapping is gone once this returns.
    pub fn release(&self, region: Region) {
        tracing::debug!("Releasing {} bytes ({})", region.len, region.placement);
        drop(region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Domain;

    fn two_domains() -> SystemTopology {
        SystemTopology::new(vec![
            Domain::new(vec![0, 1], vec![PathBuf::from("/dev/dax0.0")]),
            Domain::new(vec![2, 3], vec![PathBuf::from("/dev/dax1.0")]),
        ])
    }

    fn config(memory_type: MemoryType, distance: NumaDistance, topology: SystemTopology) -> BenchConfig {
        BenchConfig::builder()
            .memory_type(memory_type)
            .distance(distance)
            .region_size(64 * 1024)
            .chunk_size(64)
            .topology(topology)
            .build()
            .unwrap()
    }

    #[test]
    fn test_near_targets_own_domain() {
        let config = config(MemoryType::Dram, NumaDistance::Near, two_domains());
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(4));

        assert_eq!(allocator.target_domain(1).unwrap(), 0);
        assert_eq!(allocator.target_domain(3).unwrap(), 1);
    }

    #[test]
    fn test_far_targets_other_domain() {
        let config = config(MemoryType::Dram, NumaDistance::Far, two_domains());
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(4));

        assert_eq!(allocator.target_domain(0).unwrap(), 1);
        assert_eq!(allocator.target_domain(2).unwrap(), 0);
    }

    #[test]
    fn test_unknown_cpu() {
        let config = config(MemoryType::Dram, NumaDistance::Near, two_domains());
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(4));

        let err = allocator.acquire(0, 7).unwrap_err();
        assert!(matches!(err, RegionError::UnknownCpu { cpu: 7 }));
    }

    #[test]
    fn test_acquire_dram_region() {
        let topology = SystemTopology::new(vec![Domain::new(vec![0], vec![])]);
        let config = config(MemoryType::Dram, NumaDistance::Near, topology);
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(1));

        let mut region = allocator.acquire(0, 0).unwrap();
        assert_eq!(region.len(), 64 * 1024);
        assert_eq!(region.placement(), &Placement::Dram { node: 0 });

        region.as_mut_slice()[4095] = 7;
        assert_eq!(region.as_slice()[4095], 7);
        allocator.release(region);
    }

    #[test]
    fn test_far_dram_on_single_node_host_fails() {
        let config = config(MemoryType::Dram, NumaDistance::Far, two_domains());
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(4));

        let err = allocator.acquire(0, 0).unwrap_err();
        assert!(matches!(
            err,
            RegionError::Numa(crate::numa::NumaError::InvalidNode { node: 1, .. })
        ));
    }

    #[test]
    fn test_nvram_open_failure_names_device() {
        let dir = tempfile::tempdir().unwrap();
        let devices = vec![dir.path().join("dax0.0"), dir.path().join("dax0.1")];
        let topology = SystemTopology::new(vec![Domain::new(vec![0, 1], devices)]);
        let config = config(MemoryType::Nvram, NumaDistance::Near, topology);
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(2));

        // Second worker of the domain lands on the second device.
        match allocator.acquire(1, 1).unwrap_err() {
            RegionError::Open { path, .. } => assert!(path.ends_with("dax0.1")),
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn test_nvram_offset_overflow_is_reported() {
        let topology = SystemTopology::new(vec![Domain::new(vec![0], vec![PathBuf::from("/dev/dax0.0")])]);
        let config = BenchConfig::builder()
            .memory_type(MemoryType::Nvram)
            .region_size(1 << 40)
            .chunk_size(4096)
            .topology(topology)
            .build()
            .unwrap();
        let allocator = RegionAllocator::with_host(&config, &NumaTopology::single_node(1));

        let err = allocator.acquire(1 << 24, 0).unwrap_err();
        assert!(matches!(
            err,
            RegionError::OffsetOverflow { worker_index, .. } if worker_index == 1 << 24
        ));
    }

    #[test]
    fn test_anonymous_region_is_zeroed() {
        let region = Region::anonymous(8192).unwrap();
        assert_eq!(region.len(), 8192);
        assert!(!region.is_empty());
        assert!(region.as_slice().iter().all(|&b| b == 0));
        assert_eq!(region.placement().to_string(), "anonymous");
    }
}
