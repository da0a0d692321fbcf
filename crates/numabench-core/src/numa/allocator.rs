//! # Node-Local Allocator
//!
//! Allocates anonymous memory bound to one NUMA node using raw libc
//! syscalls (`mmap` + `mbind`) instead of depending on libnuma.

use std::ptr::{self, NonNull};

use super::{NumaError, NumaTopology};

// MPOL_BIND = 2 - strictly bind to the specified nodes
const MPOL_BIND: i32 = 2;
// MPOL_MF_MOVE = 2 - move pages to the node if they're already faulted
const MPOL_MF_MOVE: u32 = 2;
const MAX_NODE_BITS: usize = 64;

/// NUMA-aware memory allocator.
///
/// Binding is only attempted on multi-node hosts; on a single-node host
/// every allocation is trivially node-local.
#[derive(Debug, Clone)]
pub struct NumaAllocator {
    topology: NumaTopology,
}

impl NumaAllocator {
    /// Creates an allocator for the given host topology.
    #[must_use]
    pub fn new(topology: &NumaTopology) -> Self {
        Self {
            topology: topology.clone(),
        }
    }

    /// Allocates `size` bytes bound to `node`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist, the mapping fails, or
    /// the pages cannot be bound to the node.
    pub fn alloc_on_node(&self, node: usize, size: usize) -> Result<NonNull<u8>, NumaError> {
        let available = self.topology.num_nodes();
        if node >= available || node >= MAX_NODE_BITS {
            return Err(NumaError::InvalidNode { node, available });
        }

        let ptr = Self::mmap_anonymous(size)?;

        if self.topology.is_numa() {
            if let Err(e) = Self::bind_to_node(ptr, size, node) {
                // SAFETY: ptr/size come from the mmap above and are not shared yet
                unsafe { Self::dealloc(ptr, size) };
                return Err(e);
            }
        }

        Ok(ptr)
    }

    /// Releases memory returned by [`alloc_on_node`](Self::alloc_on_node).
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with the same `size` and must not
    /// be used afterwards.
    pub unsafe fn dealloc(ptr: NonNull<u8>, size: usize) {
        #[cfg(unix)]
        {
            libc::munmap(ptr.as_ptr().cast(), size);
        }

        #[cfg(not(unix))]
        {
            let _ = (ptr, size);
        }
    }

    /// Maps `size` bytes of private anonymous memory.
    #[cfg(unix)]
    fn mmap_anonymous(size: usize) -> Result<NonNull<u8>, NumaError> {
        // SAFETY: anonymous private mapping with no address hint
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(NumaError::AllocationFailed {
                size,
                source: std::io::Error::last_os_error(),
            });
        }

        NonNull::new(ptr.cast()).ok_or_else(|| NumaError::AllocationFailed {
            size,
            source: std::io::Error::from(std::io::ErrorKind::OutOfMemory),
        })
    }

    #[cfg(not(unix))]
    fn mmap_anonymous(size: usize) -> Result<NonNull<u8>, NumaError> {
        Err(NumaError::AllocationFailed {
            size,
            source: std::io::Error::from(std::io::ErrorKind::Unsupported),
        })
    }

    /// Binds a mapping to `node` using the mbind syscall.
    #[cfg(target_os = "linux")]
    fn bind_to_node(ptr: NonNull<u8>, size: usize, node: usize) -> Result<(), NumaError> {
        let nodemask: u64 = 1u64 << node;

        // SAFETY: the range is a live mapping owned by the caller and the
        // nodemask outlives the call
        let result = unsafe {
            libc::syscall(
                libc::SYS_mbind,
                ptr.as_ptr(),
                size,
                MPOL_BIND,
                &raw const nodemask,
                MAX_NODE_BITS,
                MPOL_MF_MOVE,
            )
        };

        if result < 0 {
            return Err(NumaError::BindFailed {
                node,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn bind_to_node(_ptr: NonNull<u8>, _size: usize, node: usize) -> Result<(), NumaError> {
        tracing::warn!("NUMA binding unsupported on this platform, node {node} not enforced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_on_node_zero() {
        let allocator = NumaAllocator::new(&NumaTopology::detect());

        let ptr = allocator.alloc_on_node(0, 4096).unwrap();
        // SAFETY: fresh 4096-byte mapping
        unsafe {
            ptr.as_ptr().write(42);
            assert_eq!(ptr.as_ptr().read(), 42);
            NumaAllocator::dealloc(ptr, 4096);
        }
    }

    #[test]
    fn test_alloc_invalid_node() {
        let allocator = NumaAllocator::new(&NumaTopology::single_node(2));

        let err = allocator.alloc_on_node(1, 4096).unwrap_err();
        assert!(matches!(
            err,
            NumaError::InvalidNode {
                node: 1,
                available: 1
            }
        ));
    }

    #[test]
    fn test_single_node_skips_binding() {
        let allocator = NumaAllocator::new(&NumaTopology::single_node(1));

        let ptr = allocator.alloc_on_node(0, 64 * 1024).unwrap();
        // SAFETY: fresh 64 KiB mapping
        unsafe { NumaAllocator::dealloc(ptr, 64 * 1024) };
    }
}
