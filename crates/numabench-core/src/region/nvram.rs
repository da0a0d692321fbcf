//! Synchronous shared mappings of NVRAM (DAX) devices.
//!
//! Mapped with `MAP_SHARED_VALIDATE | MAP_SYNC` so the kernel refuses the
//! mapping unless stores reach persistent media without page-cache
//! write-back. The device file is closed once the mapping exists.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::ptr::NonNull;

use super::RegionError;

/// Maps `len` bytes of the device at `path` starting at `offset`.
///
/// # Errors
///
/// Returns [`RegionError::Open`] if the device cannot be opened read/write and
/// [`RegionError::Map`] if the kernel rejects the mapping.
pub(crate) fn map_device(path: &Path, offset: u64, len: usize) -> Result<NonNull<u8>, RegionError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| RegionError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    map_shared_sync(&file, offset, len).map_err(|source| RegionError::Map {
        path: path.to_path_buf(),
        offset,
        source,
    })
}

#[cfg(target_os = "linux")]
fn map_shared_sync(file: &std::fs::File, offset: u64, len: usize) -> io::Result<NonNull<u8>> {
    use std::os::fd::AsRawFd;

    let offset = libc::off_t::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds off_t"))?;

    // SAFETY: fresh shared mapping of an open descriptor with no address hint
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED_VALIDATE | libc::MAP_SYNC,
            file.as_raw_fd(),
            offset,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

#[cfg(not(target_os = "linux"))]
fn map_shared_sync(_file: &std::fs::File, _offset: u64, _len: usize) -> io::Result<NonNull<u8>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "MAP_SYNC mappings require Linux",
    ))
}
