use std::{fs::File, io, os::fd::AsRawFd, ptr::NonNull};

use tracing::warn;

use crate::error::Result;

/// A shared, writable `mmap(2)` of a file, unmapped on drop.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is only reachable through `&mut self` and the mapping
// is not tied to the thread that created it.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    pub fn map(file: &File, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot map zero bytes").into());
        }
        // SAFETY: a fresh mapping of `len` bytes of `file`; the kernel picks
        // the address and we check for MAP_FAILED before using it.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` is a live mapping of exactly `len` bytes and the
        // returned borrow keeps `self` exclusively borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the region created in `map`.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if rc != 0 {
            warn!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}
