//! OS-level region mapping for arenas.
//!
//! Arenas are backed by anonymous, private, read/write mappings obtained
//! directly from the OS rather than through the global allocator.
//!
//! # Safety
//!
//! The mapping functions perform unsafe FFI calls to OS primitives:
//! - **Unix**: libc `mmap`/`munmap`
//! - **Fallback**: `std::alloc` for unsupported platforms
//!
//! Callers must ensure a region is unmapped at most once and never accessed
//! after unmapping. [`Region`] enforces both through ownership.

use std::io;
use std::ptr::NonNull;

use crate::utils::{align_up, page_size};

/// An owned, page-aligned, read/write memory region.
///
/// The region is unmapped when dropped. Registry-owned regions live in a
/// process-wide static and are therefore never dropped.
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is a plain range of mapped bytes; all synchronization of
// access to its contents is the caller's concern (the arena lock).
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Maps a fresh anonymous region of at least `size` bytes, rounded up to
    /// a multiple of the page size.
    pub fn map(size: usize) -> io::Result<Region> {
        let len = align_up(size, page_size());
        let ptr = map_pages(len)?;
        Ok(Region { ptr, len })
    }

    /// Start of the mapped range. Page-aligned.
    #[inline]
    #[must_use]
    pub fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Mapped length in bytes (a multiple of the page size).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // Nothing sensible to do with an munmap failure at this point.
        let _ = unmap_pages(self.ptr.as_ptr(), self.len);
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn map_pages(len: usize) -> io::Result<NonNull<u8>> {
            use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

            // SAFETY: FFI call to mmap for an anonymous private mapping:
            // addr=null lets the OS choose, fd=-1/offset=0 mean no file. The
            // OS validates the parameters and returns MAP_FAILED on error.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    PROT_READ | PROT_WRITE,
                    MAP_PRIVATE | MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };

            if ptr == MAP_FAILED {
                Err(io::Error::last_os_error())
            } else {
                NonNull::new(ptr.cast::<u8>())
                    .ok_or_else(|| io::Error::other("mmap returned a null mapping"))
            }
        }

        fn unmap_pages(ptr: *mut u8, len: usize) -> io::Result<()> {
            // SAFETY: FFI call to munmap; `ptr`/`len` come from a prior
            // successful `map_pages` and Region ownership guarantees a
            // single unmap.
            let rc = unsafe { libc::munmap(ptr.cast::<libc::c_void>(), len) };
            if rc == -1 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    } else {
        fn map_pages(len: usize) -> io::Result<NonNull<u8>> {
            let layout = std::alloc::Layout::from_size_align(len, page_size())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            // SAFETY: layout is valid (checked above) and non-zero.
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
        }

        fn unmap_pages(ptr: *mut u8, len: usize) -> io::Result<()> {
            let layout = std::alloc::Layout::from_size_align(len, page_size())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            // SAFETY: `ptr`/`layout` match the allocation in `map_pages`.
            unsafe { std::alloc::dealloc(ptr, layout) };
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_aligned_ptr;

    #[test]
    fn map_rounds_to_page_size() {
        let region = Region::map(1).expect("mapping one byte");
        assert_eq!(region.len(), page_size());
        assert!(!region.is_empty());
    }

    #[test]
    fn mapped_region_is_writable() {
        let region = Region::map(64 * 1024).expect("mapping 64 KiB");
        assert!(is_aligned_ptr(region.base(), 16));

        // SAFETY: the region is freshly mapped, read/write, and at least
        // 64 KiB long.
        unsafe {
            std::ptr::write_bytes(region.base(), 0xA5, 64 * 1024);
            assert_eq!(*region.base(), 0xA5);
            assert_eq!(*region.base().add(64 * 1024 - 1), 0xA5);
        }
    }
}
