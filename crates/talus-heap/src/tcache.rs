//! Per-thread chunk cache: the lock-free fast path in front of the arenas.
//!
//! Each thread owns an array of size-class bins; bin *i* stacks chunks whose
//! usable payload falls in `[16·(i+1), 16·(i+2))`, which for 16-aligned
//! chunk sizes means exactly the chunks of `16·(i+2)` total bytes. A cached
//! chunk is, from its arena's viewpoint, still in use: neither its FREE bit
//! nor its footer nor any neighbor's PREV_IN_USE is touched while it sits in
//! a bin. The stack link reuses the chunk's forward free-list slot.
//!
//! Chunks enter a bin on `free` (until the bin is full) and leave it on
//! `alloc` (pop) only; a full bin diverts the free to the arena path, which
//! performs the full coalesce-and-link dance.

use std::cell::RefCell;
use std::ptr;
use std::ptr::NonNull;

use crate::chunk::{CHUNK_ALIGN, Chunk};

/// Number of size-class bins per thread.
pub const TCACHE_BIN_COUNT: usize = 64;

/// Maximum chunks stacked per bin.
pub const TCACHE_MAX_COUNT: u32 = 32;

/// Bin index for a chunk of `chunk_size` total bytes, or `None` when the
/// size falls outside the cached classes.
#[inline]
#[must_use]
pub fn bin_index(chunk_size: usize) -> Option<usize> {
    debug_assert_eq!(chunk_size % CHUNK_ALIGN, 0);
    let index = (chunk_size / CHUNK_ALIGN).checked_sub(2)?;
    (index < TCACHE_BIN_COUNT).then_some(index)
}

#[derive(Clone, Copy)]
struct Bin {
    head: *mut u8,
    count: u32,
}

impl Bin {
    const EMPTY: Bin = Bin {
        head: ptr::null_mut(),
        count: 0,
    };
}

struct ThreadCache {
    bins: [Bin; TCACHE_BIN_COUNT],
}

impl ThreadCache {
    const fn new() -> ThreadCache {
        ThreadCache {
            bins: [Bin::EMPTY; TCACHE_BIN_COUNT],
        }
    }
}

thread_local! {
    // Zero-initialised on first access; no destructor, so chunks still
    // cached at thread exit are leaked (the arenas outlive every thread).
    static TCACHE: RefCell<ThreadCache> = const { RefCell::new(ThreadCache::new()) };
}

/// Pops a cached chunk of exactly `chunk_size` total bytes and returns its
/// payload pointer. No lock is taken.
pub(crate) fn pop(chunk_size: usize) -> Option<NonNull<u8>> {
    let index = bin_index(chunk_size)?;
    TCACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let bin = &mut cache.bins[index];
        let head = NonNull::new(bin.head)?;

        let chunk = Chunk::from_header(head.as_ptr());
        // SAFETY: chunks were pushed with live headers and their stack link
        // in the forward slot; this thread owns the bin exclusively.
        bin.head = unsafe { chunk.fd() };
        bin.count -= 1;
        NonNull::new(chunk.payload())
    })
}

/// Pushes `chunk` onto its bin's stack. Returns `false` when the chunk's
/// class is not cached or the bin is full; the caller must then take the
/// arena path.
///
/// # Safety
/// `chunk` must be a live in-use chunk whose payload the caller has
/// relinquished, not on any free list or other cache.
pub(crate) unsafe fn push(chunk: Chunk) -> bool {
    // SAFETY: per contract, the header is live.
    let Some(index) = bin_index(unsafe { chunk.size() }) else {
        return false;
    };
    TCACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let bin = &mut cache.bins[index];
        if bin.count >= TCACHE_MAX_COUNT {
            return false;
        }
        // SAFETY: the payload is dead, so the link slot may be overwritten.
        unsafe { chunk.set_fd(bin.head) };
        bin.head = chunk.header_ptr();
        bin.count += 1;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_index_maps_sixteen_byte_classes() {
        assert_eq!(bin_index(32), Some(0)); // 24 usable bytes
        assert_eq!(bin_index(48), Some(1));
        assert_eq!(bin_index(1040), Some(63)); // largest cached class
        assert_eq!(bin_index(1056), None);
        assert_eq!(bin_index(16), None);
    }

    #[test]
    fn push_pop_is_lifo_per_class() {
        #[repr(align(16))]
        struct AlignedBuf([u8; 256]);
        let mut buf = AlignedBuf([0; 256]);

        let a = Chunk::from_header(buf.0.as_mut_ptr().wrapping_add(8));
        let b = Chunk::from_header(buf.0.as_mut_ptr().wrapping_add(88));

        unsafe {
            a.init_header(48, false, true);
            b.init_header(48, false, true);
            assert!(push(a));
            assert!(push(b));
        }

        assert_eq!(pop(48), NonNull::new(b.payload()));
        assert_eq!(pop(48), NonNull::new(a.payload()));
        assert_eq!(pop(48), None);
        // Other classes are untouched.
        assert_eq!(pop(32), None);
    }
}
