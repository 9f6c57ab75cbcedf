//! # talus-heap
//!
//! A user-space heap allocator in the `malloc`/`free` mold: large anonymous
//! mappings are carved into boundary-tag chunks, freed chunks coalesce
//! eagerly through header/footer tags, and a per-thread cache of small
//! size classes keeps the common case entirely lock-free.
//!
//! # Architecture
//!
//! - [`chunk`]: the on-heap record, a header word packing size with the
//!   FREE and PREV_IN_USE bits, plus footer and link words while free
//! - [`arena`]: a contiguous mapped region with a bump frontier, a
//!   first-fit LIFO free list, eager two-sided coalescing, and frontier
//!   retraction, all under one mutex
//! - the tcache (internal): per-thread, per-size-class chunk stacks that
//!   bypass the arena entirely on hits
//! - the registry (internal): a fixed table of arenas sized to the hardware
//!   parallelism, with threads pinned by thread-id hash and frees routed to
//!   the arena whose mapped range contains the pointer
//!
//! # Examples
//!
//! ```
//! let p = talus_heap::alloc(64);
//! assert!(!p.is_null());
//! assert_eq!(p as usize % 16, 0);
//!
//! unsafe {
//!     std::ptr::write_bytes(p, 0xAB, 64);
//!     assert_eq!(*p.add(63), 0xAB);
//!     talus_heap::free(p);
//! }
//! ```

pub mod arena;
pub mod chunk;
pub mod config;
pub mod error;
pub mod platform;
pub mod utils;

mod freelist;
mod registry;
mod tcache;

pub use arena::Arena;
pub use config::{DEFAULT_REGION_SIZE, HeapConfig, SINGLE_ARENA_REGION_SIZE};
pub use error::{AllocError, AllocResult};
pub use registry::{MAX_ARENAS, configure};
pub use tcache::{TCACHE_BIN_COUNT, TCACHE_MAX_COUNT};

use chunk::Chunk;
use registry::Registry;

/// Allocates at least `size` bytes and returns a 16-byte-aligned payload
/// pointer, or null when `size` is zero or the backing arena cannot satisfy
/// the request.
///
/// The pointer remains valid until passed to [`free`]. Safe to call from any
/// number of threads concurrently.
#[must_use]
pub fn alloc(size: usize) -> *mut u8 {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let Some(need) = chunk::chunk_size_for(size) else {
        return std::ptr::null_mut();
    };

    if let Some(payload) = tcache::pop(need) {
        return payload.as_ptr();
    }

    let arena = Registry::global().arena_for_current_thread();
    match arena.alloc_chunk(need) {
        Some(payload) => payload.as_ptr(),
        None => std::ptr::null_mut(),
    }
}

/// Releases a pointer previously returned by [`alloc`]. Null is a no-op.
///
/// The chunk first tries the current thread's cache; on overflow (or for
/// sizes outside the cached classes) it is returned to the arena whose
/// mapped range contains it, so cross-thread frees land in the right arena.
///
/// # Safety
/// `ptr` must be null or a pointer returned by [`alloc`] that has not been
/// freed since. Passing any other pointer is undefined behavior.
pub unsafe fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: per contract, `ptr` is a live payload pointer.
    let chunk = unsafe { Chunk::from_payload(ptr) };
    // SAFETY: the caller relinquished the payload.
    if unsafe { tcache::push(chunk) } {
        return;
    }

    let Some(arena) = Registry::global().arena_containing(ptr) else {
        debug_assert!(false, "free of a pointer not owned by any arena");
        return;
    };
    // SAFETY: the chunk belongs to `arena` and is in use from its viewpoint.
    unsafe { arena.free_chunk(chunk) };
}
