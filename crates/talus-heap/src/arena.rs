//! Arena: a contiguous mapped region carved into boundary-tag chunks.
//!
//! The region is split at the bump frontier: `[base, bump)` is tiled by
//! chunks, `[bump, end)` is untouched. Allocation first-fit-scans the free
//! list, then carves from the frontier. Free coalesces eagerly with both
//! neighbors and either retracts the frontier (when the merged chunk touches
//! it) or links the chunk at the free-list head.
//!
//! One mutex guards the free list, the frontier, and every chunk header not
//! exclusively owned by a thread cache.

use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::chunk::{
    CHUNK_ALIGN, Chunk, MIN_CHUNK, WORD, chunk_size_for, footer_is_free, footer_size,
};
use crate::error::{AllocError, AllocResult};
use crate::freelist::FreeList;
use crate::platform::Region;
use crate::utils::align_up;

struct ArenaState {
    /// First byte not yet carved. `base <= bump <= end`; equals `base` when
    /// the frontier is fully retracted.
    bump: usize,
    free: FreeList,
}

// SAFETY: the state only holds addresses into the arena's own region; all
// access goes through the arena mutex.
unsafe impl Send for ArenaState {}

/// A contiguous virtual-memory arena with a free list and a bump frontier.
///
/// Dropping an arena unmaps its region; registry-owned arenas live in a
/// process-wide static and are never dropped.
pub struct Arena {
    /// Backing mapping. `None` when the OS refused the mapping; such an
    /// arena is unusable and every allocation from it returns `None`.
    region: Option<Region>,
    base: *mut u8,
    base_addr: usize,
    end_addr: usize,
    state: Mutex<ArenaState>,
}

// SAFETY: `base`/`end_addr` are immutable after construction; every mutation
// of the region's contents happens under the state mutex (or on chunks a
// thread cache exclusively owns).
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Maps a fresh region of at least `region_size` bytes.
    pub fn new(region_size: usize) -> AllocResult<Arena> {
        let region = Region::map(region_size).map_err(|source| AllocError::MappingFailed {
            size: region_size,
            source,
        })?;

        let base = region.base();
        let base_addr = base as usize;
        let end_addr = base_addr + region.len();
        debug_assert!(crate::utils::is_aligned(base_addr, CHUNK_ALIGN));

        Ok(Arena {
            region: Some(region),
            base,
            base_addr,
            end_addr,
            state: Mutex::new(ArenaState {
                bump: base_addr,
                free: FreeList::new(),
            }),
        })
    }

    /// An arena whose mapping failed. Keeps its registry slot; every
    /// allocation returns `None`.
    pub(crate) fn unusable() -> Arena {
        Arena {
            region: None,
            base: std::ptr::null_mut(),
            base_addr: 0,
            end_addr: 0,
            state: Mutex::new(ArenaState {
                bump: 0,
                free: FreeList::new(),
            }),
        }
    }

    pub(crate) fn is_usable(&self) -> bool {
        self.region.is_some()
    }

    pub(crate) fn base_address(&self) -> usize {
        self.base_addr
    }

    /// Whether `ptr` lies inside this arena's mapped range.
    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.is_usable() && self.base_addr <= addr && addr < self.end_addr
    }

    /// Mapped capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.end_addr - self.base_addr
    }

    /// Bytes between `base` and the bump frontier. Zero when fully retracted.
    #[must_use]
    pub fn bump_offset(&self) -> usize {
        self.state.lock().bump - self.base_addr
    }

    /// Whether every chunk has been freed back into the untouched region.
    #[must_use]
    pub fn is_fully_retracted(&self) -> bool {
        self.state.lock().bump == self.base_addr
    }

    /// Number of chunks currently on the free list.
    #[must_use]
    pub fn free_list_len(&self) -> usize {
        let state = self.state.lock();
        // SAFETY: under the lock, every list node is a live free chunk.
        unsafe { state.free.len() }
    }

    /// Header address of the first chunk: the first position past `base`
    /// whose payload is 16-byte aligned.
    fn first_header_addr(&self) -> usize {
        align_up(self.base_addr + WORD, CHUNK_ALIGN) - WORD
    }

    /// Pointer into the region at `addr`, with provenance rooted in the
    /// original mapping.
    fn ptr_at(&self, addr: usize) -> *mut u8 {
        self.base.wrapping_add(addr - self.base_addr)
    }

    /// Allocates at least `size` payload bytes. Returns a 16-byte-aligned
    /// payload pointer, or `None` when `size` is zero or the arena cannot
    /// satisfy the request.
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        self.alloc_chunk(chunk_size_for(size)?)
    }

    /// Allocates a chunk of exactly `need` total bytes (multiple of 16,
    /// `>= MIN_CHUNK`) and returns its payload pointer.
    pub(crate) fn alloc_chunk(&self, need: usize) -> Option<NonNull<u8>> {
        if !self.is_usable() {
            return None;
        }
        debug_assert!(need >= MIN_CHUNK && need % CHUNK_ALIGN == 0);

        let mut state = self.state.lock();
        let chunk = self
            .try_free_list(&mut state, need)
            .or_else(|| self.carve_from_top(&mut state, need))?;
        NonNull::new(chunk.payload())
    }

    /// First-fit search; on a hit, split when the surplus can hold a minimal
    /// free chunk, otherwise hand out the whole chunk.
    fn try_free_list(&self, state: &mut ArenaState, need: usize) -> Option<Chunk> {
        // SAFETY: under the lock; list nodes are live free chunks tiling
        // `[base, bump)`.
        unsafe {
            let chunk = state.free.find_first_fit(need)?;
            let size = chunk.size();
            state.free.unlink(chunk);

            if size >= need + MIN_CHUNK {
                chunk.set_size_and_free(need, false);
                let remainder = chunk.next();
                // The in-use half is the remainder's left neighbor.
                remainder.init_header(size - need, true, true);
                remainder.write_footer();
                state.free.push(remainder);
            } else {
                chunk.set_size_and_free(size, false);
            }

            let right = chunk.next();
            if right.addr() < state.bump {
                right.set_prev_in_use(true);
            }
            Some(chunk)
        }
    }

    /// Extends the explored zone by one chunk. The frontier is only reached
    /// when coalescing produced nothing reusable, and no free chunk is ever
    /// adjacent to it, so the new chunk's left neighbor is always in use.
    /// PREV_IN_USE is set unconditionally; for the very first chunk this
    /// also suppresses any look left of `base`.
    fn carve_from_top(&self, state: &mut ArenaState, need: usize) -> Option<Chunk> {
        let payload = align_up(state.bump + WORD, CHUNK_ALIGN);
        let hdr = payload - WORD;
        if hdr.checked_add(need)? > self.end_addr {
            return None;
        }

        let chunk = Chunk::from_header(self.ptr_at(hdr));
        // SAFETY: `[hdr, hdr + need)` is inside the mapped region (checked
        // above) and above the current frontier, so nothing aliases it.
        unsafe { chunk.init_header(need, false, true) };
        state.bump = hdr + need;
        Some(chunk)
    }

    /// Releases the chunk owning `payload`.
    ///
    /// # Safety
    /// `payload` must have been returned by this arena's `alloc`/`alloc_chunk`
    /// and must not have been freed since.
    pub unsafe fn free(&self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        // SAFETY: per contract, `payload` is a live payload pointer.
        unsafe { self.free_chunk(Chunk::from_payload(payload)) };
    }

    /// Coalesces `chunk` with its free neighbors, then either retracts the
    /// frontier or links the result at the free-list head.
    ///
    /// # Safety
    /// `chunk` must be a live in-use chunk of this arena, not on any free
    /// list or thread cache.
    pub(crate) unsafe fn free_chunk(&self, chunk: Chunk) {
        let mut state = self.state.lock();
        // SAFETY: under the lock; the chunk and its neighbors tile the
        // explored zone, so every header/footer read below is in bounds.
        unsafe {
            let mut hdr = chunk;
            let mut size = hdr.size();

            // Right merge: at most once, since no two free chunks were
            // adjacent before this free.
            let right = hdr.next();
            if right.addr() < state.bump && right.is_free() {
                state.free.unlink(right);
                size += right.size();
            }

            // Left merge: PREV_IN_USE gates the footer read; the footer's
            // FREE bit is double-checked against a corrupted flag.
            if !hdr.prev_in_use() {
                let footer = hdr.prev_footer();
                if footer_is_free(footer) {
                    let left = Chunk::from_header(hdr.header_ptr().wrapping_sub(footer_size(footer)));
                    state.free.unlink(left);
                    size += footer_size(footer);
                    hdr = left;
                }
            }

            hdr.set_size_and_free(size, true);
            hdr.write_footer();

            if hdr.addr() + size == state.bump {
                // Absorb the chunk back into the untouched region instead of
                // linking it; the pad below the first header is reclaimed
                // with the first chunk.
                state.bump = if hdr.addr() == self.first_header_addr() {
                    self.base_addr
                } else {
                    hdr.addr()
                };
            } else {
                state.free.push(hdr);
                hdr.next().set_prev_in_use(false);
            }
        }
    }

    /// Walks the explored zone and checks every structural invariant: chunk
    /// sizes, flag consistency between neighbors, footers, free-list
    /// membership, frontier adjacency.
    pub fn validate(&self) -> AllocResult<()> {
        if !self.is_usable() {
            return Ok(());
        }

        let state = self.state.lock();
        if state.bump < self.base_addr || state.bump > self.end_addr {
            return Err(AllocError::Corruption("bump frontier out of bounds"));
        }
        if state.bump == self.base_addr {
            if state.free.is_empty() {
                return Ok(());
            }
            return Err(AllocError::Corruption(
                "free list non-empty in a fully retracted arena",
            ));
        }

        let mut addr = self.first_header_addr();
        let mut prev_free: Option<bool> = None;
        let mut free_seen = 0usize;

        while addr < state.bump {
            let chunk = Chunk::from_header(self.ptr_at(addr));
            // SAFETY: under the lock; `addr` stays within the explored zone
            // because each step advances by a validated chunk size.
            unsafe {
                let size = chunk.size();
                if size % CHUNK_ALIGN != 0 {
                    return Err(AllocError::Corruption("chunk size not a multiple of 16"));
                }
                if size < MIN_CHUNK {
                    return Err(AllocError::Corruption("chunk smaller than MIN_CHUNK"));
                }
                if addr + size > state.bump {
                    return Err(AllocError::Corruption("chunk overruns the bump frontier"));
                }

                let free = chunk.is_free();
                match prev_free {
                    None => {
                        if !chunk.prev_in_use() {
                            return Err(AllocError::Corruption(
                                "first chunk must carry PREV_IN_USE",
                            ));
                        }
                    }
                    Some(left_free) => {
                        if left_free && free {
                            return Err(AllocError::Corruption("two adjacent free chunks"));
                        }
                        if chunk.prev_in_use() == left_free {
                            return Err(AllocError::Corruption(
                                "PREV_IN_USE disagrees with left neighbor's FREE bit",
                            ));
                        }
                    }
                }

                if free {
                    let footer = chunk.next().prev_footer();
                    if !footer_is_free(footer) || footer_size(footer) != size {
                        return Err(AllocError::Corruption("footer does not replicate header"));
                    }
                    if !state.free.contains(chunk) {
                        return Err(AllocError::Corruption("free chunk missing from free list"));
                    }
                    free_seen += 1;
                }

                prev_free = Some(free);
                addr += size;
            }
        }

        if addr != state.bump {
            return Err(AllocError::Corruption(
                "last chunk does not end at the bump frontier",
            ));
        }
        if prev_free == Some(true) {
            return Err(AllocError::Corruption("free chunk adjacent to the frontier"));
        }
        // SAFETY: under the lock; list nodes are live free chunks.
        if free_seen != unsafe { state.free.len() } {
            return Err(AllocError::Corruption(
                "free list length disagrees with heap walk",
            ));
        }
        Ok(())
    }
}
