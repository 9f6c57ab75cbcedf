//! On-heap chunk format and header arithmetic.
//!
//! A chunk is a contiguous byte range `[hdr, hdr + size)`. The first word is
//! the header: the low four bits are reserved for flags, the upper bits hold
//! the chunk size (always a multiple of 16). An in-use chunk is header plus
//! payload; a free chunk reuses the first two payload words as free-list
//! links and replicates `size | FREE` in a footer word at its tail so the
//! right neighbor can coalesce leftwards without knowing the chunk's start.
//!
//! The same bytes are deliberately read as either `{header, payload…}` or
//! `{header, fd, bk, …, footer}` depending on the chunk's state. [`Chunk`] is
//! therefore a thin handle over the header address with offset-based readers
//! and writers; no typed view is ever held across a state transition.

use core::ptr;

/// Size of a header, footer, or link word.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Alignment of chunk sizes and payload pointers.
pub const CHUNK_ALIGN: usize = 16;

/// Smallest chunk that can hold a free record: two link words plus header
/// plus footer, rounded up to [`CHUNK_ALIGN`].
pub const MIN_CHUNK: usize = 32;

/// Header bit: the chunk is on a free list.
const FREE: usize = 1 << 0;
/// Header bit: the chunk immediately to the left is in use (or this chunk is
/// the first chunk of its arena).
const PREV_IN_USE: usize = 1 << 1;

const FLAG_BITS: usize = 0xF;
const SIZE_MASK: usize = !FLAG_BITS;

/// Total chunk size needed to serve a `request`-byte allocation: the aligned
/// payload plus one header word, rounded up to [`CHUNK_ALIGN`]. Returns
/// `None` on arithmetic overflow.
#[inline]
#[must_use]
pub fn chunk_size_for(request: usize) -> Option<usize> {
    let payload = request.checked_add(CHUNK_ALIGN - 1)? & !(CHUNK_ALIGN - 1);
    // align16(WORD + payload): the header word rounds up to a full 16 bytes.
    let total = payload.checked_add(CHUNK_ALIGN)?;
    Some(total.max(MIN_CHUNK))
}

/// Whether a footer word carries the FREE bit.
#[inline]
#[must_use]
pub fn footer_is_free(word: usize) -> bool {
    word & FREE != 0
}

/// The size encoded in a footer word. The footer's PREV_IN_USE bit is not
/// maintained and must be ignored.
#[inline]
#[must_use]
pub fn footer_size(word: usize) -> usize {
    word & SIZE_MASK
}

/// Handle over a chunk header. Copyable and state-free: every accessor reads
/// the heap directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Chunk {
    hdr: *mut u8,
}

impl Chunk {
    /// Handle for the chunk whose header is at `hdr`.
    #[inline]
    #[must_use]
    pub fn from_header(hdr: *mut u8) -> Chunk {
        Chunk { hdr }
    }

    /// Handle for the chunk owning `payload`.
    ///
    /// # Safety
    /// `payload` must be a payload pointer previously produced by this
    /// allocator, i.e. one word past a live chunk header.
    #[inline]
    #[must_use]
    pub unsafe fn from_payload(payload: *mut u8) -> Chunk {
        Chunk {
            hdr: payload.wrapping_sub(WORD),
        }
    }

    /// The header address.
    #[inline]
    #[must_use]
    pub fn header_ptr(self) -> *mut u8 {
        self.hdr
    }

    /// The header address as an integer.
    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.hdr as usize
    }

    /// The payload address (one word past the header). 16-byte aligned for
    /// every chunk carved by the arena.
    #[inline]
    #[must_use]
    pub fn payload(self) -> *mut u8 {
        self.hdr.wrapping_add(WORD)
    }

    #[inline]
    unsafe fn word(self) -> usize {
        // SAFETY: caller guarantees `hdr` addresses a live header word.
        unsafe { ptr::read(self.hdr.cast::<usize>()) }
    }

    /// The chunk size in bytes (low flag bits masked off).
    ///
    /// # Safety
    /// The handle must address a live chunk header.
    #[inline]
    #[must_use]
    pub unsafe fn size(self) -> usize {
        (unsafe { self.word() }) & SIZE_MASK
    }

    /// Whether the FREE bit is set.
    ///
    /// # Safety
    /// The handle must address a live chunk header.
    #[inline]
    #[must_use]
    pub unsafe fn is_free(self) -> bool {
        (unsafe { self.word() }) & FREE != 0
    }

    /// Whether the PREV_IN_USE bit is set.
    ///
    /// # Safety
    /// The handle must address a live chunk header.
    #[inline]
    #[must_use]
    pub unsafe fn prev_in_use(self) -> bool {
        (unsafe { self.word() }) & PREV_IN_USE != 0
    }

    /// Rewrites the size-and-FREE portion of the header, preserving the
    /// current PREV_IN_USE bit.
    ///
    /// # Safety
    /// The handle must address a live chunk header and `size` bytes from it
    /// must belong to this chunk.
    #[inline]
    pub unsafe fn set_size_and_free(self, size: usize, free: bool) {
        debug_assert_eq!(size & FLAG_BITS, 0);
        // SAFETY: per contract, the header word is live.
        let keep = unsafe { self.word() } & PREV_IN_USE;
        let word = size | keep | if free { FREE } else { 0 };
        unsafe { ptr::write(self.hdr.cast::<usize>(), word) };
    }

    /// Writes a complete fresh header. Used where the previous word content
    /// is garbage (carving at the frontier, creating a split remainder).
    ///
    /// # Safety
    /// `[hdr, hdr + size)` must lie inside the arena's mapped region.
    #[inline]
    pub unsafe fn init_header(self, size: usize, free: bool, prev_in_use: bool) {
        debug_assert_eq!(size & FLAG_BITS, 0);
        let word = size
            | if free { FREE } else { 0 }
            | if prev_in_use { PREV_IN_USE } else { 0 };
        // SAFETY: per contract, the word lies in mapped, writable memory.
        unsafe { ptr::write(self.hdr.cast::<usize>(), word) };
    }

    /// Sets or clears the PREV_IN_USE bit, leaving size and FREE untouched.
    ///
    /// # Safety
    /// The handle must address a live chunk header.
    #[inline]
    pub unsafe fn set_prev_in_use(self, value: bool) {
        // SAFETY: per contract, the header word is live.
        let word = unsafe { self.word() };
        let word = if value {
            word | PREV_IN_USE
        } else {
            word & !PREV_IN_USE
        };
        unsafe { ptr::write(self.hdr.cast::<usize>(), word) };
    }

    /// The chunk immediately to the right (`hdr + size`). Only meaningful
    /// while that address is below the arena's bump frontier.
    ///
    /// # Safety
    /// The handle must address a live chunk header.
    #[inline]
    #[must_use]
    pub unsafe fn next(self) -> Chunk {
        let size = unsafe { self.size() };
        Chunk {
            hdr: self.hdr.wrapping_add(size),
        }
    }

    /// Replicates `size | FREE` into the footer slot at `hdr + size - WORD`.
    /// Only written while the chunk is free.
    ///
    /// # Safety
    /// The handle must address a live chunk header and the full chunk range
    /// must be mapped.
    #[inline]
    pub unsafe fn write_footer(self) {
        // SAFETY: per contract, the chunk range is live and writable.
        unsafe {
            let size = self.size();
            let slot = self.hdr.add(size - WORD).cast::<usize>();
            ptr::write(slot, size | FREE);
        }
    }

    /// Reads the word immediately before this header: the left neighbor's
    /// footer when that neighbor is free.
    ///
    /// # Safety
    /// The chunk must not be the first chunk of its arena (check
    /// PREV_IN_USE first; it suppresses any look left of the arena base).
    #[inline]
    #[must_use]
    pub unsafe fn prev_footer(self) -> usize {
        // SAFETY: per contract, the preceding word belongs to the left
        // neighbor's chunk range and is mapped.
        unsafe { ptr::read(self.hdr.sub(WORD).cast::<usize>()) }
    }

    /// Forward free-list link, stored in the first payload word. Null when
    /// this is the list tail.
    ///
    /// # Safety
    /// The chunk must currently carry free-list links (on a free list or a
    /// tcache bin).
    #[inline]
    #[must_use]
    pub unsafe fn fd(self) -> *mut u8 {
        // SAFETY: per contract, the link word is live.
        unsafe { ptr::read(self.hdr.add(WORD).cast::<*mut u8>()) }
    }

    /// Backward free-list link, stored in the second payload word. Null when
    /// this is the list head.
    ///
    /// # Safety
    /// The chunk must currently carry free-list links.
    #[inline]
    #[must_use]
    pub unsafe fn bk(self) -> *mut u8 {
        // SAFETY: per contract, the link word is live.
        unsafe { ptr::read(self.hdr.add(2 * WORD).cast::<*mut u8>()) }
    }

    /// # Safety
    /// The chunk's payload must be dead (free or tcache-owned): the link
    /// word aliases caller payload bytes otherwise.
    #[inline]
    pub unsafe fn set_fd(self, fd: *mut u8) {
        // SAFETY: per contract, the link word may be overwritten.
        unsafe { ptr::write(self.hdr.add(WORD).cast::<*mut u8>(), fd) };
    }

    /// # Safety
    /// The chunk's payload must be dead (free or tcache-owned).
    #[inline]
    pub unsafe fn set_bk(self, bk: *mut u8) {
        // SAFETY: per contract, the link word may be overwritten.
        unsafe { ptr::write(self.hdr.add(2 * WORD).cast::<*mut u8>(), bk) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(16))]
    struct AlignedBuf([u8; 256]);

    impl AlignedBuf {
        fn new() -> Self {
            AlignedBuf([0; 256])
        }

        fn chunk_at(&mut self, offset: usize) -> Chunk {
            Chunk::from_header(self.0.as_mut_ptr().wrapping_add(offset))
        }
    }

    #[test]
    fn chunk_size_for_rounds_up() {
        assert_eq!(chunk_size_for(1), Some(32));
        assert_eq!(chunk_size_for(16), Some(32));
        assert_eq!(chunk_size_for(17), Some(48));
        assert_eq!(chunk_size_for(24), Some(48));
        assert_eq!(chunk_size_for(64), Some(80));
        assert_eq!(chunk_size_for(1024), Some(1040));
        assert_eq!(chunk_size_for(usize::MAX - 4), None);
    }

    #[test]
    fn header_round_trip() {
        let mut buf = AlignedBuf::new();
        let c = buf.chunk_at(8);

        unsafe {
            c.init_header(48, false, true);
            assert_eq!(c.size(), 48);
            assert!(!c.is_free());
            assert!(c.prev_in_use());

            // Rewriting size+FREE keeps PREV_IN_USE.
            c.set_size_and_free(96, true);
            assert_eq!(c.size(), 96);
            assert!(c.is_free());
            assert!(c.prev_in_use());

            c.set_prev_in_use(false);
            assert!(!c.prev_in_use());
            assert_eq!(c.size(), 96);
            assert!(c.is_free());
        }
    }

    #[test]
    fn footer_replicates_size_and_free() {
        let mut buf = AlignedBuf::new();
        let c = buf.chunk_at(8);

        unsafe {
            c.init_header(64, true, true);
            c.write_footer();

            let footer = c.next().prev_footer();
            assert!(footer_is_free(footer));
            assert_eq!(footer_size(footer), 64);
        }
    }

    #[test]
    fn payload_is_one_word_past_header() {
        let mut buf = AlignedBuf::new();
        let c = buf.chunk_at(8);
        assert_eq!(c.payload() as usize, c.addr() + WORD);
        assert_eq!(unsafe { Chunk::from_payload(c.payload()) }, c);
    }

    #[test]
    fn links_round_trip() {
        let mut buf = AlignedBuf::new();
        let a = buf.chunk_at(8);
        let b_hdr = buf.0.as_mut_ptr().wrapping_add(72);

        unsafe {
            a.init_header(64, true, true);
            a.set_fd(b_hdr);
            a.set_bk(core::ptr::null_mut());
            assert_eq!(a.fd(), b_hdr);
            assert!(a.bk().is_null());
        }
    }
}
