//! Doubly-linked LIFO free list threaded through free chunks.
//!
//! The list owns nothing: links live in the first two payload words of each
//! free chunk and are cleared on removal, then overwritten by the caller's
//! payload once the chunk is allocated.

use core::ptr;

use crate::chunk::Chunk;

pub(crate) struct FreeList {
    head: *mut u8,
}

impl FreeList {
    pub(crate) const fn new() -> FreeList {
        FreeList {
            head: ptr::null_mut(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Links `chunk` at the head.
    ///
    /// # Safety
    /// `chunk` must be a live free chunk not currently on any list.
    pub(crate) unsafe fn push(&mut self, chunk: Chunk) {
        // SAFETY: the chunk is free, so its link words may be written; the
        // old head (if any) is a live free chunk.
        unsafe {
            chunk.set_fd(self.head);
            chunk.set_bk(ptr::null_mut());
            if !self.head.is_null() {
                Chunk::from_header(self.head).set_bk(chunk.header_ptr());
            }
        }
        self.head = chunk.header_ptr();
    }

    /// Unlinks `chunk` in place and clears its link words.
    ///
    /// # Safety
    /// `chunk` must currently be on this list.
    pub(crate) unsafe fn unlink(&mut self, chunk: Chunk) {
        // SAFETY: membership guarantees live link words on the chunk and its
        // neighbors.
        unsafe {
            let fd = chunk.fd();
            let bk = chunk.bk();
            if bk.is_null() {
                self.head = fd;
            } else {
                Chunk::from_header(bk).set_fd(fd);
            }
            if !fd.is_null() {
                Chunk::from_header(fd).set_bk(bk);
            }
            chunk.set_fd(ptr::null_mut());
            chunk.set_bk(ptr::null_mut());
        }
    }

    /// First-fit scan from the head: the first chunk with `size >= need`.
    ///
    /// # Safety
    /// Every node on the list must be a live free chunk.
    pub(crate) unsafe fn find_first_fit(&self, need: usize) -> Option<Chunk> {
        let mut cur = self.head;
        while !cur.is_null() {
            let c = Chunk::from_header(cur);
            // SAFETY: list membership means a live header.
            unsafe {
                if c.size() >= need {
                    return Some(c);
                }
                cur = c.fd();
            }
        }
        None
    }

    /// Number of chunks on the list.
    ///
    /// # Safety
    /// Every node on the list must be a live free chunk.
    pub(crate) unsafe fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            n += 1;
            // SAFETY: list membership means live link words.
            cur = unsafe { Chunk::from_header(cur).fd() };
        }
        n
    }

    /// Whether `chunk` is a node of this list.
    ///
    /// # Safety
    /// Every node on the list must be a live free chunk.
    pub(crate) unsafe fn contains(&self, chunk: Chunk) -> bool {
        let mut cur = self.head;
        while !cur.is_null() {
            if cur == chunk.header_ptr() {
                return true;
            }
            // SAFETY: list membership means live link words.
            cur = unsafe { Chunk::from_header(cur).fd() };
        }
        false
    }
}

impl Default for FreeList {
    fn default() -> Self {
        FreeList::new()
    }
}
