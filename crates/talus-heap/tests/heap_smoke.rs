//! Smoke tests for the public `alloc`/`free` entry points.

use talus_heap::{DEFAULT_REGION_SIZE, HeapConfig, TCACHE_MAX_COUNT, alloc, free};

#[test]
fn zero_size_returns_null() {
    assert!(alloc(0).is_null());
}

#[test]
fn absurd_size_returns_null() {
    assert!(alloc(usize::MAX - 7).is_null());
}

#[test]
fn pattern_survives_until_free() {
    let p = alloc(64);
    assert!(!p.is_null());

    unsafe {
        std::ptr::write_bytes(p, 0xAB, 64);
        for i in 0..64 {
            assert_eq!(*p.add(i), 0xAB, "byte {i} corrupted");
        }
        free(p);
    }
}

#[test]
fn pointers_are_sixteen_aligned() {
    for size in [1, 8, 15, 16, 17, 64, 255, 1000, 4096] {
        let p = alloc(size);
        assert!(!p.is_null(), "size {size}");
        assert_eq!(p as usize % 16, 0, "size {size}");
        unsafe { free(p) };
    }
}

#[test]
fn payload_holds_at_least_requested_bytes() {
    for size in [1, 24, 100, 512, 2048] {
        let p = alloc(size);
        assert!(!p.is_null());
        unsafe {
            // Touch the first and last byte of the requested range.
            *p = 0x5A;
            *p.add(size - 1) = 0xA5;
            assert_eq!(*p, 0x5A);
            assert_eq!(*p.add(size - 1), 0xA5);
            free(p);
        }
    }
}

#[test]
fn small_chunk_is_reused_immediately() {
    // alloc/free/alloc of the same small size must hand back the same
    // pointer: the free lands on the thread cache (or the free-list head)
    // and the next request pops it.
    let first = alloc(24);
    assert!(!first.is_null());
    unsafe { free(first) };

    let second = alloc(24);
    assert_eq!(second, first);
    unsafe { free(second) };
}

#[test]
fn live_allocations_never_overlap() {
    const COUNT: usize = 1000;
    let sizes = [16usize, 32, 64, 128, 256, 512, 1024];

    let mut live: Vec<(usize, usize)> = Vec::with_capacity(COUNT);
    let mut ptrs = Vec::with_capacity(COUNT);

    for i in 0..COUNT {
        let size = sizes[i % sizes.len()];
        let p = alloc(size);
        assert!(!p.is_null());
        live.push((p as usize, size));
        ptrs.push(p);
    }

    live.sort_unstable();
    for pair in live.windows(2) {
        let (start_a, size_a) = pair[0];
        let (start_b, _) = pair[1];
        assert!(start_a + size_a <= start_b, "allocations overlap");
    }

    for p in ptrs {
        unsafe { free(p) };
    }
}

#[test]
fn overfull_cache_diverts_to_the_arena_and_back() {
    // More frees of one class than a cache bin can hold: the overflow takes
    // the arena path, and all of it is reusable afterwards.
    const EXTRA: usize = 8;
    let count = TCACHE_MAX_COUNT as usize + EXTRA;

    let ptrs: Vec<*mut u8> = (0..count)
        .map(|_| {
            let p = alloc(48);
            assert!(!p.is_null());
            p
        })
        .collect();

    for &p in &ptrs {
        unsafe { free(p) };
    }

    for _ in 0..count {
        let p = alloc(48);
        assert!(!p.is_null());
        unsafe {
            std::ptr::write_bytes(p, 0x7C, 48);
            free(p);
        }
    }
}

#[test]
fn default_config_matches_region_constant() {
    assert_eq!(HeapConfig::default().region_size, DEFAULT_REGION_SIZE);
    assert!(HeapConfig::default().arena_count.is_none());
}

#[test]
fn distinct_size_classes_round_trip() {
    let mut ptrs = Vec::new();
    for size in (16..=1024).step_by(16) {
        let p = alloc(size);
        assert!(!p.is_null());
        unsafe { std::ptr::write_bytes(p, (size % 251) as u8, size) };
        ptrs.push((p, size));
    }
    for (p, size) in ptrs {
        unsafe {
            assert_eq!(*p, (size % 251) as u8);
            assert_eq!(*p.add(size - 1), (size % 251) as u8);
            free(p);
        }
    }
}
