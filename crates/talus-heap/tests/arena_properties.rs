//! Randomized alloc/free sequences against a standalone arena, with the
//! full structural walk (`Arena::validate`) run between steps.

use proptest::prelude::*;

use talus_heap::Arena;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    /// Free the live allocation at `index % live.len()`.
    Free(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..2048).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_churn_preserves_heap_invariants(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();
        let mut live: Vec<(std::ptr::NonNull<u8>, usize, u8)> = Vec::new();
        let mut stamp: u8 = 0;

        for (step, op) in ops.iter().enumerate() {
            match *op {
                Op::Alloc(size) => {
                    let p = arena.alloc(size).expect("arena unexpectedly exhausted");
                    stamp = stamp.wrapping_add(1).max(1);
                    // Fill the payload; corruption of neighbors shows up on
                    // their later verification.
                    unsafe { std::ptr::write_bytes(p.as_ptr(), stamp, size) };
                    live.push((p, size, stamp));
                }
                Op::Free(raw) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (p, size, fill) = live.swap_remove(raw % live.len());
                    unsafe {
                        for offset in [0, size / 2, size - 1] {
                            prop_assert_eq!(*p.as_ptr().add(offset), fill, "step {}", step);
                        }
                        arena.free(p.as_ptr());
                    }
                }
            }

            if step % 16 == 0 {
                arena.validate().unwrap();
            }
        }

        // Survivors still hold their fill pattern.
        for &(p, size, fill) in &live {
            unsafe {
                prop_assert_eq!(*p.as_ptr(), fill);
                prop_assert_eq!(*p.as_ptr().add(size - 1), fill);
            }
        }

        for (p, _, _) in live.drain(..) {
            unsafe { arena.free(p.as_ptr()) };
        }
        prop_assert!(arena.is_fully_retracted());
        arena.validate().unwrap();
    }

    #[test]
    fn alloc_results_are_aligned_and_disjoint(sizes in prop::collection::vec(1usize..1024, 1..100)) {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut ptrs = Vec::new();
        for &size in &sizes {
            let p = arena.alloc(size).unwrap();
            prop_assert_eq!(p.as_ptr() as usize % 16, 0);
            spans.push((p.as_ptr() as usize, size));
            ptrs.push(p);
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlapping allocations");
        }

        for p in ptrs {
            unsafe { arena.free(p.as_ptr()) };
        }
        prop_assert!(arena.is_fully_retracted());
    }
}
