//! Arena registry: process-wide arena table and per-thread assignment.
//!
//! Global initialisation runs exactly once, on the first allocation (or
//! explicitly through [`configure`]): it sizes the table to the detected
//! hardware parallelism, clamped to [`MAX_ARENAS`], and maps one region per
//! arena. A thread's first call hashes its thread id into the live count and
//! caches the resulting arena index in thread-local storage.
//!
//! Frees are routed by pointer: the registry keeps the live arenas'
//! `[base, end)` ranges in a small array sorted by base, so a chunk is always
//! returned to the arena that carved it, including chunks freed by a thread
//! bound to a different arena.

use std::cell::Cell;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::thread;

use once_cell::sync::OnceCell;

use crate::arena::Arena;
use crate::config::HeapConfig;
use crate::error::{AllocError, AllocResult};

/// Capacity of the arena table.
pub const MAX_ARENAS: usize = 64;

static REGISTRY: OnceCell<Registry> = OnceCell::new();

thread_local! {
    static ASSIGNED_ARENA: Cell<Option<usize>> = const { Cell::new(None) };
}

pub(crate) struct Registry {
    arenas: Box<[Arena]>,
    /// `(base, end, arena index)` for each usable arena, sorted by base.
    ranges: Box<[(usize, usize, usize)]>,
}

impl Registry {
    /// The process-wide registry, initialised with the default configuration
    /// on first use.
    pub(crate) fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| Registry::build(&HeapConfig::default()))
    }

    fn build(config: &HeapConfig) -> Registry {
        let count = config
            .arena_count
            .unwrap_or_else(detected_parallelism)
            .clamp(1, MAX_ARENAS);

        let arenas: Box<[Arena]> = (0..count)
            .map(|_index| match Arena::new(config.region_size) {
                Ok(arena) => arena,
                Err(_error) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(
                        arena = _index,
                        region_size = config.region_size,
                        error = %_error,
                        "arena mapping failed; slot marked unusable"
                    );
                    Arena::unusable()
                }
            })
            .collect();

        let mut ranges: Vec<(usize, usize, usize)> = arenas
            .iter()
            .enumerate()
            .filter(|(_, arena)| arena.is_usable())
            .map(|(index, arena)| {
                let base = arena.base_address();
                (base, base + arena.capacity(), index)
            })
            .collect();
        ranges.sort_unstable_by_key(|&(base, _, _)| base);

        #[cfg(feature = "logging")]
        tracing::info!(
            arenas = count,
            usable = ranges.len(),
            region_size = config.region_size,
            "heap registry initialised"
        );

        Registry {
            arenas,
            ranges: ranges.into_boxed_slice(),
        }
    }

    /// The arena this thread is pinned to. The first call from a thread
    /// hashes its thread id into the live count and stores the choice in
    /// thread-local storage.
    pub(crate) fn arena_for_current_thread(&self) -> &Arena {
        let index = ASSIGNED_ARENA.with(|slot| match slot.get() {
            Some(index) => index,
            None => {
                let mut hasher = DefaultHasher::new();
                thread::current().id().hash(&mut hasher);
                let index = (hasher.finish() as usize) % self.arenas.len();
                slot.set(Some(index));
                index
            }
        });
        &self.arenas[index]
    }

    /// The arena whose mapped range contains `ptr`, found by binary search
    /// over the sorted base ranges.
    pub(crate) fn arena_containing(&self, ptr: *const u8) -> Option<&Arena> {
        let addr = ptr as usize;
        let slot = self.ranges.partition_point(|&(base, _, _)| base <= addr);
        let &(_, end, index) = self.ranges.get(slot.checked_sub(1)?)?;
        (addr < end).then(|| &self.arenas[index])
    }

    #[cfg(test)]
    pub(crate) fn arena_count(&self) -> usize {
        self.arenas.len()
    }
}

fn detected_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Installs a heap configuration before first use.
///
/// Fails when the configuration is invalid or the registry has already been
/// initialised (explicitly, or implicitly by an earlier allocation).
pub fn configure(config: HeapConfig) -> AllocResult<()> {
    config.validate()?;
    let mut installed = false;
    REGISTRY.get_or_init(|| {
        installed = true;
        Registry::build(&config)
    });
    if installed {
        Ok(())
    } else {
        Err(AllocError::InvalidConfig("heap already initialised"))
    }
}
