//! Heap configuration.

use crate::error::{AllocError, AllocResult};
use crate::registry::MAX_ARENAS;

/// Per-arena region size in the multi-arena default: 64 MiB.
pub const DEFAULT_REGION_SIZE: usize = 64 * 1024 * 1024;

/// Region size of the single-arena variant: 1 GiB.
pub const SINGLE_ARENA_REGION_SIZE: usize = 1024 * 1024 * 1024;

const MIN_REGION_SIZE: usize = 1024 * 1024;

/// Configuration installed once at heap initialisation.
///
/// The heap falls back to `HeapConfig::default()` when the first allocation
/// arrives before [`crate::configure`] was called.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Size of each arena's anonymous mapping, rounded up to the page size.
    pub region_size: usize,

    /// Number of arenas. `None` uses the detected hardware parallelism,
    /// clamped to the registry capacity.
    pub arena_count: Option<usize>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            region_size: DEFAULT_REGION_SIZE,
            arena_count: None,
        }
    }
}

impl HeapConfig {
    /// One arena backed by a single large mapping; every thread shares it.
    #[must_use]
    pub fn single_arena() -> Self {
        HeapConfig {
            region_size: SINGLE_ARENA_REGION_SIZE,
            arena_count: Some(1),
        }
    }

    pub(crate) fn validate(&self) -> AllocResult<()> {
        if self.region_size < MIN_REGION_SIZE {
            return Err(AllocError::InvalidConfig("region_size below 1 MiB"));
        }
        if let Some(count) = self.arena_count {
            if count == 0 {
                return Err(AllocError::InvalidConfig("arena_count must be at least 1"));
            }
            if count > MAX_ARENAS {
                return Err(AllocError::InvalidConfig(
                    "arena_count exceeds registry capacity",
                ));
            }
        }
        Ok(())
    }
}
