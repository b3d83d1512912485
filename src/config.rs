//! Runtime-tunable constants, frozen for the lifetime of a region once
//! [`RegionManager::new`](crate::region::RegionManager::new) has validated
//! them.

use crate::error::ConfigError;
use crate::util::WORD_SIZE;

/// Default ceiling of the Small allocator: requests above this use the
/// Large path.
pub const DEFAULT_LARGE_MIN_SIZE: usize = 4096;

/// Default minimum size of a free-chunk-list entry; smaller free spans are
/// dark matter.
pub const DEFAULT_FREE_CHUNK_MIN_SIZE: usize = 512;

/// Size of the tiny pool carved out of the front of every region.
pub const TINY_POOL_SIZE: usize = 1024;

/// A free chunk's trailing footer is two words (next, size); a chunk must
/// be at least twice that, so the two words ahead of the footer remain free
/// for a dead-object header should a walker ever need to file the chunk's
/// leading bytes as dark matter.
const MIN_FREE_CHUNK_WORDS: usize = 4;

/// The two runtime-tunable integers a region is built from, validated once
/// and then immutable.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    large_min_size: usize,
    free_chunk_min_size: usize,
}

impl AllocatorConfig {
    /// Validates `large_min_size` and `free_chunk_min_size` and freezes
    /// them into a config. Both must be positive multiples of the machine
    /// word; `free_chunk_min_size` must additionally be at least
    /// `MIN_FREE_CHUNK_WORDS` words.
    pub fn new(large_min_size: usize, free_chunk_min_size: usize) -> Result<Self, ConfigError> {
        if large_min_size == 0 || large_min_size % WORD_SIZE != 0 {
            return Err(ConfigError::InvalidLargeMinSize { value: large_min_size });
        }
        let minimum = MIN_FREE_CHUNK_WORDS * WORD_SIZE;
        if free_chunk_min_size < minimum || free_chunk_min_size % WORD_SIZE != 0 {
            return Err(ConfigError::InvalidFreeChunkMinSize {
                value: free_chunk_min_size,
                minimum,
            });
        }
        Ok(Self {
            large_min_size,
            free_chunk_min_size,
        })
    }

    /// Ceiling of the Small allocator; requests above it delegate to Large.
    #[inline]
    pub fn large_min_size(&self) -> usize {
        self.large_min_size
    }

    /// Minimum size a free-chunk-list entry may have.
    #[inline]
    pub fn free_chunk_min_size(&self) -> usize {
        self.free_chunk_min_size
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_MIN_SIZE, DEFAULT_FREE_CHUNK_MIN_SIZE)
            .expect("default tunables are always valid")
    }
}
