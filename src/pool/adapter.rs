//! Allocation/free wrapper over the external memory pool
//!
//! The adapter is the only path the bus uses to touch the pool; it layers
//! in-use and peak statistics over the collaborator's allocate/reclaim.
//! Release accounting happens when a buffer's use-count crosses zero; the
//! block's bytes re-enter the pool on their own when the last owner drops
//! them.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::bucket::{MemoryPool, PoolBlock};

/// Buffer pool usage statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Blocks currently checked out
    pub blocks_in_use: usize,
    /// Peak blocks checked out simultaneously
    pub peak_blocks_in_use: usize,
    /// Bytes currently checked out (bucket sizes, not payload lengths)
    pub bytes_in_use: usize,
    /// Peak bytes checked out simultaneously
    pub peak_bytes_in_use: usize,
    /// Total successful allocations
    pub total_allocations: u64,
    /// Total releases
    pub total_releases: u64,
    /// Allocation requests the pool could not satisfy
    pub allocation_failures: u64,
    /// Total bytes the pool manages
    pub capacity_bytes: usize,
}

/// Statistics-tracking wrapper over the memory pool collaborator
///
/// Callable only while the shared lock is held; performs no locking of its
/// own.
pub struct PoolAdapter {
    pool: Box<dyn MemoryPool>,
    stats: PoolStats,
}

impl PoolAdapter {
    /// Wrap a memory pool collaborator
    pub fn new(pool: Box<dyn MemoryPool>) -> Self {
        let capacity_bytes = pool.capacity_bytes();
        Self {
            pool,
            stats: PoolStats {
                capacity_bytes,
                ..Default::default()
            },
        }
    }

    /// Draw a block for a `size`-byte message
    pub fn allocate(&mut self, size: usize) -> Result<PoolBlock> {
        match self.pool.allocate(size) {
            Ok(block) => {
                self.stats.total_allocations += 1;
                self.stats.blocks_in_use += 1;
                self.stats.bytes_in_use += block.block_size();
                if self.stats.blocks_in_use > self.stats.peak_blocks_in_use {
                    self.stats.peak_blocks_in_use = self.stats.blocks_in_use;
                }
                if self.stats.bytes_in_use > self.stats.peak_bytes_in_use {
                    self.stats.peak_bytes_in_use = self.stats.bytes_in_use;
                }
                Ok(block)
            }
            Err(err) => {
                self.stats.allocation_failures += 1;
                Err(err)
            }
        }
    }

    /// Account for a block whose last reference was just given up
    pub fn account_release(&mut self, block_size: usize) {
        self.stats.total_releases += 1;
        self.stats.blocks_in_use = self.stats.blocks_in_use.saturating_sub(1);
        self.stats.bytes_in_use = self.stats.bytes_in_use.saturating_sub(block_size);
    }

    /// Current usage statistics
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl std::fmt::Debug for PoolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAdapter")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BucketConfig, PoolConfig};
    use crate::pool::bucket::BucketPool;

    fn adapter() -> PoolAdapter {
        let pool = BucketPool::new(&PoolConfig::new(vec![BucketConfig {
            block_size: 64,
            count: 2,
        }]))
        .unwrap();
        PoolAdapter::new(Box::new(pool))
    }

    #[test]
    fn test_in_use_and_peak_tracking() {
        let mut adapter = adapter();
        let a = adapter.allocate(10).unwrap();
        let b = adapter.allocate(10).unwrap();

        let stats = adapter.stats();
        assert_eq!(stats.blocks_in_use, 2);
        assert_eq!(stats.bytes_in_use, 128);
        assert_eq!(stats.peak_bytes_in_use, 128);

        adapter.account_release(a.block_size());
        adapter.account_release(b.block_size());
        drop(a);
        drop(b);
        let stats = adapter.stats();
        assert_eq!(stats.blocks_in_use, 0);
        assert_eq!(stats.bytes_in_use, 0);
        // Peaks persist after release.
        assert_eq!(stats.peak_blocks_in_use, 2);
        assert_eq!(stats.total_releases, 2);
    }

    #[test]
    fn test_failure_counted() {
        let mut adapter = adapter();
        let _a = adapter.allocate(10).unwrap();
        let _b = adapter.allocate(10).unwrap();
        assert!(adapter.allocate(10).is_err());
        assert_eq!(adapter.stats().allocation_failures, 1);
    }

    #[test]
    fn test_dropped_block_is_allocatable_again() {
        let mut adapter = adapter();
        let block = adapter.allocate(10).unwrap();
        adapter.account_release(block.block_size());
        drop(block);

        let _a = adapter.allocate(10).unwrap();
        let _b = adapter.allocate(10).unwrap();
        assert_eq!(adapter.stats().blocks_in_use, 2);
    }
}
