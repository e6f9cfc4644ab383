//! Fixed-bucket memory pool collaborator
//!
//! The bus draws message buffers from an external memory pool. The
//! [`MemoryPool`] trait is the capability the bus consumes; [`BucketPool`]
//! is the default implementation: a set of pre-allocated fixed-size
//! buckets with per-bucket free lists. Nothing here grows after
//! construction.
//!
//! A [`PoolBlock`] finds its own way home: dropping one sends its bytes
//! back to the owning pool over a reclaim channel, so a block released on
//! any thread re-enters its bucket's free list the next time the pool is
//! used under the shared lock.

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::config::PoolConfig;
use crate::error::{BusError, Result};

type Reclaim = (Box<[u8]>, usize);

/// One block drawn from the pool
///
/// A block is always a full bucket's worth of bytes; the payload length it
/// carries is tracked by whoever owns the block.
#[derive(Debug)]
pub struct PoolBlock {
    bytes: Option<Box<[u8]>>,
    block_size: usize,
    reclaim: Option<Sender<Reclaim>>,
}

impl PoolBlock {
    fn new(bytes: Box<[u8]>, reclaim: Option<Sender<Reclaim>>) -> Self {
        let block_size = bytes.len();
        Self {
            bytes: Some(bytes),
            block_size,
            reclaim,
        }
    }

    /// Size of the block (the bucket's block size)
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Block contents
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    /// Writable block contents
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.bytes.as_deref_mut().unwrap_or(&mut [])
    }

    #[cfg(test)]
    pub(crate) fn for_tests(block_size: usize) -> Self {
        Self::new(vec![0u8; block_size].into_boxed_slice(), None)
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        if let (Some(bytes), Some(tx)) = (self.bytes.take(), self.reclaim.take()) {
            // If the pool itself is gone the send fails and the bytes are
            // simply freed.
            let _ = tx.send((bytes, self.block_size));
        }
    }
}

/// Memory pool capability consumed by the bus
///
/// Called only under the shared lock. Allocation failure must be tolerated
/// at any time; the bus turns it into a status for the caller, never a
/// panic.
pub trait MemoryPool: Send {
    /// Draw a block large enough for `size` bytes
    fn allocate(&mut self, size: usize) -> Result<PoolBlock>;

    /// Pull dropped blocks back into the free lists
    fn reclaim(&mut self);

    /// Total bytes the pool manages
    fn capacity_bytes(&self) -> usize;
}

/// Pre-allocated fixed-bucket pool
#[derive(Debug)]
pub struct BucketPool {
    buckets: Vec<Bucket>,
    capacity_bytes: usize,
    reclaim_tx: Sender<Reclaim>,
    reclaim_rx: Receiver<Reclaim>,
}

#[derive(Debug)]
struct Bucket {
    block_size: usize,
    free: Vec<Box<[u8]>>,
}

impl BucketPool {
    /// Pre-allocate every bucket described by the layout
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let (reclaim_tx, reclaim_rx) = unbounded();

        let buckets = config
            .buckets
            .iter()
            .map(|b| Bucket {
                block_size: b.block_size,
                free: (0..b.count)
                    .map(|_| vec![0u8; b.block_size].into_boxed_slice())
                    .collect(),
            })
            .collect();

        Ok(Self {
            buckets,
            capacity_bytes: config.total_bytes(),
            reclaim_tx,
            reclaim_rx,
        })
    }

    /// Free blocks remaining in the bucket that serves `size`-byte requests
    pub fn free_blocks_for(&mut self, size: usize) -> usize {
        self.reclaim();
        self.buckets
            .iter()
            .find(|b| b.block_size >= size)
            .map(|b| b.free.len())
            .unwrap_or(0)
    }
}

impl MemoryPool for BucketPool {
    fn allocate(&mut self, size: usize) -> Result<PoolBlock> {
        self.reclaim();
        // Smallest bucket that fits and still has a free block.
        for bucket in &mut self.buckets {
            if bucket.block_size >= size {
                if let Some(mut bytes) = bucket.free.pop() {
                    bytes.fill(0);
                    return Ok(PoolBlock::new(bytes, Some(self.reclaim_tx.clone())));
                }
            }
        }
        Err(BusError::PoolExhausted { requested: size })
    }

    fn reclaim(&mut self) {
        while let Ok((bytes, block_size)) = self.reclaim_rx.try_recv() {
            if let Some(bucket) = self
                .buckets
                .iter_mut()
                .find(|b| b.block_size == block_size)
            {
                bucket.free.push(bytes);
            }
        }
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;

    fn small_pool() -> BucketPool {
        BucketPool::new(&PoolConfig::new(vec![
            BucketConfig {
                block_size: 32,
                count: 2,
            },
            BucketConfig {
                block_size: 128,
                count: 1,
            },
        ]))
        .expect("pool layout is valid")
    }

    #[test]
    fn test_allocates_from_smallest_fitting_bucket() {
        let mut pool = small_pool();
        let block = pool.allocate(10).unwrap();
        assert_eq!(block.block_size(), 32);

        let block = pool.allocate(100).unwrap();
        assert_eq!(block.block_size(), 128);
    }

    #[test]
    fn test_overflow_to_larger_bucket_when_exhausted() {
        let mut pool = small_pool();
        let _a = pool.allocate(10).unwrap();
        let _b = pool.allocate(10).unwrap();
        // 32-byte bucket empty; the 128-byte bucket serves the request.
        let c = pool.allocate(10).unwrap();
        assert_eq!(c.block_size(), 128);
        // Everything exhausted now.
        assert!(matches!(
            pool.allocate(10),
            Err(BusError::PoolExhausted { requested: 10 })
        ));
    }

    #[test]
    fn test_dropped_block_returns_to_its_bucket() {
        let mut pool = small_pool();
        let block = pool.allocate(10).unwrap();
        assert_eq!(pool.free_blocks_for(10), 1);
        drop(block);
        assert_eq!(pool.free_blocks_for(10), 2);
    }

    #[test]
    fn test_reclaimed_block_is_zeroed_on_reuse() {
        let mut pool = small_pool();
        let mut block = pool.allocate(10).unwrap();
        block.as_mut_slice()[0] = 0xAA;
        drop(block);

        let block = pool.allocate(10).unwrap();
        assert_eq!(block.as_slice()[0], 0);
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut pool = small_pool();
        assert!(pool.allocate(4096).is_err());
    }
}
