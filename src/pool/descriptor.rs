//! Reference-counted buffer descriptors
//!
//! Each in-flight message buffer is tracked by one descriptor with a
//! use-count: 1 for the producer's transient ownership plus 1 per
//! successful enqueue onto a destination pipe. The block returns to the
//! pool exactly when the count reaches zero, whichever caller performs the
//! release that crosses it. The count is mutated only under the shared
//! lock, which replaces the manual atomic juggling this protocol
//! traditionally needs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BusError, Result};
use crate::msg::MessageBuffer;

use super::adapter::PoolAdapter;

/// Identifier of one tracked buffer descriptor
pub type BufferId = u64;

#[derive(Debug)]
struct BufferDescriptor {
    use_count: u32,
    buffer: Arc<MessageBuffer>,
}

/// Table of in-flight buffer descriptors
#[derive(Debug, Default)]
pub struct DescriptorTable {
    entries: HashMap<BufferId, BufferDescriptor>,
    next_id: BufferId,
}

impl DescriptorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Default::default()
    }

    /// Track a new buffer with a use-count of 1
    pub fn insert(&mut self, buffer: Arc<MessageBuffer>) -> BufferId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            BufferDescriptor {
                use_count: 1,
                buffer,
            },
        );
        id
    }

    /// Increment a descriptor's use-count
    pub fn retain(&mut self, id: BufferId) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| BusError::internal(format!("retain of unknown buffer {}", id)))?;
        entry.use_count += 1;
        Ok(())
    }

    /// Decrement a descriptor's use-count, releasing the buffer when it
    /// reaches zero
    ///
    /// Returns `true` when this release freed the buffer. The pool is
    /// credited immediately; the block's bytes re-enter the pool's free
    /// list when the last outstanding view of the buffer drops.
    pub fn release(&mut self, id: BufferId, pool: &mut PoolAdapter) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| BusError::internal(format!("release of unknown buffer {}", id)))?;

        entry.use_count -= 1;
        if entry.use_count > 0 {
            return Ok(false);
        }

        let descriptor = self
            .entries
            .remove(&id)
            .ok_or_else(|| BusError::internal("descriptor vanished during release"))?;
        pool.account_release(descriptor.buffer.block_size());
        drop(descriptor);
        Ok(true)
    }

    /// Shared view of a tracked buffer
    pub fn get(&self, id: BufferId) -> Option<Arc<MessageBuffer>> {
        self.entries.get(&id).map(|e| Arc::clone(&e.buffer))
    }

    /// Current use-count of a tracked buffer
    pub fn use_count(&self, id: BufferId) -> Option<u32> {
        self.entries.get(&id).map(|e| e.use_count)
    }

    /// Number of tracked descriptors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no descriptors are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
