//! Zero-copy buffer hand-off
//!
//! A producer can draw a pool block, populate it in place, and send it
//! without the copy-into-pool step of a normal transmit. The buffer handle
//! owns the block; the registry keeps an accounting entry per outstanding
//! handle, keyed by owning application, so the lifecycle collaborator can
//! sweep everything an abnormally terminated application left checked out.

use std::collections::HashMap;

use crate::error::{BusError, Result};
use crate::identity::AppId;
use crate::pool::PoolBlock;

/// Writable message buffer obtained for zero-copy population
///
/// Consumed by `transmit_buffer` (sent without copying) or by
/// `release_zero_copy_buffer` (returned to the pool unsent).
#[derive(Debug)]
pub struct ZeroCopyBuffer {
    pub(crate) handle: u64,
    pub(crate) size: usize,
    pub(crate) block: PoolBlock,
}

impl ZeroCopyBuffer {
    /// Requested buffer size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Writable payload region
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.block.as_mut_slice()[..self.size]
    }

    /// Payload region
    pub fn as_slice(&self) -> &[u8] {
        &self.block.as_slice()[..self.size]
    }
}

#[derive(Debug, Clone, Copy)]
struct ZeroCopyEntry {
    app: AppId,
    block_size: usize,
}

/// Accounting registry of outstanding zero-copy buffers
#[derive(Debug, Default)]
pub struct ZeroCopyRegistry {
    entries: HashMap<u64, ZeroCopyEntry>,
    next_handle: u64,
}

impl ZeroCopyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Default::default()
    }

    /// Record a newly handed-out buffer, returning its handle
    pub fn register(&mut self, app: AppId, block_size: usize) -> u64 {
        self.next_handle += 1;
        self.entries
            .insert(self.next_handle, ZeroCopyEntry { app, block_size });
        self.next_handle
    }

    /// Unlink a handle on send or explicit release
    pub fn unlink(&mut self, handle: u64) -> Result<()> {
        self.entries
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| BusError::bad_argument("buffer", "not an outstanding zero-copy buffer"))
    }

    /// Unlink every entry owned by an application
    ///
    /// Returns the block sizes of the swept entries so the pool adapter can
    /// reconcile its accounting.
    pub fn release_all_for_app(&mut self, app: AppId) -> Vec<usize> {
        let handles: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.app == app)
            .map(|(handle, _)| *handle)
            .collect();
        handles
            .into_iter()
            .filter_map(|handle| self.entries.remove(&handle))
            .map(|entry| entry.block_size)
            .collect()
    }

    /// Number of outstanding buffers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no buffers are outstanding
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
