//! Pipe record: one consumer's inbound queue plus ownership and options

use serde::{Deserialize, Serialize};

use crate::identity::AppId;

use super::queue::PipeQueue;
use super::table::PipeId;

/// Option flags on a pipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeOptions {
    /// Skip delivery of messages the pipe's owner sent itself
    pub ignore_self: bool,
}

impl PipeOptions {
    /// Options with every flag clear
    pub fn none() -> Self {
        Default::default()
    }

    /// Set the ignore-self flag
    pub fn with_ignore_self(mut self, ignore_self: bool) -> Self {
        self.ignore_self = ignore_self;
        self
    }
}

/// One consumer's inbound queue and its bookkeeping
#[derive(Debug)]
pub struct Pipe {
    /// Pipe identifier (slot + generation)
    pub id: PipeId,
    /// Pipe name, unique across the table
    pub name: String,
    /// Application that created the pipe and may mutate it
    pub owner: AppId,
    /// Configured queue depth
    pub depth: usize,
    /// Option flags
    pub opts: PipeOptions,
    /// Backing bounded queue of descriptor references
    pub(crate) queue: PipeQueue,
    /// Messages successfully received on this pipe
    pub received_count: u64,
    /// Sends dropped for this pipe because its queue was full
    pub overflow_count: u64,
    /// Unexpected queue failures observed delivering to this pipe
    pub error_count: u64,
}

impl Pipe {
    /// Create a pipe record with a fresh backing queue
    pub(crate) fn new(id: PipeId, name: String, owner: AppId, depth: usize) -> Self {
        Self {
            id,
            name,
            owner,
            depth,
            opts: PipeOptions::none(),
            queue: PipeQueue::new(depth),
            received_count: 0,
            overflow_count: 0,
            error_count: 0,
        }
    }

    /// Number of messages currently queued
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
