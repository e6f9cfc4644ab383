//! Destinations: the (route, pipe) subscription edges
//!
//! Destinations live in a fixed arena of slots and link to their list
//! neighbors by slot index, so removal can never leave a dangling pointer
//! behind. A destination belongs to exactly one route's list and references
//! exactly one pipe at a time.

use serde::{Deserialize, Serialize};

use crate::pipes::PipeId;

/// Visibility of a subscription beyond this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Exported beyond the local processor
    Global,
    /// Restricted to this processor
    Local,
}

/// One (route, pipe) subscription edge; the quantum of flow control
#[derive(Debug, Clone)]
pub struct Destination {
    /// Pipe this edge delivers to
    pub pipe: PipeId,
    /// Maximum messages in flight for this edge
    pub msg_limit: u32,
    /// Whether the edge currently delivers (disable without unsubscribing)
    pub active: bool,
    /// Messages queued but not yet received
    pub in_flight: u32,
    /// Lifetime count of successful deliveries
    pub delivered: u64,
    /// Subscription visibility
    pub scope: Scope,
    /// Previous slot in the route's list
    pub(crate) prev: Option<usize>,
    /// Next slot in the route's list
    pub(crate) next: Option<usize>,
}

impl Destination {
    /// Create an active, unlinked destination
    pub fn new(pipe: PipeId, msg_limit: u32, scope: Scope) -> Self {
        Self {
            pipe,
            msg_limit,
            active: true,
            in_flight: 0,
            delivered: 0,
            scope,
            prev: None,
            next: None,
        }
    }
}

/// Fixed arena of destination slots, linked by index
#[derive(Debug)]
pub struct DestinationArena {
    slots: Vec<Option<Destination>>,
    free: Vec<usize>,
}

impl DestinationArena {
    /// Create an arena with the given number of slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
        }
    }

    /// Claim a slot for a destination; `None` when the arena is full
    pub fn alloc(&mut self, dest: Destination) -> Option<usize> {
        let index = self.free.pop()?;
        self.slots[index] = Some(dest);
        Some(index)
    }

    /// Release a slot, returning its destination
    pub fn free(&mut self, index: usize) -> Option<Destination> {
        let dest = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(dest)
    }

    /// Destination in a slot
    pub fn get(&self, index: usize) -> Option<&Destination> {
        self.slots.get(index)?.as_ref()
    }

    /// Mutable destination in a slot
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Destination> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no slots are occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
