//! Bounded FIFO queue backing one pipe
//!
//! The queue carries buffer-descriptor references, never payloads. It has
//! its own internal synchronization, so a consumer blocked waiting on it
//! never holds the bus's shared lock.

use std::time::Duration;

use crossbeam::channel::{
    bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};

use crate::error::{BusError, Result};
use crate::pool::BufferId;

/// How long a receive may wait for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveTimeout {
    /// Block until a message arrives
    PendForever,
    /// Return immediately when the pipe is empty
    Poll,
    /// Wait at most this many milliseconds
    Millis(u32),
}

/// Why an enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at its configured depth
    Full,
    /// The queue no longer exists
    Disconnected,
}

/// Bounded descriptor-reference queue for one pipe
#[derive(Debug)]
pub struct PipeQueue {
    tx: Sender<BufferId>,
    rx: Receiver<BufferId>,
    depth: usize,
}

impl PipeQueue {
    /// Create a queue holding at most `depth` references
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth);
        Self { tx, rx, depth }
    }

    /// Enqueue a descriptor reference without blocking
    pub fn try_put(&self, id: BufferId) -> std::result::Result<(), EnqueueError> {
        self.tx.try_send(id).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Disconnected(_) => EnqueueError::Disconnected,
        })
    }

    /// Clone of the receiving end, for waiting outside the shared lock
    pub fn receiver(&self) -> Receiver<BufferId> {
        self.rx.clone()
    }

    /// Remove and return everything currently queued
    pub fn drain(&self) -> Vec<BufferId> {
        let mut drained = Vec::with_capacity(self.rx.len());
        while let Ok(id) = self.rx.try_recv() {
            drained.push(id);
        }
        drained
    }

    /// Number of references currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Configured depth
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Wait on a pipe's receiving end per the caller's timeout mode
///
/// A disconnected queue means the pipe was deleted while waiting.
pub fn wait_for_message(rx: &Receiver<BufferId>, timeout: ReceiveTimeout) -> Result<BufferId> {
    match timeout {
        ReceiveTimeout::Poll => rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => BusError::NoMessage,
            TryRecvError::Disconnected => BusError::not_found("pipe deleted while receiving"),
        }),
        ReceiveTimeout::PendForever => rx
            .recv()
            .map_err(|_| BusError::not_found("pipe deleted while receiving")),
        ReceiveTimeout::Millis(ms) => rx
            .recv_timeout(Duration::from_millis(u64::from(ms)))
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => BusError::Timeout,
                RecvTimeoutError::Disconnected => {
                    BusError::not_found("pipe deleted while receiving")
                }
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = PipeQueue::new(4);
        queue.try_put(1).unwrap();
        queue.try_put(2).unwrap();
        queue.try_put(3).unwrap();

        let rx = queue.receiver();
        assert_eq!(wait_for_message(&rx, ReceiveTimeout::Poll).unwrap(), 1);
        assert_eq!(wait_for_message(&rx, ReceiveTimeout::Poll).unwrap(), 2);
        assert_eq!(wait_for_message(&rx, ReceiveTimeout::Poll).unwrap(), 3);
    }

    #[test]
    fn test_full_queue_refuses() {
        let queue = PipeQueue::new(2);
        queue.try_put(1).unwrap();
        queue.try_put(2).unwrap();
        assert_eq!(queue.try_put(3), Err(EnqueueError::Full));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_poll_empty_is_no_message() {
        let queue = PipeQueue::new(2);
        let rx = queue.receiver();
        assert!(matches!(
            wait_for_message(&rx, ReceiveTimeout::Poll),
            Err(BusError::NoMessage)
        ));
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let queue = PipeQueue::new(2);
        let rx = queue.receiver();
        assert!(matches!(
            wait_for_message(&rx, ReceiveTimeout::Millis(5)),
            Err(BusError::Timeout)
        ));
    }

    #[test]
    fn test_deleted_pipe_unblocks_waiter() {
        let queue = PipeQueue::new(2);
        let rx = queue.receiver();
        drop(queue);
        assert!(matches!(
            wait_for_message(&rx, ReceiveTimeout::PendForever),
            Err(BusError::NotFound { .. })
        ));
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = PipeQueue::new(4);
        queue.try_put(7).unwrap();
        queue.try_put(8).unwrap();
        assert_eq!(queue.drain(), vec![7, 8]);
        assert!(queue.is_empty());
    }
}
