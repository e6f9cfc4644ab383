//! Bus-wide statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::pool::PoolStats;

/// Snapshot of bus counters and table gauges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted for transmission
    pub msgs_sent: u64,
    /// Messages successfully received
    pub msgs_received: u64,
    /// Sends that found no subscribers (defined success-with-drop)
    pub no_subscribers: u64,
    /// Per-destination drops at the message limit
    pub msg_limit_drops: u64,
    /// Per-destination drops on a full pipe queue
    pub pipe_overflows: u64,
    /// Unexpected collaborator failures
    pub internal_errors: u64,
    /// Exact-duplicate subscribes ignored
    pub duplicate_subscriptions: u64,
    /// Operations rejected for invalid arguments
    pub bad_arguments: u64,
    /// Receive calls that failed outside the empty/timeout cases
    pub receive_errors: u64,
    /// Pipes currently in use
    pub pipes_in_use: usize,
    /// Peak pipes in use simultaneously
    pub peak_pipes_in_use: usize,
    /// Route slots allocated (never reclaimed)
    pub routes_in_use: usize,
    /// Destination slots currently occupied
    pub destinations_in_use: usize,
    /// Buffer pool usage
    pub pool: PoolStats,
}

/// Thread-safe bus counters
///
/// Counters live outside the shared lock so the hot path can bump them
/// without extending the critical section; table gauges are filled in at
/// snapshot time.
#[derive(Debug, Default)]
pub struct AtomicBusStats {
    msgs_sent: AtomicU64,
    msgs_received: AtomicU64,
    no_subscribers: AtomicU64,
    msg_limit_drops: AtomicU64,
    pipe_overflows: AtomicU64,
    internal_errors: AtomicU64,
    duplicate_subscriptions: AtomicU64,
    bad_arguments: AtomicU64,
    receive_errors: AtomicU64,
}

impl AtomicBusStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Default::default()
    }

    /// Record an accepted send
    pub fn record_send(&self) {
        self.msgs_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful receive
    pub fn record_receive(&self) {
        self.msgs_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send with no subscribers
    pub fn record_no_subscribers(&self) {
        self.no_subscribers.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drop at a destination's message limit
    pub fn record_msg_limit_drop(&self) {
        self.msg_limit_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drop on a full pipe queue
    pub fn record_pipe_overflow(&self) {
        self.pipe_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unexpected collaborator failure
    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an ignored duplicate subscribe
    pub fn record_duplicate_subscription(&self) {
        self.duplicate_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invalid-argument rejection
    pub fn record_bad_argument(&self) {
        self.bad_arguments.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed receive (not empty/timeout)
    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot with gauges left at zero
    pub fn snapshot(&self) -> BusStats {
        BusStats {
            msgs_sent: self.msgs_sent.load(Ordering::Relaxed),
            msgs_received: self.msgs_received.load(Ordering::Relaxed),
            no_subscribers: self.no_subscribers.load(Ordering::Relaxed),
            msg_limit_drops: self.msg_limit_drops.load(Ordering::Relaxed),
            pipe_overflows: self.pipe_overflows.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            duplicate_subscriptions: self.duplicate_subscriptions.load(Ordering::Relaxed),
            bad_arguments: self.bad_arguments.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    /// Reset every counter
    pub fn reset(&self) {
        self.msgs_sent.store(0, Ordering::Relaxed);
        self.msgs_received.store(0, Ordering::Relaxed);
        self.no_subscribers.store(0, Ordering::Relaxed);
        self.msg_limit_drops.store(0, Ordering::Relaxed);
        self.pipe_overflows.store(0, Ordering::Relaxed);
        self.internal_errors.store(0, Ordering::Relaxed);
        self.duplicate_subscriptions.store(0, Ordering::Relaxed);
        self.bad_arguments.store(0, Ordering::Relaxed);
        self.receive_errors.store(0, Ordering::Relaxed);
    }
}
