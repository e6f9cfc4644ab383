//! Diagnostic event notifications
//!
//! The bus never formats or persists diagnostics itself; it hands one-way
//! notifications to an external event collaborator. Events raised inside
//! the shared-lock critical section are collected in a fixed-capacity list
//! and emitted only after the lock is released, so an event sink can safely
//! call back into the bus.

use std::fmt;

use crate::identity::AppId;
use crate::msg::MsgId;
use crate::pipes::PipeId;
use crate::routing::Scope;

/// Severity of a diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nominal lifecycle notification
    Info,
    /// Degraded or rejected operation
    Error,
}

/// Diagnostic events the bus reports to its event collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A pipe was created
    PipeCreated {
        pipe: PipeId,
        name: String,
        depth: usize,
    },
    /// A pipe was deleted and its pending messages released
    PipeDeleted { pipe: PipeId },
    /// A subscription was added
    SubscriptionAdded {
        msg_id: MsgId,
        pipe: PipeId,
        scope: Scope,
    },
    /// A subscription was removed
    SubscriptionRemoved { msg_id: MsgId, pipe: PipeId },
    /// An exact-duplicate subscribe was ignored
    DuplicateSubscription { msg_id: MsgId, pipe: PipeId },
    /// Subscription report requested by the reporting toggle
    SubscriptionReport {
        msg_id: MsgId,
        pipe: PipeId,
        scope: Scope,
    },
    /// A message was sent with no subscribers and dropped
    NoSubscribers { msg_id: MsgId },
    /// A destination was at its message limit; message dropped for it
    MsgLimitExceeded { msg_id: MsgId, pipe: PipeId },
    /// A destination pipe's queue was full; message dropped for it
    PipeOverflow { msg_id: MsgId, pipe: PipeId },
    /// The queue write failed despite capacity
    InternalSendError { msg_id: MsgId, pipe: PipeId },
    /// An operation was rejected for an invalid argument
    BadArgument {
        operation: &'static str,
        detail: String,
    },
    /// Zero-copy buffers owned by a terminated application were swept
    ZeroCopySwept { app: AppId, count: usize },
}

impl BusEvent {
    /// Severity this event should be reported at
    pub fn severity(&self) -> Severity {
        match self {
            Self::PipeCreated { .. }
            | Self::PipeDeleted { .. }
            | Self::SubscriptionAdded { .. }
            | Self::SubscriptionRemoved { .. }
            | Self::DuplicateSubscription { .. }
            | Self::SubscriptionReport { .. }
            | Self::NoSubscribers { .. }
            | Self::ZeroCopySwept { .. } => Severity::Info,
            Self::MsgLimitExceeded { .. }
            | Self::PipeOverflow { .. }
            | Self::InternalSendError { .. }
            | Self::BadArgument { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipeCreated { pipe, name, depth } => {
                write!(f, "pipe {} ({}) created, depth {}", pipe, name, depth)
            }
            Self::PipeDeleted { pipe } => write!(f, "pipe {} deleted", pipe),
            Self::SubscriptionAdded {
                msg_id,
                pipe,
                scope,
            } => write!(f, "subscription {} -> {} added ({:?})", msg_id, pipe, scope),
            Self::SubscriptionRemoved { msg_id, pipe } => {
                write!(f, "subscription {} -> {} removed", msg_id, pipe)
            }
            Self::DuplicateSubscription { msg_id, pipe } => {
                write!(f, "duplicate subscription {} -> {} ignored", msg_id, pipe)
            }
            Self::SubscriptionReport {
                msg_id,
                pipe,
                scope,
            } => write!(f, "subscription report: {} -> {} ({:?})", msg_id, pipe, scope),
            Self::NoSubscribers { msg_id } => {
                write!(f, "message {} sent with no subscribers", msg_id)
            }
            Self::MsgLimitExceeded { msg_id, pipe } => {
                write!(f, "message {} dropped for {}: msg limit exceeded", msg_id, pipe)
            }
            Self::PipeOverflow { msg_id, pipe } => {
                write!(f, "message {} dropped for {}: pipe overflow", msg_id, pipe)
            }
            Self::InternalSendError { msg_id, pipe } => {
                write!(f, "message {} to {}: internal queue error", msg_id, pipe)
            }
            Self::BadArgument { operation, detail } => {
                write!(f, "{} rejected: {}", operation, detail)
            }
            Self::ZeroCopySwept { app, count } => {
                write!(f, "released {} zero-copy buffer(s) owned by {}", count, app)
            }
        }
    }
}

/// One-way diagnostic notification collaborator
///
/// Implementations must not block; the bus never retries a notification.
pub trait EventSink: Send + Sync {
    /// Report one event
    fn event(&self, event: &BusEvent);
}

/// Default sink routing events through the `log` facade
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn event(&self, event: &BusEvent) {
        match event.severity() {
            Severity::Info => log::info!("{}", event),
            Severity::Error => log::error!("{}", event),
        }
    }
}

/// Fixed-capacity list of events collected under the shared lock
///
/// Events past capacity are dropped and counted; emission happens after the
/// lock is released via [`PendingEvents::drain`].
#[derive(Debug)]
pub struct PendingEvents {
    events: Vec<BusEvent>,
    capacity: usize,
    dropped: u64,
}

impl PendingEvents {
    /// Create an empty list with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queue an event for deferred emission
    pub fn push(&mut self, event: BusEvent) {
        if self.events.len() < self.capacity {
            self.events.push(event);
        } else {
            self.dropped += 1;
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are queued
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Emit all queued events to the sink, in the order they were raised
    pub fn drain(&mut self, sink: &dyn EventSink) {
        for event in self.events.drain(..) {
            sink.event(&event);
        }
        if self.dropped > 0 {
            log::warn!("{} diagnostic event(s) dropped at capacity", self.dropped);
            self.dropped = 0;
        }
    }
}
