//! The software bus aggregate
//!
//! One `SoftwareBus` owns every table behind a single shared-data lock.
//! Public entry points acquire the lock, mutate, release, and only then
//! emit any diagnostic events they collected, so an event sink can call
//! back into the bus without re-entering the lock.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::events::{BusEvent, EventSink, LogSink, PendingEvents};
use crate::identity::{AppId, AppIdentity, StaticIdentity};
use crate::msg::MsgId;
use crate::pipes::{PipeId, PipeOptions, PipeTable};
use crate::pool::{BucketPool, DescriptorTable, MemoryPool, PoolAdapter, PoolStats};
use crate::routing::table::SubscribeOutcome;
use crate::routing::{Destination, RouteTable, Scope};
use crate::zerocopy::{ZeroCopyBuffer, ZeroCopyRegistry};

use super::stats::{AtomicBusStats, BusStats};

/// Everything serialized by the shared-data lock
#[derive(Debug)]
pub(crate) struct SharedTables {
    pub(crate) pipes: PipeTable,
    pub(crate) routes: RouteTable,
    pub(crate) descriptors: DescriptorTable,
    pub(crate) pool: PoolAdapter,
    pub(crate) zero_copy: ZeroCopyRegistry,
    pub(crate) subscription_reporting: bool,
}

/// Publish/subscribe message bus
///
/// All table capacities are fixed at construction from [`BusConfig`];
/// message payloads live in a pre-allocated bucket pool.
pub struct SoftwareBus {
    pub(crate) config: BusConfig,
    pub(crate) shared: Mutex<SharedTables>,
    pub(crate) stats: AtomicBusStats,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) identity: Arc<dyn AppIdentity>,
}

impl SoftwareBus {
    /// Create a bus with the default bucket pool
    pub fn new(config: BusConfig) -> Result<Self> {
        let pool = BucketPool::new(&config.pool)?;
        Self::with_memory_pool(config, Box::new(pool))
    }

    /// Create a bus over an externally supplied memory pool
    pub fn with_memory_pool(config: BusConfig, pool: Box<dyn MemoryPool>) -> Result<Self> {
        config.validate()?;
        let shared = SharedTables {
            pipes: PipeTable::new(config.max_pipes),
            routes: RouteTable::new(config.max_routes, config.max_destinations_per_route),
            descriptors: DescriptorTable::new(),
            pool: PoolAdapter::new(pool),
            zero_copy: ZeroCopyRegistry::new(),
            subscription_reporting: false,
        };
        Ok(Self {
            config,
            shared: Mutex::new(shared),
            stats: AtomicBusStats::new(),
            sink: Arc::new(LogSink),
            identity: Arc::new(StaticIdentity::default()),
        })
    }

    /// Replace the diagnostic event collaborator
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the identity collaborator
    pub fn with_identity(mut self, identity: Arc<dyn AppIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Acquire the shared-data lock
    ///
    /// A poisoned lock is recovered and logged, never escalated; a
    /// transient primitive failure is survivable by policy.
    pub(crate) fn tables(&self) -> MutexGuard<'_, SharedTables> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("shared data lock poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn pending(&self) -> PendingEvents {
        PendingEvents::new(self.config.pending_event_capacity)
    }

    /// Count and report an invalid-argument rejection
    pub(crate) fn reject(
        &self,
        operation: &'static str,
        err: BusError,
        pending: &mut PendingEvents,
    ) -> BusError {
        self.stats.record_bad_argument();
        pending.push(BusEvent::BadArgument {
            operation,
            detail: err.to_string(),
        });
        err
    }

    pub(crate) fn validate_msg_id(
        &self,
        operation: &'static str,
        msg_id: MsgId,
        pending: &mut PendingEvents,
    ) -> Result<()> {
        if msg_id.raw() > self.config.highest_valid_msg_id {
            return Err(self.reject(
                operation,
                BusError::bad_argument(
                    "msg_id",
                    format!(
                        "{} above highest valid identifier 0x{:04X}",
                        msg_id, self.config.highest_valid_msg_id
                    ),
                ),
                pending,
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipes
    // ------------------------------------------------------------------

    /// Create a pipe owned by the calling application
    pub fn create_pipe(&self, depth: usize, name: &str) -> Result<PipeId> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = self.create_pipe_inner(depth, name, caller, &mut pending);
        pending.drain(self.sink.as_ref());
        result
    }

    fn create_pipe_inner(
        &self,
        depth: usize,
        name: &str,
        owner: AppId,
        pending: &mut PendingEvents,
    ) -> Result<PipeId> {
        if depth == 0 || depth > self.config.max_pipe_depth {
            return Err(self.reject(
                "create_pipe",
                BusError::bad_argument(
                    "depth",
                    format!("{} outside [1, {}]", depth, self.config.max_pipe_depth),
                ),
                pending,
            ));
        }
        if name.is_empty() {
            return Err(self.reject(
                "create_pipe",
                BusError::bad_argument("name", "pipe name cannot be empty"),
                pending,
            ));
        }

        let mut guard = self.tables();
        let id = guard.pipes.create(name, owner, depth)?;
        pending.push(BusEvent::PipeCreated {
            pipe: id,
            name: name.to_string(),
            depth,
        });
        Ok(id)
    }

    /// Delete a pipe owned by the calling application
    pub fn delete_pipe(&self, pipe: PipeId) -> Result<()> {
        self.delete_pipe_for_app(pipe, self.identity.current_app())
    }

    /// Delete a pipe on behalf of an application
    ///
    /// Entry point for the lifecycle collaborator cleaning up after a
    /// terminated application.
    pub fn delete_pipe_for_app(&self, pipe: PipeId, app: AppId) -> Result<()> {
        let mut pending = self.pending();
        let result = self.delete_pipe_inner(pipe, app, &mut pending);
        pending.drain(self.sink.as_ref());
        result
    }

    fn delete_pipe_inner(
        &self,
        pipe: PipeId,
        app: AppId,
        pending: &mut PendingEvents,
    ) -> Result<()> {
        let mut guard = self.tables();
        let tables = &mut *guard;

        let owner = match tables.pipes.get(pipe) {
            Some(p) => p.owner,
            None => {
                return Err(self.reject(
                    "delete_pipe",
                    BusError::bad_argument("pipe", format!("{} does not exist", pipe)),
                    pending,
                ))
            }
        };
        if owner != app {
            return Err(self.reject(
                "delete_pipe",
                BusError::bad_argument("pipe", format!("{} not owned by {}", pipe, app)),
                pending,
            ));
        }

        tables.routes.remove_all_for_pipe(pipe);
        let removed = tables
            .pipes
            .remove(pipe)
            .ok_or_else(|| BusError::internal("pipe vanished during delete"))?;
        for id in removed.queue.drain() {
            if let Err(err) = tables.descriptors.release(id, &mut tables.pool) {
                log::error!("releasing queued buffer during pipe delete: {}", err);
                self.stats.record_internal_error();
            }
        }
        pending.push(BusEvent::PipeDeleted { pipe });
        Ok(())
    }

    /// Set a pipe's option flags; only the owner may set them
    pub fn set_pipe_opts(&self, pipe: PipeId, opts: PipeOptions) -> Result<()> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = (|| {
            let mut guard = self.tables();
            let record = guard
                .pipes
                .get_mut(pipe)
                .ok_or_else(|| BusError::bad_argument("pipe", format!("{} does not exist", pipe)))?;
            if record.owner != caller {
                return Err(BusError::bad_argument(
                    "pipe",
                    format!("{} not owned by {}", pipe, caller),
                ));
            }
            record.opts = opts;
            Ok(())
        })()
        .map_err(|err| self.reject("set_pipe_opts", err, &mut pending));
        pending.drain(self.sink.as_ref());
        result
    }

    /// Read a pipe's option flags
    pub fn get_pipe_opts(&self, pipe: PipeId) -> Result<PipeOptions> {
        let guard = self.tables();
        guard
            .pipes
            .get(pipe)
            .map(|p| p.opts)
            .ok_or_else(|| BusError::bad_argument("pipe", format!("{} does not exist", pipe)))
    }

    /// Name a pipe was created with
    pub fn get_pipe_name(&self, pipe: PipeId) -> Result<String> {
        let guard = self.tables();
        guard
            .pipes
            .get(pipe)
            .map(|p| p.name.clone())
            .ok_or_else(|| BusError::bad_argument("pipe", format!("{} does not exist", pipe)))
    }

    /// Identifier of the pipe with a given name
    pub fn get_pipe_id_by_name(&self, name: &str) -> Result<PipeId> {
        let guard = self.tables();
        guard
            .pipes
            .find_by_name(name)
            .ok_or_else(|| BusError::not_found(format!("pipe named {}", name)))
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe a pipe to a message identifier with default settings
    pub fn subscribe(&self, msg_id: MsgId, pipe: PipeId) -> Result<()> {
        self.subscribe_ex(msg_id, pipe, Scope::Global, self.config.default_msg_limit)
    }

    /// Subscribe with an explicit scope and per-destination message limit
    pub fn subscribe_ex(
        &self,
        msg_id: MsgId,
        pipe: PipeId,
        scope: Scope,
        msg_limit: u32,
    ) -> Result<()> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = self.subscribe_inner(msg_id, pipe, scope, msg_limit, caller, &mut pending);
        pending.drain(self.sink.as_ref());
        result
    }

    /// Subscribe restricted to this processor
    pub fn subscribe_local(&self, msg_id: MsgId, pipe: PipeId, msg_limit: u32) -> Result<()> {
        self.subscribe_ex(msg_id, pipe, Scope::Local, msg_limit)
    }

    fn subscribe_inner(
        &self,
        msg_id: MsgId,
        pipe: PipeId,
        scope: Scope,
        msg_limit: u32,
        caller: AppId,
        pending: &mut PendingEvents,
    ) -> Result<()> {
        self.validate_msg_id("subscribe", msg_id, pending)?;
        if msg_limit == 0 {
            return Err(self.reject(
                "subscribe",
                BusError::bad_argument("msg_limit", "must be at least 1"),
                pending,
            ));
        }

        let mut guard = self.tables();
        let tables = &mut *guard;

        let owner = match tables.pipes.get(pipe) {
            Some(p) => p.owner,
            None => {
                return Err(self.reject(
                    "subscribe",
                    BusError::bad_argument("pipe", format!("{} does not exist", pipe)),
                    pending,
                ))
            }
        };
        if owner != caller {
            return Err(self.reject(
                "subscribe",
                BusError::bad_argument("pipe", format!("{} not owned by {}", pipe, caller)),
                pending,
            ));
        }

        let route = tables.routes.ensure_route(msg_id)?;
        match tables
            .routes
            .subscribe(route, Destination::new(pipe, msg_limit, scope))?
        {
            SubscribeOutcome::Added => {
                pending.push(BusEvent::SubscriptionAdded {
                    msg_id,
                    pipe,
                    scope,
                });
                if tables.subscription_reporting {
                    pending.push(BusEvent::SubscriptionReport {
                        msg_id,
                        pipe,
                        scope,
                    });
                }
            }
            SubscribeOutcome::Duplicate => {
                self.stats.record_duplicate_subscription();
                pending.push(BusEvent::DuplicateSubscription { msg_id, pipe });
            }
        }
        Ok(())
    }

    /// Remove a pipe's subscription to a message identifier
    ///
    /// Removes every matching destination; success when none exist.
    pub fn unsubscribe(&self, msg_id: MsgId, pipe: PipeId) -> Result<()> {
        self.unsubscribe_for_app(msg_id, pipe, self.identity.current_app())
    }

    /// Unsubscribe restricted to this processor
    pub fn unsubscribe_local(&self, msg_id: MsgId, pipe: PipeId) -> Result<()> {
        self.unsubscribe(msg_id, pipe)
    }

    /// Unsubscribe on behalf of an application
    pub fn unsubscribe_for_app(&self, msg_id: MsgId, pipe: PipeId, app: AppId) -> Result<()> {
        let mut pending = self.pending();
        let result = self.unsubscribe_inner(msg_id, pipe, app, &mut pending);
        pending.drain(self.sink.as_ref());
        result
    }

    fn unsubscribe_inner(
        &self,
        msg_id: MsgId,
        pipe: PipeId,
        app: AppId,
        pending: &mut PendingEvents,
    ) -> Result<()> {
        self.validate_msg_id("unsubscribe", msg_id, pending)?;

        let mut guard = self.tables();
        let tables = &mut *guard;

        let owner = match tables.pipes.get(pipe) {
            Some(p) => p.owner,
            None => {
                return Err(self.reject(
                    "unsubscribe",
                    BusError::bad_argument("pipe", format!("{} does not exist", pipe)),
                    pending,
                ))
            }
        };
        if owner != app {
            return Err(self.reject(
                "unsubscribe",
                BusError::bad_argument("pipe", format!("{} not owned by {}", pipe, app)),
                pending,
            ));
        }

        let removed = match tables.routes.lookup(msg_id) {
            Some(route) => tables.routes.remove_matching(route, pipe).len(),
            None => 0,
        };
        if removed > 0 {
            pending.push(BusEvent::SubscriptionRemoved { msg_id, pipe });
        } else {
            log::debug!("unsubscribe {} from {}: no destination found", msg_id, pipe);
        }
        Ok(())
    }

    /// Enable or disable one destination without unsubscribing it
    pub fn set_route_enabled(&self, msg_id: MsgId, pipe: PipeId, enabled: bool) -> Result<()> {
        let mut guard = self.tables();
        let tables = &mut *guard;
        let route = tables
            .routes
            .lookup(msg_id)
            .ok_or_else(|| BusError::not_found(format!("route for {}", msg_id)))?;
        let index = tables
            .routes
            .find_destination(route, pipe)
            .ok_or_else(|| BusError::not_found(format!("destination {} on {}", pipe, msg_id)))?;
        if let Some(dest) = tables.routes.destination_mut(index) {
            dest.active = enabled;
        }
        Ok(())
    }

    /// Toggle per-subscription reporting events
    pub fn set_subscription_reporting(&self, enabled: bool) {
        self.tables().subscription_reporting = enabled;
    }

    // ------------------------------------------------------------------
    // Zero-copy buffers
    // ------------------------------------------------------------------

    /// Obtain a writable buffer for zero-copy population
    pub fn get_zero_copy_buffer(&self, size: usize) -> Result<ZeroCopyBuffer> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = self.get_zero_copy_buffer_inner(size, caller, &mut pending);
        pending.drain(self.sink.as_ref());
        result
    }

    fn get_zero_copy_buffer_inner(
        &self,
        size: usize,
        caller: AppId,
        pending: &mut PendingEvents,
    ) -> Result<ZeroCopyBuffer> {
        if size == 0 {
            return Err(self.reject(
                "get_zero_copy_buffer",
                BusError::bad_argument("size", "cannot be zero"),
                pending,
            ));
        }
        if size > self.config.max_msg_size {
            return Err(self.reject(
                "get_zero_copy_buffer",
                BusError::MsgTooBig {
                    size,
                    max: self.config.max_msg_size,
                },
                pending,
            ));
        }
        let mut guard = self.tables();
        let tables = &mut *guard;
        let block = tables.pool.allocate(size)?;
        let handle = tables.zero_copy.register(caller, block.block_size());
        Ok(ZeroCopyBuffer {
            handle,
            size,
            block,
        })
    }

    /// Return a zero-copy buffer to the pool without sending it
    pub fn release_zero_copy_buffer(&self, buffer: ZeroCopyBuffer) -> Result<()> {
        let mut guard = self.tables();
        let tables = &mut *guard;
        tables.zero_copy.unlink(buffer.handle)?;
        tables.pool.account_release(buffer.block.block_size());
        Ok(())
    }

    /// Release every outstanding zero-copy buffer owned by an application
    ///
    /// Entry point for the lifecycle collaborator after an abnormal
    /// application termination. Returns the number of buffers swept.
    pub fn release_all_for_app(&self, app: AppId) -> usize {
        let mut pending = self.pending();
        let count = {
            let mut guard = self.tables();
            let tables = &mut *guard;
            let sizes = tables.zero_copy.release_all_for_app(app);
            for size in &sizes {
                tables.pool.account_release(*size);
            }
            sizes.len()
        };
        if count > 0 {
            pending.push(BusEvent::ZeroCopySwept { app, count });
        }
        pending.drain(self.sink.as_ref());
        count
    }

    // ------------------------------------------------------------------
    // Enumeration and statistics
    // ------------------------------------------------------------------

    /// Visit a snapshot of every route under the shared lock
    pub fn for_each_route<F: FnMut(&RouteInfo)>(&self, mut f: F) {
        let guard = self.tables();
        for index in 0..guard.routes.len() {
            let route = match guard.routes.route(index) {
                Some(route) => route,
                None => continue,
            };
            let destinations = guard
                .routes
                .destination_indices(index)
                .into_iter()
                .filter_map(|i| guard.routes.destination(i))
                .map(|d| DestinationInfo {
                    pipe: d.pipe,
                    active: d.active,
                    msg_limit: d.msg_limit,
                    in_flight: d.in_flight,
                    delivered: d.delivered,
                    scope: d.scope,
                })
                .collect();
            let info = RouteInfo {
                msg_id: route.msg_id,
                sequence: route.sequence,
                destinations,
            };
            f(&info);
        }
    }

    /// Visit a snapshot of every pipe under the shared lock
    pub fn for_each_pipe<F: FnMut(&PipeInfo)>(&self, mut f: F) {
        let guard = self.tables();
        for pipe in guard.pipes.iter() {
            let info = PipeInfo {
                id: pipe.id,
                name: pipe.name.clone(),
                owner: pipe.owner,
                depth: pipe.depth,
                opts: pipe.opts,
                queued: pipe.queued(),
                received_count: pipe.received_count,
                overflow_count: pipe.overflow_count,
            };
            f(&info);
        }
    }

    /// Snapshot of bus counters and table gauges
    pub fn stats(&self) -> BusStats {
        let guard = self.tables();
        let mut snapshot = self.stats.snapshot();
        snapshot.pipes_in_use = guard.pipes.len();
        snapshot.peak_pipes_in_use = guard.pipes.peak();
        snapshot.routes_in_use = guard.routes.len();
        snapshot.destinations_in_use = guard.routes.destinations_in_use();
        snapshot.pool = guard.pool.stats();
        snapshot
    }

    /// Snapshot of buffer pool usage
    pub fn pool_stats(&self) -> PoolStats {
        self.tables().pool.stats()
    }

    /// Reset the bus counters; table gauges are live and unaffected
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl std::fmt::Debug for SoftwareBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBus")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Value snapshot of one destination, for enumeration consumers
#[derive(Debug, Clone, Serialize)]
pub struct DestinationInfo {
    /// Pipe the destination delivers to
    pub pipe: PipeId,
    /// Whether the destination currently delivers
    pub active: bool,
    /// Per-destination message limit
    pub msg_limit: u32,
    /// Messages queued but not yet received
    pub in_flight: u32,
    /// Lifetime deliveries
    pub delivered: u64,
    /// Subscription visibility
    pub scope: Scope,
}

/// Value snapshot of one route, for enumeration consumers
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    /// Routed message identifier
    pub msg_id: MsgId,
    /// Current telemetry sequence count
    pub sequence: u32,
    /// Destinations in delivery order (most recent subscriber first)
    pub destinations: Vec<DestinationInfo>,
}

/// Value snapshot of one pipe, for enumeration consumers
#[derive(Debug, Clone, Serialize)]
pub struct PipeInfo {
    /// Pipe identifier
    pub id: PipeId,
    /// Pipe name
    pub name: String,
    /// Owning application
    pub owner: AppId,
    /// Configured queue depth
    pub depth: usize,
    /// Option flags
    pub opts: PipeOptions,
    /// Messages currently queued
    pub queued: usize,
    /// Messages received over the pipe's lifetime
    pub received_count: u64,
    /// Sends dropped because the queue was full
    pub overflow_count: u64,
}
