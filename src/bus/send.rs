//! Message transmission and fan-out
//!
//! A transmit resolves the route, stamps telemetry sequence numbers,
//! copies the payload into one pool block, and walks the destination list
//! enqueueing one descriptor reference per eligible pipe. Per-destination
//! failures (limit reached, queue full) drop the message for that pipe
//! only; the send itself still succeeds.

use std::sync::Arc;

use crate::error::{BusError, Result};
use crate::events::{BusEvent, PendingEvents};
use crate::identity::AppId;
use crate::msg::{MessageBuffer, MsgId, MsgKind};
use crate::pipes::EnqueueError;
use crate::pool::PoolBlock;
use crate::zerocopy::ZeroCopyBuffer;

use super::core::{SharedTables, SoftwareBus};

/// Payload source for one transmit
enum Payload<'a> {
    /// Bytes copied into a fresh pool block
    Copied(&'a [u8]),
    /// Pool block the producer already populated in place
    Owned(ZeroCopyBuffer),
}

impl Payload<'_> {
    fn len(&self) -> usize {
        match self {
            Payload::Copied(bytes) => bytes.len(),
            Payload::Owned(buffer) => buffer.size(),
        }
    }
}

impl SoftwareBus {
    /// Send a payload to every subscriber of `msg_id`
    ///
    /// With `increment_sequence`, telemetry identifiers are stamped with
    /// the route's next sequence count; command traffic is never stamped.
    /// A send with no subscribers is a defined success.
    pub fn transmit(&self, msg_id: MsgId, payload: &[u8], increment_sequence: bool) -> Result<()> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = self.transmit_inner(
            msg_id,
            Payload::Copied(payload),
            increment_sequence,
            caller,
            &mut pending,
        );
        pending.drain(self.sink.as_ref());
        result
    }

    /// Send a zero-copy buffer to every subscriber of `msg_id`
    ///
    /// Consumes the buffer whether or not anyone was subscribed; its block
    /// returns to the pool when the last receiver releases it.
    pub fn transmit_buffer(
        &self,
        msg_id: MsgId,
        buffer: ZeroCopyBuffer,
        increment_sequence: bool,
    ) -> Result<()> {
        let caller = self.identity.current_app();
        let mut pending = self.pending();
        let result = self.transmit_inner(
            msg_id,
            Payload::Owned(buffer),
            increment_sequence,
            caller,
            &mut pending,
        );
        pending.drain(self.sink.as_ref());
        result
    }

    fn transmit_inner(
        &self,
        msg_id: MsgId,
        payload: Payload<'_>,
        increment_sequence: bool,
        caller: AppId,
        pending: &mut PendingEvents,
    ) -> Result<()> {
        self.validate_msg_id("transmit", msg_id, pending)?;
        let len = payload.len();
        if len > self.config.max_msg_size {
            return Err(self.reject(
                "transmit",
                BusError::MsgTooBig {
                    size: len,
                    max: self.config.max_msg_size,
                },
                pending,
            ));
        }

        let mut guard = self.tables();
        let tables = &mut *guard;

        let route = match tables.routes.lookup(msg_id) {
            Some(route) => route,
            None => {
                if let Payload::Owned(buffer) = payload {
                    tables
                        .zero_copy
                        .unlink(buffer.handle)
                        .map_err(|err| self.reject("transmit", err, pending))?;
                    tables.pool.account_release(buffer.block.block_size());
                }
                self.stats.record_no_subscribers();
                pending.push(BusEvent::NoSubscribers { msg_id });
                return Ok(());
            }
        };

        let block = self.claim_block(tables, payload, pending)?;

        let sequence = if increment_sequence && msg_id.kind() == MsgKind::Telemetry {
            tables.routes.next_sequence(route)
        } else {
            0
        };

        let buffer = Arc::new(MessageBuffer::new(msg_id, sequence, len, block));
        let id = tables.descriptors.insert(buffer);

        for index in tables.routes.destination_indices(route) {
            let (pipe_id, active, limit, in_flight) = match tables.routes.destination(index) {
                Some(d) => (d.pipe, d.active, d.msg_limit, d.in_flight),
                None => continue,
            };
            if !active {
                continue;
            }
            let pipe = match tables.pipes.get_mut(pipe_id) {
                Some(pipe) => pipe,
                None => {
                    log::error!("destination {} has no pipe record", pipe_id);
                    self.stats.record_internal_error();
                    continue;
                }
            };
            if pipe.opts.ignore_self && pipe.owner == caller {
                continue;
            }
            if in_flight >= limit {
                self.stats.record_msg_limit_drop();
                pending.push(BusEvent::MsgLimitExceeded {
                    msg_id,
                    pipe: pipe_id,
                });
                continue;
            }
            match pipe.queue.try_put(id) {
                Ok(()) => {
                    if let Err(err) = tables.descriptors.retain(id) {
                        log::error!("retaining delivery reference: {}", err);
                        self.stats.record_internal_error();
                        continue;
                    }
                    if let Some(dest) = tables.routes.destination_mut(index) {
                        dest.in_flight += 1;
                        dest.delivered += 1;
                    }
                }
                Err(EnqueueError::Full) => {
                    pipe.overflow_count += 1;
                    self.stats.record_pipe_overflow();
                    pending.push(BusEvent::PipeOverflow {
                        msg_id,
                        pipe: pipe_id,
                    });
                }
                Err(EnqueueError::Disconnected) => {
                    pipe.error_count += 1;
                    self.stats.record_internal_error();
                    pending.push(BusEvent::InternalSendError {
                        msg_id,
                        pipe: pipe_id,
                    });
                }
            }
        }

        // Producer's transient reference; frees the buffer immediately when
        // nothing was enqueued.
        if let Err(err) = tables.descriptors.release(id, &mut tables.pool) {
            log::error!("releasing producer reference: {}", err);
            self.stats.record_internal_error();
        }
        self.stats.record_send();
        Ok(())
    }

    /// Turn the payload source into a populated pool block
    ///
    /// A zero-copy block keeps its original pool accounting; its registry
    /// entry is consumed here.
    fn claim_block(
        &self,
        tables: &mut SharedTables,
        payload: Payload<'_>,
        pending: &mut PendingEvents,
    ) -> Result<PoolBlock> {
        match payload {
            Payload::Copied(bytes) => {
                let mut block = tables.pool.allocate(bytes.len())?;
                block.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
                Ok(block)
            }
            Payload::Owned(buffer) => {
                tables
                    .zero_copy
                    .unlink(buffer.handle)
                    .map_err(|err| self.reject("transmit", err, pending))?;
                let ZeroCopyBuffer { block, .. } = buffer;
                Ok(block)
            }
        }
    }
}
