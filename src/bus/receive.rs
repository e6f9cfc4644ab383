//! Message receipt
//!
//! Receivers wait on the pipe's own queue, never on the shared lock. The
//! lock is taken twice: once to resolve the pipe into a receiving end,
//! then again after a message arrives to settle the delivery reference
//! and the destination's in-flight count.

use std::sync::Arc;

use crate::error::{BusError, Result};
use crate::msg::MessageBuffer;
use crate::pipes::queue::wait_for_message;
use crate::pipes::{PipeId, ReceiveTimeout};

use super::core::SoftwareBus;

impl SoftwareBus {
    /// Receive the next message queued on a pipe
    ///
    /// Blocks per the timeout mode. An empty pipe under [`ReceiveTimeout::Poll`]
    /// returns [`BusError::NoMessage`]; an expired bounded wait returns
    /// [`BusError::Timeout`]. Both are nominal outcomes, see
    /// [`BusError::is_no_delivery`].
    pub fn receive(&self, pipe: PipeId, timeout: ReceiveTimeout) -> Result<Arc<MessageBuffer>> {
        let receiver = {
            let guard = self.tables();
            match guard.pipes.get(pipe) {
                Some(record) => record.queue.receiver(),
                None => {
                    self.stats.record_bad_argument();
                    return Err(BusError::bad_argument(
                        "pipe",
                        format!("{} does not exist", pipe),
                    ));
                }
            }
        };

        let buffer_id = wait_for_message(&receiver, timeout)?;

        let mut guard = self.tables();
        let tables = &mut *guard;

        let buffer = match tables.descriptors.get(buffer_id) {
            Some(buffer) => buffer,
            None => {
                self.stats.record_receive_error();
                return Err(BusError::internal(format!(
                    "dequeued unknown buffer {}",
                    buffer_id
                )));
            }
        };

        // This receive consumes the queued delivery reference; the caller's
        // Arc keeps the payload alive independently.
        if let Err(err) = tables.descriptors.release(buffer_id, &mut tables.pool) {
            log::error!("releasing delivery reference: {}", err);
            self.stats.record_internal_error();
        }

        match tables.pipes.get_mut(pipe) {
            Some(record) => record.received_count += 1,
            None => {
                // Deleted between the dequeue and the relock; the reference
                // above is already settled.
                self.stats.record_receive_error();
                return Err(BusError::not_found(format!(
                    "{} deleted while receiving",
                    pipe
                )));
            }
        }

        // Unsubscribed-while-in-flight leaves no destination; nominal.
        if let Some(route) = tables.routes.lookup(buffer.msg_id()) {
            if let Some(index) = tables.routes.find_destination(route, pipe) {
                if let Some(dest) = tables.routes.destination_mut(index) {
                    dest.in_flight = dest.in_flight.saturating_sub(1);
                }
            }
        }

        self.stats.record_receive();
        Ok(buffer)
    }
}
