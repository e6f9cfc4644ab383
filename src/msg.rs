//! Message identifiers and the in-flight message buffer

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pool::PoolBlock;

/// Bit in the raw identifier distinguishing command from telemetry traffic
pub const COMMAND_BIT: u32 = 0x1000;

/// Message identifier routed by the bus
///
/// Identifiers are mission-assigned values; the bus only interprets the
/// command/telemetry bit (sequence stamping applies to telemetry) and the
/// configured upper bound for validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgId(u32);

impl MsgId {
    /// Create a message identifier from its raw mission value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw mission value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Traffic kind encoded in the identifier
    pub fn kind(&self) -> MsgKind {
        if self.0 & COMMAND_BIT != 0 {
            MsgKind::Command
        } else {
            MsgKind::Telemetry
        }
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Traffic kind of a message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    /// Command traffic; the bus never rewrites its sequence
    Command,
    /// Telemetry traffic; eligible for per-route sequence stamping
    Telemetry,
}

/// One in-flight message: identifier, stamped sequence, and payload bytes
///
/// The payload lives in a pool block owned by this buffer. Receivers get an
/// `Arc<MessageBuffer>`; the bus tracks delivery references separately in
/// its descriptor table and returns the block to the pool when the last
/// delivery reference is released.
#[derive(Debug)]
pub struct MessageBuffer {
    /// Message identifier the buffer was sent under
    msg_id: MsgId,
    /// Sequence count stamped at send time (zero when not stamped)
    sequence: u32,
    /// Payload length in bytes
    len: usize,
    /// Backing pool block
    block: PoolBlock,
}

impl MessageBuffer {
    /// Wrap a populated pool block as an in-flight message
    pub(crate) fn new(msg_id: MsgId, sequence: u32, len: usize, block: PoolBlock) -> Self {
        Self {
            msg_id,
            sequence,
            len,
            block,
        }
    }

    /// Message identifier
    pub fn msg_id(&self) -> MsgId {
        self.msg_id
    }

    /// Sequence count stamped at send time
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.block.as_slice()[..self.len]
    }

    /// Size of the backing pool block (bucket size, not payload length)
    pub(crate) fn block_size(&self) -> usize {
        self.block.block_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_kind_from_identifier() {
        assert_eq!(MsgId::new(0x1803).kind(), MsgKind::Command);
        assert_eq!(MsgId::new(0x0800).kind(), MsgKind::Telemetry);
        assert_eq!(MsgId::new(0x0003).kind(), MsgKind::Telemetry);
    }

    #[test]
    fn test_msg_id_display() {
        assert_eq!(format!("{}", MsgId::new(0x100)), "0x0100");
    }

    #[test]
    fn test_message_buffer_payload_view() {
        let mut block = PoolBlock::for_tests(64);
        block.as_mut_slice()[..5].copy_from_slice(b"hello");
        let buf = MessageBuffer::new(MsgId::new(0x200), 7, 5, block);

        assert_eq!(buf.payload(), b"hello");
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.sequence(), 7);
        assert_eq!(buf.block_size(), 64);
    }
}
