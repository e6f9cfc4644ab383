//! softbus: a publish/subscribe message bus for flight-style software
//!
//! Applications exchange messages through named, bounded pipes. A sender
//! transmits under a mission-assigned message identifier; the bus routes
//! one copy of the payload to every subscribed pipe by reference, with
//! per-destination flow control. All table capacities and buffer memory
//! are fixed at construction.
//!
//! # Example
//!
//! ```
//! use softbus::{BusConfig, MsgId, ReceiveTimeout, SoftwareBus};
//!
//! let bus = SoftwareBus::new(BusConfig::default()).unwrap();
//! let pipe = bus.create_pipe(16, "CMD_PIPE").unwrap();
//! bus.subscribe(MsgId::new(0x1803), pipe).unwrap();
//!
//! bus.transmit(MsgId::new(0x1803), b"noop", true).unwrap();
//! let msg = bus.receive(pipe, ReceiveTimeout::Poll).unwrap();
//! assert_eq!(msg.payload(), b"noop");
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod msg;
pub mod pipes;
pub mod pool;
pub mod routing;
pub mod zerocopy;

pub use bus::{BusStats, DestinationInfo, PipeInfo, RouteInfo, SoftwareBus};
pub use config::{BucketConfig, BusConfig, PoolConfig};
pub use error::{BusError, Result};
pub use events::{BusEvent, EventSink, LogSink, Severity};
pub use identity::{AppId, AppIdentity, StaticIdentity};
pub use msg::{MessageBuffer, MsgId, MsgKind};
pub use pipes::{PipeId, PipeOptions, ReceiveTimeout};
pub use pool::{BucketPool, MemoryPool, PoolStats};
pub use routing::Scope;
pub use zerocopy::ZeroCopyBuffer;
