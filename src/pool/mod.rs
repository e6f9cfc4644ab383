//! Buffer pool: external pool collaborator, statistics adapter, and
//! reference-counted buffer descriptors
//!
//! Everything in this module is called only while the bus holds its shared
//! lock; none of these types perform locking of their own.

pub mod adapter;
pub mod bucket;
pub mod descriptor;

pub use adapter::{PoolAdapter, PoolStats};
pub use bucket::{BucketPool, MemoryPool, PoolBlock};
pub use descriptor::{BufferId, DescriptorTable};
