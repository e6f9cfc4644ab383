//! Pipes: per-consumer bounded inbound queues and their fixed slot table

pub mod pipe;
pub mod queue;
pub mod table;

pub use pipe::{Pipe, PipeOptions};
pub use queue::{EnqueueError, PipeQueue, ReceiveTimeout};
pub use table::{PipeId, PipeTable};
