//! Message routing: the identifier→destination route table and the
//! per-route destination lists with flow-control state

pub mod destination;
pub mod table;

pub use destination::{Destination, DestinationArena, Scope};
pub use table::{Route, RouteTable};
