//! The bus aggregate and its public operations

pub mod core;
pub mod receive;
pub mod send;
pub mod stats;

pub use self::core::{DestinationInfo, PipeInfo, RouteInfo, SoftwareBus};
pub use self::stats::BusStats;
