//! Error types and handling for the software bus

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Error taxonomy for the software bus core
///
/// Every variant is returned to the immediate caller as a status; none of
/// them escalate to process termination. A full pipe, a missing route, or a
/// dead subscriber never stops delivery to other subscribers.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Invalid argument (null/invalid handles, out-of-range sizes)
    #[error("Bad argument: {parameter} - {message}")]
    BadArgument { parameter: String, message: String },

    /// A named entity (pipe, route, destination, handle) does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A pipe with this name already exists
    #[error("Name taken: {name}")]
    NameTaken { name: String },

    /// The pipe table has no free slots
    #[error("Maximum pipes reached: {max}")]
    MaxPipesReached { max: usize },

    /// The route table has no free slots for a new message identifier
    #[error("Maximum message identifiers reached: {max}")]
    MaxMessagesReached { max: usize },

    /// The route already carries the maximum number of destinations
    #[error("Maximum destinations reached: {max}")]
    MaxDestinationsReached { max: usize },

    /// Message size exceeds the mission-wide maximum
    #[error("Message too big: {size} bytes, maximum {max}")]
    MsgTooBig { size: usize, max: usize },

    /// The buffer pool could not satisfy an allocation
    #[error("Pool exhausted: requested {requested} bytes")]
    PoolExhausted { requested: usize },

    /// Non-blocking receive found the pipe empty
    #[error("No message available")]
    NoMessage,

    /// Bounded receive elapsed without a message
    #[error("Receive timed out")]
    Timeout,

    /// Unexpected failure from a collaborator
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BusError {
    /// Create a bad argument error
    pub fn bad_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a name taken error
    pub fn name_taken(name: impl Into<String>) -> Self {
        Self::NameTaken { name: name.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this status reflects an empty/timed-out receive rather than
    /// a genuine failure
    pub fn is_no_delivery(&self) -> bool {
        matches!(self, Self::NoMessage | Self::Timeout)
    }
}
