//! Bus and pool configuration

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Configuration for the software bus core
///
/// All table capacities are fixed at construction; the bus never grows them
/// at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Maximum number of pipes that can exist at once
    pub max_pipes: usize,
    /// Maximum depth a pipe's backing queue may be created with
    pub max_pipe_depth: usize,
    /// Maximum number of distinct message identifiers with routes
    pub max_routes: usize,
    /// Maximum number of destinations on one route
    pub max_destinations_per_route: usize,
    /// Mission-wide maximum message size in bytes
    pub max_msg_size: usize,
    /// Highest raw message identifier the bus accepts
    pub highest_valid_msg_id: u32,
    /// Default per-destination message limit when not given at subscribe
    pub default_msg_limit: u32,
    /// Capacity of the deferred diagnostic-event list per entry point
    pub pending_event_capacity: usize,
    /// Buffer pool layout
    pub pool: PoolConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_pipes: 64,
            max_pipe_depth: 256,
            max_routes: 256,
            max_destinations_per_route: 16,
            max_msg_size: 32 * 1024,
            highest_valid_msg_id: 0x1FFF,
            default_msg_limit: 4,
            pending_event_capacity: 32,
            pool: PoolConfig::default(),
        }
    }
}

impl BusConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the maximum number of pipes
    pub fn with_max_pipes(mut self, max: usize) -> Self {
        self.max_pipes = max;
        self
    }

    /// Set the maximum pipe queue depth
    pub fn with_max_pipe_depth(mut self, depth: usize) -> Self {
        self.max_pipe_depth = depth;
        self
    }

    /// Set the maximum number of routed message identifiers
    pub fn with_max_routes(mut self, max: usize) -> Self {
        self.max_routes = max;
        self
    }

    /// Set the maximum destinations per route
    pub fn with_max_destinations_per_route(mut self, max: usize) -> Self {
        self.max_destinations_per_route = max;
        self
    }

    /// Set the mission-wide maximum message size
    pub fn with_max_msg_size(mut self, size: usize) -> Self {
        self.max_msg_size = size;
        self
    }

    /// Set the default per-destination message limit
    pub fn with_default_msg_limit(mut self, limit: u32) -> Self {
        self.default_msg_limit = limit;
        self
    }

    /// Set the buffer pool layout
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_pipes == 0 {
            return Err(BusError::bad_argument("max_pipes", "must be at least 1"));
        }
        if self.max_pipe_depth == 0 {
            return Err(BusError::bad_argument(
                "max_pipe_depth",
                "must be at least 1",
            ));
        }
        if self.max_routes == 0 {
            return Err(BusError::bad_argument("max_routes", "must be at least 1"));
        }
        if self.max_destinations_per_route == 0 {
            return Err(BusError::bad_argument(
                "max_destinations_per_route",
                "must be at least 1",
            ));
        }
        if self.default_msg_limit == 0 {
            return Err(BusError::bad_argument(
                "default_msg_limit",
                "must be at least 1",
            ));
        }
        if self.pending_event_capacity == 0 {
            return Err(BusError::bad_argument(
                "pending_event_capacity",
                "must be at least 1",
            ));
        }
        self.pool.validate()?;

        let largest = self
            .pool
            .buckets
            .last()
            .map(|b| b.block_size)
            .unwrap_or(0);
        if largest < self.max_msg_size {
            return Err(BusError::bad_argument(
                "pool",
                format!(
                    "largest bucket ({} bytes) smaller than max_msg_size ({})",
                    largest, self.max_msg_size
                ),
            ));
        }
        Ok(())
    }
}

/// Fixed-bucket buffer pool layout
///
/// Buckets must be listed in ascending block size; an allocation draws from
/// the smallest bucket whose block size fits the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Bucket descriptions, ascending by block size
    pub buckets: Vec<BucketConfig>,
}

/// One fixed-size bucket in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Size of every block in this bucket
    pub block_size: usize,
    /// Number of blocks pre-allocated for this bucket
    pub count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buckets: vec![
                BucketConfig {
                    block_size: 64,
                    count: 64,
                },
                BucketConfig {
                    block_size: 256,
                    count: 32,
                },
                BucketConfig {
                    block_size: 1024,
                    count: 16,
                },
                BucketConfig {
                    block_size: 4096,
                    count: 8,
                },
                BucketConfig {
                    block_size: 32 * 1024,
                    count: 4,
                },
            ],
        }
    }
}

impl PoolConfig {
    /// Create a layout from explicit buckets
    pub fn new(buckets: Vec<BucketConfig>) -> Self {
        Self { buckets }
    }

    /// Total bytes the pool pre-allocates
    pub fn total_bytes(&self) -> usize {
        self.buckets.iter().map(|b| b.block_size * b.count).sum()
    }

    /// Validate the layout
    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(BusError::bad_argument("pool", "at least one bucket required"));
        }
        let mut previous = 0usize;
        for bucket in &self.buckets {
            if bucket.block_size == 0 {
                return Err(BusError::bad_argument(
                    "pool",
                    "bucket block size cannot be zero",
                ));
            }
            if bucket.count == 0 {
                return Err(BusError::bad_argument(
                    "pool",
                    "bucket count cannot be zero",
                ));
            }
            if bucket.block_size <= previous {
                return Err(BusError::bad_argument(
                    "pool",
                    "buckets must be ascending by block size",
                ));
            }
            previous = bucket.block_size;
        }
        Ok(())
    }
}
