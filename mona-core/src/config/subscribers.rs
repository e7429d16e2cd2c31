//! Subscriber registry configuration.

use std::time::Duration;

/// Limits applied by the connection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of concurrently registered subscribers.
    pub max_subscribers: usize,
    /// Outbound frames buffered per subscriber before it counts as stalled.
    pub queue_capacity: usize,
    /// Deadline for a single socket write. A connection that cannot flush
    /// a frame in time is closed.
    pub write_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 1024,
            queue_capacity: 32,
            write_timeout: Duration::from_secs(10),
        }
    }
}
