//! Ledger watcher configuration.

use alloy_primitives::Address;
use std::time::Duration;
use url::Url;

/// Tick interval, backoff and circuit breaker settings for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollScheduleConfig {
    /// Delay between healthy ticks.
    pub poll_interval: Duration,
    /// Upper bound for the exponential backoff after failed ticks.
    pub max_backoff: Duration,
    /// Consecutive failures after which the breaker opens.
    pub breaker_threshold: u32,
    /// Delay between ticks while the breaker is open.
    pub breaker_cooldown: Duration,
}

impl Default for PollScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            max_backoff: Duration::from_secs(160),
            breaker_threshold: 6,
            breaker_cooldown: Duration::from_secs(600),
        }
    }
}

/// Everything the ledger watcher needs to run.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: Url,
    /// Contract emitting `PaymentMilestoneReached`.
    pub contract_address: Address,
    /// Bound for every single remote call.
    pub request_timeout: Duration,
    /// Split log queries into chunks of at most this many blocks.
    pub max_block_range: Option<u64>,
    /// Replay from this block instead of starting at the current head.
    pub start_block: Option<u64>,
    pub schedule: PollScheduleConfig,
}
