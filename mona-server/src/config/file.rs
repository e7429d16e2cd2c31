//! TOML file configuration structures.
//!
//! These structs directly map to the `mona-config.toml` file format.
//! Every section and key is optional; missing values take the defaults
//! below.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub subscribers: SubscribersConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:10000").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

pub(crate) const DEFAULT_PORT: u16 = 10000;

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

/// Ledger section: where to read events from and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: Option<Url>,
    /// Address of the emitting contract, `0x`-prefixed hex.
    pub contract_address: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Largest block span per `eth_getLogs` query. Unbounded if unset.
    pub max_block_range: Option<u64>,
    /// First block to scan. Defaults to the chain head at startup.
    pub start_block: Option<u64>,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Consecutive failures before the circuit breaker opens. 0 disables it.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    160
}

fn default_breaker_threshold() -> u32 {
    6
}

fn default_breaker_cooldown_secs() -> u64 {
    600
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_block_range: None,
            start_block: None,
            max_backoff_secs: default_max_backoff_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

/// Push channel limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribersConfig {
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    /// Frames buffered per subscriber before it counts as stalled.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds a single socket write may take before the connection is closed.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_max_subscribers() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    32
}

fn default_write_timeout_secs() -> u64 {
    10
}

impl Default for SubscribersConfig {
    fn default() -> Self {
        Self {
            max_subscribers: default_max_subscribers(),
            queue_capacity: default_queue_capacity(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}
