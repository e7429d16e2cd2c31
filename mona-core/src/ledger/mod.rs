//! Ledger access: discover and decode new `PaymentMilestoneReached` events.
//!
//! - [`rpc`]: the [`LedgerClient`] seam and its Ethereum JSON-RPC implementation
//! - [`abi`]: event signature, topic hash and log data decoding
//! - [`watcher`]: the cursor-driven poll and the long-running poll loop

pub mod abi;
pub mod rpc;
pub mod watcher;

pub use abi::{DecodeError, decode_milestone_log};
pub use rpc::{JsonRpcLedgerClient, LedgerClient, LogFilter, RawLog};
pub use watcher::{LedgerWatcher, LedgerWatcherRunner, PollOutcome};

use std::time::Duration;
use thiserror::Error;

/// Errors talking to the remote ledger. None of them is fatal: the poll
/// loop logs them and retries the tick with the cursor unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport-level failure
    #[error("RPC request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status
    #[error("RPC endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The endpoint answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response had neither `result` nor `error`
    #[error("RPC response for {method} has no result")]
    MissingResult { method: &'static str },

    /// The call did not complete within the request timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}
