//! Events flowing through the milestone pipeline.
//!
//! # Event Flow
//!
//! 1. `LedgerWatcher` decodes `PaymentMilestoneReached` logs into
//!    [`MilestoneEvent`]s, in ledger order.
//! 2. `Broadcaster` folds each event into the `StateStore` and fans an
//!    update frame out to every registered subscriber.
//!
//! Events are immutable and carry everything a subscriber needs, so no
//! processor has to re-read the ledger.

pub mod types;

pub use types::{InvalidPercentage, LogPosition, MilestoneEvent, Percentage};
