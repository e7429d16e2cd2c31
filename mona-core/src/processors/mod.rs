//! Event processors of the milestone pipeline.
//!
//! - `Broadcaster`: receives `MilestoneEvent`, applies it to the state and
//!   fans an update out to subscribers

pub mod broadcaster;

pub use broadcaster::{Broadcaster, DeliveryReport};
